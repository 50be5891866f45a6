use anyhow::{anyhow, Result};
use tracing::Level;

use super::AppConfig;

pub struct Validator;

impl Validator {
    /// 验证启动配置的有效性
    pub fn validate(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("HTTP 端口不能为 0"));
        }

        if config.server.listen.trim().is_empty() {
            return Err(anyhow!("监听地址不能为空"));
        }

        if config.service.log_level.parse::<Level>().is_err() {
            return Err(anyhow!("未知日志级别: {}", config.service.log_level));
        }

        Self::validate_template_types(&config.templates.types)?;

        Ok(())
    }

    fn validate_template_types(types: &[String]) -> Result<()> {
        if types.is_empty() {
            return Err(anyhow!("至少需要一个配置模板类型"));
        }

        for (idx, name) in types.iter().enumerate() {
            // 类型名会成为 URL 路径段和文件名
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(anyhow!("模板类型 {} 名称无效: {:?}", idx, name));
            }
            if name == "config" || name == "health" || name == "qrcode" {
                return Err(anyhow!("模板类型 {} 与保留路径冲突: {}", idx, name));
            }
        }

        Ok(())
    }
}
