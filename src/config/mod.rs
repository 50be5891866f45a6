use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

mod dynamic;
mod query;
mod validator;

pub use dynamic::DynamicConfig;
pub use query::QueryParams;
pub use validator::Validator;

/// 服务名称 (健康检查与日志中使用)
pub const SERVICE_NAME: &str = "vless-generator";

/// 服务版本
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 服务启动配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// HTTP 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// 配置模板来源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// 模板目录；为空时使用内置模板
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_template_types")]
    pub types: Vec<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: None,
            types: default_template_types(),
        }
    }
}

fn default_template_types() -> Vec<String> {
    vec!["vless".to_string()]
}

impl AppConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 不做校验：命令行参数合并之后再由 `Validator` 统一校验。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// 监听地址 `listen:port`
    pub fn listen_addr(&self) -> String {
        if self.server.listen.contains(':') && !self.server.listen.starts_with('[') {
            format!("[{}]:{}", self.server.listen, self.server.port)
        } else {
            format!("{}:{}", self.server.listen, self.server.port)
        }
    }
}
