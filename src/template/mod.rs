use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

mod generator;
mod shape;

pub use generator::{apply_dynamic_config, apply_uuid};
pub use shape::check_shape;

use crate::config::{DynamicConfig, TemplatesConfig};
use crate::utils::{deep_copy, GeneratorError};

/// 内置配置模板 (类型名, JSON 内容)
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[("vless", include_str!("../../templates/vless.json"))];

/// 配置模板仓库
///
/// 启动时加载一次，之后只读；所有读取都返回深拷贝。
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<String, Value>,
    types: Vec<String>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置加载模板：指定目录时读取磁盘文件，否则使用内置模板
    pub fn load(config: &TemplatesConfig) -> Result<Self> {
        match &config.directory {
            Some(dir) => Self::load_dir(dir, &config.types),
            None => Self::load_builtin(&config.types),
        }
    }

    /// 从目录加载 `{type}.json`
    pub fn load_dir<P: AsRef<Path>>(dir: P, types: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        info!("📂 从目录加载配置模板: {} {:?}", dir.display(), types);

        let mut store = Self::new();
        for template_type in types {
            let file = dir.join(format!("{}.json", template_type));
            debug!("读取模板文件: {}", file.display());

            let content = fs::read_to_string(&file)
                .with_context(|| format!("failed to load template {}: {}", template_type, file.display()))?;
            store.insert_str(template_type, &content)?;
        }

        info!("✅ 已加载 {} 个配置模板", store.types.len());
        Ok(store)
    }

    /// 加载内置模板
    pub fn load_builtin(types: &[String]) -> Result<Self> {
        info!("📦 加载内置配置模板: {:?}", types);

        let mut store = Self::new();
        for template_type in types {
            let content = BUILTIN_TEMPLATES
                .iter()
                .find(|(name, _)| *name == template_type.as_str())
                .map(|(_, content)| *content)
                .ok_or_else(|| GeneratorError::TemplateNotFound(template_type.clone()))
                .with_context(|| format!("failed to load template {}", template_type))?;
            store.insert_str(template_type, content)?;
        }

        info!("✅ 已加载 {} 个配置模板", store.types.len());
        Ok(store)
    }

    fn insert_str(&mut self, template_type: &str, content: &str) -> Result<()> {
        let template: Value = serde_json::from_str(content)
            .map_err(GeneratorError::from)
            .with_context(|| format!("failed to parse template {}", template_type))?;
        self.insert(template_type, template);
        Ok(())
    }

    /// 注册一个已解析的模板，同名模板会被替换
    pub fn insert(&mut self, template_type: &str, template: Value) {
        for issue in check_shape(&template) {
            warn!("模板 {} 结构不完整: {}", template_type, issue);
        }

        if self
            .templates
            .insert(template_type.to_string(), template)
            .is_none()
        {
            self.types.push(template_type.to_string());
        }
        info!("模板加载成功: {}", template_type);
    }

    /// 返回模板的深拷贝
    pub fn get_template(&self, template_type: &str) -> Option<Value> {
        self.templates.get(template_type).map(deep_copy)
    }

    /// 已加载的模板类型 (按加载顺序)
    pub fn template_types(&self) -> &[String] {
        &self.types
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// 生成带动态参数与 UUID 的配置
    pub fn generate_config(
        &self,
        template_type: &str,
        uuid: &str,
        dynamic: &DynamicConfig,
    ) -> Result<Value, GeneratorError> {
        let mut config = self
            .get_template(template_type)
            .ok_or_else(|| GeneratorError::TemplateNotFound(template_type.to_string()))?;

        apply_dynamic_config(&mut config, dynamic);
        apply_uuid(&mut config, uuid);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryParams;
    use serde_json::json;

    fn builtin() -> TemplateStore {
        TemplateStore::load_builtin(&["vless".to_string()]).unwrap()
    }

    #[test]
    fn test_load_builtin() {
        let store = builtin();
        assert_eq!(store.template_types(), &["vless".to_string()]);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_load_unknown_builtin_fails() {
        assert!(TemplateStore::load_builtin(&["vmess".to_string()]).is_err());
    }

    #[test]
    fn test_get_template_returns_copy() {
        let store = builtin();
        let mut first = store.get_template("vless").unwrap();
        first["outbounds"][0]["server"] = json!("mutated");
        first["inbounds"].as_array_mut().unwrap().clear();

        let second = store.get_template("vless").unwrap();
        assert_eq!(second["outbounds"][0]["server"], "vless.example.com");
        assert_eq!(second["inbounds"].as_array().unwrap().len(), 2);
        assert!(store.get_template("nosuch").is_none());
    }

    #[test]
    fn test_generate_from_query() {
        let store = builtin();
        let dynamic =
            DynamicConfig::from_query(&QueryParams::parse("server=ex.com&port=443&ws-path=/ws"));
        let config = store.generate_config("vless", "abc", &dynamic).unwrap();

        let outbound = &config["outbounds"][0];
        assert_eq!(outbound["server"], "ex.com");
        assert_eq!(outbound["server_port"], 443);
        assert_eq!(outbound["transport"]["path"], "/ws");
        assert_eq!(outbound["transport"]["headers"]["Host"], "ex.com");
        assert_eq!(outbound["uuid"], "abc");

        // 未提供的参数使用默认值
        assert_eq!(config["dns"]["servers"][0]["address"], "8.8.8.8");
        assert_eq!(
            config["dns"]["servers"][1]["address"],
            "https://223.5.5.5/dns-query"
        );
        assert_eq!(config["inbounds"][0]["inet4_address"], json!(["172.19.0.1/28"]));
        assert_eq!(config["inbounds"][0]["mtu"], 9000);
        assert_eq!(config["inbounds"][1]["listen_port"], 2080);
    }

    #[test]
    fn test_generate_only_touches_known_fields() {
        let store = builtin();
        let original = store.get_template("vless").unwrap();

        let a = store
            .generate_config("vless", "u1", &DynamicConfig::default())
            .unwrap();
        let b = store
            .generate_config(
                "vless",
                "u1",
                &DynamicConfig {
                    server: "other.net".to_string(),
                    tun_mtu: 1400,
                    ..DynamicConfig::default()
                },
            )
            .unwrap();

        // 未被覆盖的部分与模板完全一致
        for key in ["log", "route"] {
            assert_eq!(a[key], original[key]);
            assert_eq!(b[key], original[key]);
        }
        assert_eq!(a["outbounds"][1], original["outbounds"][1]);
        assert_eq!(a["dns"]["rules"], original["dns"]["rules"]);
        assert_eq!(
            a["outbounds"][0]["tls"]["utls"],
            b["outbounds"][0]["tls"]["utls"]
        );

        // 仅被覆盖的字段不同
        assert_ne!(a["outbounds"][0]["server"], b["outbounds"][0]["server"]);
        assert_ne!(
            a["outbounds"][0]["transport"]["headers"]["Host"],
            b["outbounds"][0]["transport"]["headers"]["Host"]
        );
        assert_ne!(a["inbounds"][0]["mtu"], b["inbounds"][0]["mtu"]);
        assert_eq!(a["inbounds"][1], b["inbounds"][1]);
        assert_eq!(a["dns"], b["dns"]);
    }

    #[test]
    fn test_generate_unknown_type() {
        let err = builtin()
            .generate_config("nosuch", "abc", &DynamicConfig::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_generate_does_not_mutate_store() {
        let store = builtin();
        let dynamic = DynamicConfig {
            server: "ex.com".to_string(),
            ..DynamicConfig::default()
        };
        store.generate_config("vless", "abc", &dynamic).unwrap();

        let template = store.get_template("vless").unwrap();
        assert_eq!(template["outbounds"][0]["server"], "vless.example.com");
        assert_eq!(template["outbounds"][0]["uuid"], "");
    }

    #[test]
    fn test_load_dir() {
        let dir = std::env::temp_dir().join(format!("vless-generator-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("custom.json"),
            r#"{"outbounds": [{"type": "vless", "server": "x"}]}"#,
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "{not json").unwrap();

        let store = TemplateStore::load_dir(&dir, &["custom".to_string()]).unwrap();
        assert_eq!(store.template_types(), &["custom".to_string()]);

        assert!(TemplateStore::load_dir(&dir, &["broken".to_string()]).is_err());
        assert!(TemplateStore::load_dir(&dir, &["missing".to_string()]).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_insert_replaces_without_duplicating_type() {
        let mut store = TemplateStore::new();
        store.insert("vless", json!({"v": 1}));
        store.insert("vless", json!({"v": 2}));
        assert_eq!(store.template_types().len(), 1);
        assert_eq!(store.get_template("vless").unwrap()["v"], 2);
    }
}
