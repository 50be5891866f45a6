//! 界面文本国际化
//!
//! 文本表以 JSON 形式内嵌在二进制中，启动时解析一次。

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::{info, warn};

/// 一种语言的全部文本
pub type Texts = HashMap<String, String>;

/// 默认语言
pub const DEFAULT_LANGUAGE: &str = "en";

/// 支持的语言及其文本表
const BUILTIN_LANGUAGES: &[(&str, &str)] = &[
    ("en", include_str!("en.json")),
    ("ru", include_str!("ru.json")),
];

static EMPTY_TEXTS: Lazy<Texts> = Lazy::new(Texts::new);

/// 根据 `lang` 参数选择语言，不支持时回退到英文
pub fn detect_language(lang: Option<&str>) -> &'static str {
    lang.and_then(|lang| {
        BUILTIN_LANGUAGES
            .iter()
            .map(|(code, _)| *code)
            .find(|code| *code == lang)
    })
    .unwrap_or(DEFAULT_LANGUAGE)
}

#[derive(Debug, Default)]
pub struct I18n {
    translations: HashMap<String, Texts>,
}

impl I18n {
    /// 加载内置文本表
    pub fn load_builtin() -> Result<Self> {
        let mut i18n = Self::default();
        for (language, content) in BUILTIN_LANGUAGES {
            let texts: Texts = serde_json::from_str(content)
                .with_context(|| format!("failed to parse translation {}", language))?;
            i18n.translations.insert(language.to_string(), texts);
        }

        info!("🌐 已加载 {} 种语言", i18n.translations.len());
        Ok(i18n)
    }

    /// 获取指定语言的文本，缺失时回退到英文
    pub fn texts(&self, language: &str) -> &Texts {
        if let Some(texts) = self.translations.get(language) {
            return texts;
        }

        if let Some(texts) = self.translations.get(DEFAULT_LANGUAGE) {
            warn!("语言 {} 不存在，回退到英文", language);
            return texts;
        }

        warn!("没有可用的文本表 (请求语言: {})", language);
        &EMPTY_TEXTS
    }

    /// 已加载的语言
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.translations.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}
