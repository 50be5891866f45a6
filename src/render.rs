//! HTML 页面渲染
//!
//! 页面模板使用 `{{name}}` 占位符，`{{t.key}}` 引用当前语言的文本。
//! 所有替换值都会做 HTML 转义。

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::DynamicConfig;
use crate::i18n::Texts;
use crate::utils::GeneratorError;

const HOME_TEMPLATE: &str = include_str!("../web/templates/home.html");
const CONFIG_TEMPLATE: &str = include_str!("../web/templates/config.html");

/// 文本占位符前缀
const TEXT_PREFIX: &str = "t.";

/// URL 路径段中需要编码的字符
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// 已解析的页面模板
#[derive(Debug, Clone)]
struct PageTemplate {
    name: &'static str,
    segments: Vec<Segment>,
}

impl PageTemplate {
    fn parse(name: &'static str, source: &str) -> Result<Self, GeneratorError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                GeneratorError::Render(format!("template {}: unclosed placeholder", name))
            })?;
            let key = after[..end].trim();
            if key.is_empty() {
                return Err(GeneratorError::Render(format!(
                    "template {}: empty placeholder",
                    name
                )));
            }
            segments.push(Segment::Placeholder(key.to_string()));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { name, segments })
    }

    fn render(&self, vars: &HashMap<&str, String>, texts: &Texts) -> Result<String, GeneratorError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    let value = match key.strip_prefix(TEXT_PREFIX) {
                        Some(text_key) => texts.get(text_key).map(String::as_str).unwrap_or(""),
                        None => vars.get(key.as_str()).map(String::as_str).ok_or_else(|| {
                            GeneratorError::Render(format!(
                                "template {}: no value for {}",
                                self.name, key
                            ))
                        })?,
                    };
                    escape_html_into(value, &mut out);
                }
            }
        }
        Ok(out)
    }
}

/// 首页数据
pub struct HomePage<'a> {
    pub language: &'a str,
    pub texts: &'a Texts,
    pub defaults: &'a DynamicConfig,
}

/// 配置页数据
pub struct ConfigPage<'a> {
    pub language: &'a str,
    pub texts: &'a Texts,
    /// 原始 (小写) 类型名，用于下载链接
    pub config_type: &'a str,
    pub uuid: &'a str,
    /// Base64 编码的 PNG 二维码
    pub qr_code: String,
    pub vless_url: &'a str,
    /// 原始查询字符串，附加到下载链接
    pub query_string: &'a str,
}

/// HTML 渲染器
#[derive(Debug, Clone)]
pub struct Renderer {
    home: PageTemplate,
    config: PageTemplate,
}

impl Renderer {
    /// 解析内置页面模板
    pub fn load_builtin() -> Result<Self, GeneratorError> {
        let renderer = Self {
            home: PageTemplate::parse("home", HOME_TEMPLATE)?,
            config: PageTemplate::parse("config", CONFIG_TEMPLATE)?,
        };
        info!("📄 HTML 模板加载完成");
        Ok(renderer)
    }

    pub fn render_home(&self, page: &HomePage<'_>) -> Result<String, GeneratorError> {
        let defaults = page.defaults;
        let mut vars = base_vars(page.language, page.texts);
        vars.insert("server", defaults.server.clone());
        vars.insert("server_port", defaults.server_port.to_string());
        vars.insert("ws_path", defaults.ws_path.clone());
        vars.insert("dns_server", defaults.dns_server.clone());
        vars.insert("doh_server", defaults.doh_server.clone());
        vars.insert("tun_address", defaults.tun_address.clone());
        vars.insert("mixed_port", defaults.mixed_port.to_string());
        vars.insert("tun_mtu", defaults.tun_mtu.to_string());

        debug!("渲染首页 (语言: {})", page.language);
        self.home.render(&vars, page.texts)
    }

    pub fn render_config(&self, page: &ConfigPage<'_>) -> Result<String, GeneratorError> {
        let mut vars = base_vars(page.language, page.texts);
        vars.insert("config_type", page.config_type.to_uppercase());
        vars.insert("config_type_path", encode_path_segment(page.config_type));
        vars.insert("uuid", page.uuid.to_string());
        vars.insert("uuid_path", encode_path_segment(page.uuid));
        vars.insert("qr_code", page.qr_code.clone());
        vars.insert("vless_url", page.vless_url.to_string());
        vars.insert("query_string", page.query_string.to_string());

        debug!("渲染配置页: {} (语言: {})", page.config_type, page.language);
        self.config.render(&vars, page.texts)
    }
}

fn base_vars<'a>(language: &str, texts: &Texts) -> HashMap<&'a str, String> {
    let mut vars = HashMap::new();
    vars.insert("lang", language.to_string());
    vars.insert("title", texts.get("title").cloned().unwrap_or_default());
    vars
}

/// 编码单个 URL 路径段 (非 ASCII 字符按 UTF-8 编码)
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// HTML 转义
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    escape_html_into(value, &mut out);
    out
}

fn escape_html_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
