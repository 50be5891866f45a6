use thiserror::Error;

/// 配置生成错误类型
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("template type {0} not found")]
    TemplateNotFound(String),

    #[error("invalid {0} configuration")]
    InvalidTemplate(&'static str),

    #[error("render error: {0}")]
    Render(String),

    #[error("QR code error: {0}")]
    QrCode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeneratorError {
    /// 是否属于"资源不存在"类错误 (映射为 404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, GeneratorError::TemplateNotFound(_))
    }
}
