use tracing::debug;

/// URL 查询参数 (也用于 `application/x-www-form-urlencoded` 请求体)
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// 解析查询字符串，格式错误时视为空参数
    pub fn parse(raw: &str) -> Self {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
            Ok(pairs) => Self(pairs),
            Err(e) => {
                debug!("查询参数解析失败，按空参数处理: {}", e);
                Self::default()
            }
        }
    }

    /// 解析表单请求体
    pub fn parse_bytes(raw: &[u8]) -> Self {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw) {
            Ok(pairs) => Self(pairs),
            Err(e) => {
                debug!("表单解析失败，按空参数处理: {}", e);
                Self::default()
            }
        }
    }

    /// 返回键的第一个值；值为空字符串时视为缺失
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for QueryParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}
