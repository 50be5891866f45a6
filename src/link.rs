use serde_json::Value;
use tracing::{debug, warn};

use crate::utils::GeneratorError;

/// 根据生成的配置构建 VLESS 连接 URL
///
/// 格式: `vless://{uuid}@{server}:{port}?type=ws&path={path}&host={host}&security=tls&fp=chrome`
pub fn generate_vless_url(config: &Value, uuid: &str) -> Result<String, GeneratorError> {
    let outbound = config
        .get("outbounds")
        .and_then(Value::as_array)
        .filter(|outbounds| !outbounds.is_empty())
        .ok_or(GeneratorError::InvalidTemplate("outbounds"))?
        .first()
        .and_then(Value::as_object)
        .ok_or(GeneratorError::InvalidTemplate("outbound"))?;

    let server = outbound
        .get("server")
        .and_then(Value::as_str)
        .ok_or(GeneratorError::InvalidTemplate("server"))?;

    let server_port = match outbound.get("server_port") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(443),
        other => {
            warn!("server_port 类型异常 ({:?})，使用默认端口 443", other);
            443
        }
    };

    let transport = outbound
        .get("transport")
        .and_then(Value::as_object)
        .ok_or(GeneratorError::InvalidTemplate("transport"))?;

    let path = transport
        .get("path")
        .and_then(Value::as_str)
        .ok_or(GeneratorError::InvalidTemplate("path"))?;

    let host = transport
        .get("headers")
        .and_then(Value::as_object)
        .ok_or(GeneratorError::InvalidTemplate("headers"))?
        .get("Host")
        .and_then(Value::as_str)
        .ok_or(GeneratorError::InvalidTemplate("host"))?;

    let url = format!(
        "vless://{}@{}:{}?type=ws&path={}&host={}&security=tls&fp=chrome",
        uuid, server, server_port, path, host
    );

    debug!("生成 VLESS URL: {}", url);
    Ok(url)
}
