use serde::{Deserialize, Serialize};

use super::QueryParams;

/// 请求级动态参数
///
/// 每个字段在请求中缺失时使用默认值；整数字段只有在解析成功时才会被覆盖，
/// 非法输入静默保留默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicConfig {
    /// VLESS 服务器地址
    pub server: String,
    /// VLESS 服务器端口
    pub server_port: i64,
    /// WebSocket 路径
    pub ws_path: String,
    /// 远程 DNS 服务器
    pub dns_server: String,
    /// DNS over HTTPS 服务器
    pub doh_server: String,
    /// TUN 接口地址
    pub tun_address: String,
    /// 混合代理端口
    pub mixed_port: i64,
    /// TUN 接口 MTU
    pub tun_mtu: i64,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            server: "vless.example.com".to_string(),
            server_port: 443,
            ws_path: "/websocket".to_string(),
            dns_server: "8.8.8.8".to_string(),
            doh_server: "https://223.5.5.5/dns-query".to_string(),
            tun_address: "172.19.0.1/28".to_string(),
            mixed_port: 2080,
            tun_mtu: 9000,
        }
    }
}

impl DynamicConfig {
    /// 从查询参数解析动态配置
    pub fn from_query(query: &QueryParams) -> Self {
        let mut config = Self::default();

        if let Some(server) = query.get("server") {
            config.server = server.to_string();
        }
        if let Some(port) = parse_int(query, "port") {
            config.server_port = port;
        }
        if let Some(ws_path) = query.get("ws-path") {
            config.ws_path = ws_path.to_string();
        }
        if let Some(dns_server) = query.get("dns-server") {
            config.dns_server = dns_server.to_string();
        }
        if let Some(doh_server) = query.get("doh-server") {
            config.doh_server = doh_server.to_string();
        }
        if let Some(tun_address) = query.get("tun-address") {
            config.tun_address = tun_address.to_string();
        }
        if let Some(mixed_port) = parse_int(query, "mixed-port") {
            config.mixed_port = mixed_port;
        }
        if let Some(tun_mtu) = parse_int(query, "tun-mtu") {
            config.tun_mtu = tun_mtu;
        }

        config
    }
}

fn parse_int(query: &QueryParams, key: &str) -> Option<i64> {
    query.get(key).and_then(|v| v.parse().ok())
}
