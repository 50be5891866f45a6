use serde_json::{json, Value};
use tracing::debug;

use crate::config::DynamicConfig;
use crate::utils::{replace_path, set_path};

/// 将动态参数写入模板副本
///
/// 模板中缺失的父节点会被跳过，不会导致失败。
pub fn apply_dynamic_config(config: &mut Value, dynamic: &DynamicConfig) {
    // 出站：服务器地址、端口、WebSocket 路径与 Host
    write(config, "/outbounds/0/server", json!(dynamic.server));
    write(config, "/outbounds/0/server_port", json!(dynamic.server_port));
    write(config, "/outbounds/0/transport/path", json!(dynamic.ws_path));
    write(config, "/outbounds/0/transport/headers/Host", json!(dynamic.server));

    // 仅当模板已声明 server_name 时才覆盖
    replace_path(config, "/outbounds/0/tls/server_name", json!(dynamic.server));

    // DNS 服务器 (需要至少两个条目)
    let dns_servers = config
        .pointer("/dns/servers")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if dns_servers >= 2 {
        write(config, "/dns/servers/0/address", json!(dynamic.dns_server));
        write(config, "/dns/servers/1/address", json!(dynamic.doh_server));
    } else {
        debug!("模板 DNS 服务器少于 2 个，跳过 DNS 参数");
    }

    // 入站：TUN 地址 / MTU 与混合代理端口
    write(config, "/inbounds/0/inet4_address", json!([dynamic.tun_address]));
    write(config, "/inbounds/0/mtu", json!(dynamic.tun_mtu));
    write(config, "/inbounds/1/listen_port", json!(dynamic.mixed_port));
}

/// 为 VLESS 出站设置 UUID
pub fn apply_uuid(config: &mut Value, uuid: &str) -> bool {
    let is_vless = config
        .pointer("/outbounds/0/type")
        .and_then(Value::as_str)
        == Some("vless");

    if is_vless && set_path(config, "/outbounds/0/uuid", json!(uuid)) {
        debug!("UUID 已写入配置: {}", uuid);
        return true;
    }

    false
}

fn write(config: &mut Value, pointer: &str, value: Value) {
    if !set_path(config, pointer, value) {
        debug!("模板缺少路径 {}，跳过写入", pointer);
    }
}
