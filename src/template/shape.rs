use serde_json::Value;

/// 检查模板是否符合生成器预期的结构
///
/// 返回所有不符合预期的 JSON Pointer 路径及原因；空列表表示结构完整。
/// 结构缺失不会阻止模板加载，生成时对应字段会被跳过。
pub fn check_shape(template: &Value) -> Vec<String> {
    let mut issues = Vec::new();

    if !template.is_object() {
        issues.push("/: template root is not an object".to_string());
        return issues;
    }

    match template.pointer("/outbounds/0") {
        Some(Value::Object(outbound)) => {
            if !outbound.contains_key("type") {
                issues.push("/outbounds/0/type: missing".to_string());
            }
            expect_object(template, "/outbounds/0/transport", &mut issues);
            expect_object(template, "/outbounds/0/transport/headers", &mut issues);
        }
        Some(_) => issues.push("/outbounds/0: not an object".to_string()),
        None => issues.push("/outbounds: missing or empty".to_string()),
    }

    match template.pointer("/dns/servers") {
        Some(Value::Array(servers)) if servers.len() >= 2 => {
            expect_object(template, "/dns/servers/0", &mut issues);
            expect_object(template, "/dns/servers/1", &mut issues);
        }
        Some(Value::Array(_)) => issues.push("/dns/servers: fewer than 2 entries".to_string()),
        _ => issues.push("/dns/servers: missing or not an array".to_string()),
    }

    match template.get("inbounds") {
        Some(Value::Array(inbounds)) if inbounds.len() >= 2 => {
            expect_object(template, "/inbounds/0", &mut issues);
            expect_object(template, "/inbounds/1", &mut issues);
        }
        Some(Value::Array(_)) => issues.push("/inbounds: fewer than 2 entries".to_string()),
        _ => issues.push("/inbounds: missing or not an array".to_string()),
    }

    issues
}

fn expect_object(template: &Value, pointer: &str, issues: &mut Vec<String>) {
    match template.pointer(pointer) {
        Some(Value::Object(_)) => {}
        Some(_) => issues.push(format!("{}: not an object", pointer)),
        None => issues.push(format!("{}: missing", pointer)),
    }
}
