//! JSON 模板辅助函数
//!
//! 路径使用 JSON Pointer 语法 (RFC 6901)，例如 `/outbounds/0/server`。

use serde_json::{Map, Value};

/// 递归深拷贝 JSON 值
///
/// 返回值与输入不共享任何容器，对返回值的修改不会影响原模板。
pub fn deep_copy(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut copy = Map::with_capacity(map.len());
            for (key, item) in map {
                copy.insert(key.clone(), deep_copy(item));
            }
            Value::Object(copy)
        }
        Value::Array(items) => Value::Array(items.iter().map(deep_copy).collect()),
        scalar => scalar.clone(),
    }
}

/// 在指定路径写入值
///
/// 父节点必须已存在：对象可以新增键，数组只能覆盖已有下标。
/// 写入成功返回 `true`，路径不符合模板结构时不做修改并返回 `false`。
pub fn set_path(root: &mut Value, pointer: &str, value: Value) -> bool {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return false;
    };

    let Some(target) = root.pointer_mut(parent) else {
        return false;
    };

    let key = unescape(last);
    match target {
        Value::Object(map) => {
            map.insert(key, value);
            true
        }
        Value::Array(items) => match key.parse::<usize>() {
            Ok(idx) if idx < items.len() => {
                items[idx] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// 仅当路径已存在时写入值
pub fn replace_path(root: &mut Value, pointer: &str, value: Value) -> bool {
    match root.pointer_mut(pointer) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}
