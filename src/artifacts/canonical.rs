//! 规范化 JSON 与配置哈希
//!
//! 对象键按字典序输出、无多余空白，结果与键的插入顺序无关；哈希为其 SHA-256（hex）。

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::artifacts::ArtifactError;

/// 规范化序列化（键排序、紧凑格式）
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// 配置快照哈希：与键顺序无关
pub fn config_hash(value: &Value) -> String {
    sha256_hex(canonical_string(value).as_bytes())
}

/// 任意可序列化值 → JSON 值
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, ArtifactError> {
    serde_json::to_value(value).map_err(ArtifactError::Serialize)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_hash_is_order_independent() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(config_hash(&a), config_hash(&b));
        assert_ne!(config_hash(&a), config_hash(&json!({"a": 1, "b": 3})));
    }

    #[test]
    fn test_canonical_nested() {
        let v = json!({"z": [ {"b": 1, "a": "x"} ], "a": null});
        assert_eq!(canonical_string(&v), r#"{"a":null,"z":[{"a":"x","b":1}]}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
