//! JSON Schema：schemars 生成内置工具参数 schema，jsonschema 校验工具输入 / 输出

use jsonschema::validator_for;
use schemars::{schema_for, JsonSchema};
use serde_json::{json, Map, Value};

/// 由类型派生 JSON Schema（用于内置工具的 input_schema）
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(&schema).unwrap_or_else(|_| json!({"type": "object"}))
}

/// 检查 schema 本身能否编译
pub fn check_schema(schema: &Value) -> Result<(), String> {
    validator_for(schema).map(|_| ()).map_err(|e| e.to_string())
}

/// 用 schema 校验实例；失败时返回全部错误信息
pub fn validate(schema: &Value, instance: &Value) -> Result<(), Vec<String>> {
    let validator = validator_for(schema).map_err(|e| vec![format!("invalid schema: {e}")])?;
    if validator.is_valid(instance) {
        return Ok(());
    }
    Err(validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}

/// 工具调用请求格式：与 actor 返回的 `{"name": "...", "arguments": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 echo、read_file、write_file
    pub name: String,
    /// 工具参数，须满足对应工具的 input_schema
    pub arguments: Map<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    serde_json::to_string_pretty(&schema_of::<ToolCallFormat>()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct PathArgs {
        path: String,
    }

    #[test]
    fn test_derived_schema_validates() {
        let schema = schema_of::<PathArgs>();
        assert!(check_schema(&schema).is_ok());
        assert!(validate(&schema, &json!({"path": "a.txt"})).is_ok());
        let errors = validate(&schema, &json!({"path": 3})).unwrap_err();
        assert!(!errors.is_empty());
        assert!(validate(&schema, &json!({})).is_err());
    }

    #[test]
    fn test_bad_schema_rejected() {
        assert!(check_schema(&json!({"type": "not-a-type"})).is_err());
    }

    #[test]
    fn test_tool_call_schema_mentions_fields() {
        let s = tool_call_schema_json();
        assert!(s.contains("arguments"));
        assert!(s.contains("name"));
    }
}
