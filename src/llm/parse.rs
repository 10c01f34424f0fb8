//! 从模型文本中解析工具调用
//!
//! 支持 ```json 代码块或裸 JSON；JSON 可以是单个 `{"name": ..., "arguments": {...}}`
//! 或其数组。解析不出时视为纯文本回复（无工具调用）。

use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolCall;

#[derive(Debug, Deserialize)]
struct RawCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCalls {
    One(RawCall),
    Many(Vec<RawCall>),
}

/// 截取文本中的 JSON 片段
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('[') { ']' } else { '}' };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let Some(json) = extract_json(text) else {
        return Vec::new();
    };
    let calls = match serde_json::from_str::<RawCalls>(json) {
        Ok(RawCalls::One(call)) => vec![call],
        Ok(RawCalls::Many(calls)) => calls,
        Err(_) => return Vec::new(),
    };
    calls
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .map(|c| {
            let arguments = if c.arguments.is_null() {
                Value::Object(Default::default())
            } else {
                c.arguments
            };
            ToolCall::new(c.name, arguments)
        })
        .collect()
}
