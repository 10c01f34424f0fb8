//! 工具调用的数据类型：ToolCall / ToolResult / ToolError / ProviderError / ToolCallRecord

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// 一次工具调用：由 actor 产生或由调用方直接构造，只被 ToolExecutor 消费一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            run_id: String::new(),
            scopes: Vec::new(),
            timeout_ms: None,
            idempotency_key: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Success,
    Failure,
    Timeout,
    InvalidInput,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "SUCCESS",
            ToolStatus::Failure => "FAILURE",
            ToolStatus::Timeout => "TIMEOUT",
            ToolStatus::InvalidInput => "INVALID_INPUT",
        }
    }
}

/// 错误分类；Provider 携带工具后端自己的错误类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolErrorKind {
    PolicyViolation,
    BudgetExceeded,
    InvalidInput,
    ToolResultInvalid,
    Timeout,
    Provider(String),
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ToolErrorKind::PolicyViolation => "PolicyViolation",
            ToolErrorKind::BudgetExceeded => "BudgetExceeded",
            ToolErrorKind::InvalidInput => "InvalidInput",
            ToolErrorKind::ToolResultInvalid => "ToolResultInvalid",
            ToolErrorKind::Timeout => "Timeout",
            ToolErrorKind::Provider(kind) => kind,
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ToolErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 非 SUCCESS 结果携带的结构化错误；source 标明由哪一层产生（policy / schema / budget / provider / executor）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            output,
            error: None,
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>, source: &str) -> Self {
        Self {
            status: ToolStatus::Failure,
            output: Value::Null,
            error: Some(ToolError {
                kind,
                message: message.into(),
                source: source.to_string(),
            }),
        }
    }

    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::failure(ToolErrorKind::PolicyViolation, message, "policy")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::InvalidInput,
            output: Value::Null,
            error: Some(ToolError {
                kind: ToolErrorKind::InvalidInput,
                message: message.into(),
                source: "schema".to_string(),
            }),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Timeout,
            output: Value::Null,
            error: Some(ToolError {
                kind: ToolErrorKind::Timeout,
                message: message.into(),
                source: "executor".to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn error_kind(&self) -> Option<&ToolErrorKind> {
        self.error.as_ref().map(|e| &e.kind)
    }

    /// 写回对话上下文的文本（JSON）
    pub fn to_observation(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"status\":\"{}\"}}", self.status.as_str()))
    }
}

/// 工具后端抛出的类型化错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// 未细分类别的后端错误
    pub fn other(message: impl Into<String>) -> Self {
        Self::new("ToolProviderError", message)
    }
}

/// 工具调用日志条目（按执行顺序落盘为 tool_calls.jsonl）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub seq: u64,
    pub run_id: String,
    pub tool: String,
    pub arguments: Value,
    pub status: ToolStatus,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}
