//! 模型后端抽象
//!
//! 所有后端（Mock / 本地 / 云端）实现 ModelProvider：generate(messages, role) → ModelResponse。
//! 同样的参数可重复调用，除后端自身的统计外不产生副作用。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::parse::parse_tool_calls;
use crate::memory::Message;
use crate::tools::ToolCall;

/// 模型角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Planner,
    Actor,
    Critic,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Planner => "planner",
            ModelRole::Actor => "actor",
            ModelRole::Critic => "critic",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模型回复：文本 + 零或多个工具调用
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// 仅返回文本的后端：从文本中提取 JSON 工具调用
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let tool_calls = parse_tool_calls(&text);
        Self { text, tool_calls }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Script exhausted for role {0}")]
    Exhausted(ModelRole),
}

/// 模型后端 trait
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// 后端名称（用于事件与日志）
    fn name(&self) -> &str {
        "model"
    }

    async fn generate(&self, messages: &[Message], role: ModelRole)
        -> Result<ModelResponse, ModelError>;
}
