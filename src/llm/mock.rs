//! Mock 模型后端（用于测试与离线演示，无需 API）
//!
//! - EchoModel：确定性回显。actor 先调用 echo 工具回显用户输入，拿到工具结果后给出答案；
//!   critic 对非空回答判 YES。
//! - ScriptedModel：按角色预置回复队列，队列耗尽后使用该角色的兜底回复。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{ModelError, ModelProvider, ModelResponse, ModelRole};
use crate::memory::{Message, Role};
use crate::tools::ToolCall;

/// 确定性回显模型
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

impl EchoModel {
    fn first_user(messages: &[Message]) -> &str {
        messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)")
    }

    /// 最近一条工具结果中的 output.text（否则原文）
    fn last_observation(messages: &[Message]) -> Option<String> {
        let last = messages.iter().rev().find(|m| m.role == Role::Tool)?;
        let text = serde_json::from_str::<Value>(&last.content)
            .ok()
            .and_then(|v| v["output"]["text"].as_str().map(str::to_string))
            .unwrap_or_else(|| last.content.clone());
        Some(text)
    }
}

#[async_trait]
impl ModelProvider for EchoModel {
    fn name(&self) -> &str {
        "echo-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        role: ModelRole,
    ) -> Result<ModelResponse, ModelError> {
        let response = match role {
            ModelRole::Planner => ModelResponse::text("call echo with the request, then answer"),
            ModelRole::Actor => match Self::last_observation(messages) {
                Some(observation) => ModelResponse::text(format!("Echo from Mock: {observation}")),
                None => ModelResponse::text("calling echo").with_tool_call(ToolCall::new(
                    "echo",
                    json!({ "text": Self::first_user(messages) }),
                )),
            },
            ModelRole::Critic => {
                let answered = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .is_some_and(|m| !m.content.trim().is_empty());
                if answered {
                    ModelResponse::text("YES | answer present")
                } else {
                    ModelResponse::text("NO | empty answer")
                }
            }
        };
        Ok(response)
    }
}

/// 脚本化模型：每个角色一个回复队列
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<ModelRole, VecDeque<Result<ModelResponse, ModelError>>>>,
    fallbacks: HashMap<ModelRole, ModelResponse>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<ModelRole, usize>>,
    seen: Mutex<Vec<(ModelRole, Vec<Message>)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条回复到该角色的队列
    pub fn respond(mut self, role: ModelRole, response: ModelResponse) -> Self {
        self.queue(role).push_back(Ok(response));
        self
    }

    pub fn fail(mut self, role: ModelRole, error: ModelError) -> Self {
        self.queue(role).push_back(Err(error));
        self
    }

    /// 队列耗尽后的兜底回复
    pub fn fallback(mut self, role: ModelRole, response: ModelResponse) -> Self {
        self.fallbacks.insert(role, response);
        self
    }

    /// 每次调用前等待（用于超时 / 取消测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn queue(&mut self, role: ModelRole) -> &mut VecDeque<Result<ModelResponse, ModelError>> {
        self.scripts
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role)
            .or_default()
    }

    pub fn calls(&self, role: ModelRole) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&role)
            .copied()
            .unwrap_or(0)
    }

    /// 该角色每次调用收到的消息
    pub fn seen(&self, role: ModelRole) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        role: ModelRole,
    ) -> Result<ModelResponse, ModelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role)
            .or_default() += 1;
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((role, messages.to_vec()));

        let next = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&role)
            .and_then(VecDeque::pop_front);
        match next {
            Some(response) => response,
            None => self
                .fallbacks
                .get(&role)
                .cloned()
                .ok_or(ModelError::Exhausted(role)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_model_calls_tool_then_answers() {
        let model = EchoModel;
        let mut messages = vec![Message::user("hello")];
        let first = model.generate(&messages, ModelRole::Actor).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.tool_calls[0].arguments, json!({"text": "hello"}));

        messages.push(Message::tool(
            "echo",
            r#"{"status":"SUCCESS","output":{"text":"hello"}}"#,
        ));
        let second = model.generate(&messages, ModelRole::Actor).await.unwrap();
        assert!(second.tool_calls.is_empty());
        assert_eq!(second.text, "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_echo_model_critic() {
        let messages = vec![Message::user("q"), Message::assistant("a")];
        let verdict = EchoModel.generate(&messages, ModelRole::Critic).await.unwrap();
        assert!(verdict.text.starts_with("YES"));
    }

    #[tokio::test]
    async fn test_scripted_queue_then_fallback() {
        let model = ScriptedModel::new()
            .respond(ModelRole::Critic, ModelResponse::text("NO | first"))
            .fallback(ModelRole::Critic, ModelResponse::text("YES | later"));
        let a = model.generate(&[], ModelRole::Critic).await.unwrap();
        let b = model.generate(&[], ModelRole::Critic).await.unwrap();
        assert_eq!(a.text, "NO | first");
        assert_eq!(b.text, "YES | later");
        assert_eq!(model.calls(ModelRole::Critic), 2);
        assert_eq!(
            model.generate(&[], ModelRole::Planner).await.unwrap_err(),
            ModelError::Exhausted(ModelRole::Planner)
        );
    }
}
