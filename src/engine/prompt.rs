//! 各角色的消息拼装
//!
//! planner：system + 对话上下文 + 固定控制消息；其文本仅供参考，不参与控制流。
//! actor：system（含工具目录与本轮计划）+ 对话上下文。
//! critic：critic 指令 + 用户请求 + actor 回答。

use crate::engine::critic::CRITIC_INSTRUCTION;
use crate::memory::Message;

pub const PLAN_CONTROL: &str = "produce the next step";
pub const FINAL_ANSWER_CONTROL: &str = "provide the final answer";

fn with_system(system: String, context: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(context.len() + 2);
    if !system.trim().is_empty() {
        messages.push(Message::system(system));
    }
    messages.extend_from_slice(context);
    messages
}

pub fn planner_messages(system_prompt: &str, context: &[Message]) -> Vec<Message> {
    let mut messages = with_system(system_prompt.to_string(), context);
    messages.push(Message::user(PLAN_CONTROL));
    messages
}

pub fn actor_messages(
    system_prompt: &str,
    tool_catalog: &str,
    plan: &str,
    context: &[Message],
) -> Vec<Message> {
    let mut system = system_prompt.to_string();
    if !tool_catalog.is_empty() {
        system.push_str("\n\n## Available tools\n");
        system.push_str(tool_catalog);
    }
    if !plan.trim().is_empty() {
        system.push_str("\n\n## Plan for this step\n");
        system.push_str(plan.trim());
    }
    with_system(system, context)
}

pub fn critic_messages(input: &str, answer: &str) -> Vec<Message> {
    vec![
        Message::system(CRITIC_INSTRUCTION),
        Message::user(input),
        Message::assistant(answer),
    ]
}

pub fn final_answer_messages(system_prompt: &str, context: &[Message]) -> Vec<Message> {
    let mut messages = with_system(system_prompt.to_string(), context);
    messages.push(Message::user(FINAL_ANSWER_CONTROL));
    messages
}
