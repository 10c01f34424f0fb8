//! Critic：对 actor 回答给出 `VERDICT | reason`
//!
//! verdict 大小写不敏感（YES / NO）；无法解析的输出按 NO 处理，原文作为 reason。

use serde::Serialize;

/// critic 角色的指令
pub const CRITIC_INSTRUCTION: &str = "Judge whether the assistant's last response fulfils the user's request. \
Reply with exactly one line: `YES | reason` or `NO | reason`.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub approved: bool,
    pub reason: String,
    /// 原文是否符合 `VERDICT | reason` 格式
    pub parsed: bool,
}

pub fn parse_verdict(text: &str) -> Verdict {
    let trimmed = text.trim();
    let (head, reason) = match trimmed.split_once('|') {
        Some((head, reason)) => (head.trim(), reason.trim()),
        None => (trimmed, ""),
    };
    match head.to_ascii_uppercase().as_str() {
        "YES" => Verdict {
            approved: true,
            reason: reason.to_string(),
            parsed: true,
        },
        "NO" => Verdict {
            approved: false,
            reason: reason.to_string(),
            parsed: true,
        },
        _ => Verdict {
            approved: false,
            reason: trimmed.to_string(),
            parsed: false,
        },
    }
}
