//! 运行请求与结果：RunRequest（创建后不可变）、RunResult（每次运行只产出一次）

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::RunStatus;
use crate::tools::PolicyOverrides;

const DEFAULT_MAX_TURNS: u32 = 8;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// 运行请求：输入文本、运行 ID、最大轮数、墙钟超时、取消令牌、授予的 scopes、可选的策略覆盖
///
/// 字段只读；通过 `with_*` 在提交前组装。
#[derive(Debug, Clone)]
pub struct RunRequest {
    input: String,
    run_id: String,
    max_turns: u32,
    timeout: Duration,
    cancel_token: CancellationToken,
    scopes: Vec<String>,
    policy_overrides: Option<PolicyOverrides>,
}

impl RunRequest {
    /// 以默认参数创建请求，运行 ID 随机生成
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            cancel_token: CancellationToken::new(),
            scopes: Vec::new(),
            policy_overrides: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// 本次运行授予工具调用的 scopes（模型产生的调用不能自行授予）
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy_overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.policy_overrides = Some(overrides);
        self
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn policy_overrides(&self) -> Option<&PolicyOverrides> {
        self.policy_overrides.as_ref()
    }
}

/// 用量计数：估算 token、模型调用次数、工具调用次数与失败次数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    pub tokens: u64,
    pub model_calls: u32,
    pub tool_calls: u32,
    pub tool_failures: u32,
}

/// 运行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub output: String,
    pub turns: u32,
    pub reason: Option<String>,
    pub usage: RunUsage,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
