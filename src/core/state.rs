//! 运行状态机：RunPhase 阶段与 RunStatus 终态
//!
//! INIT → PLAN → ACT → (TOOL_DISPATCH)* → CRITIQUE → {PLAN（下一轮）| 终态}。
//! 任何非终态都可以直接进入终态（取消、超时、预算耗尽、轮数用尽）。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// 运行阶段（状态机节点）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Init,
    Plan,
    Act,
    ToolDispatch,
    Critique,
    Done,
    Failed,
    Timeout,
    Cancelled,
    BudgetExceeded,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "INIT",
            RunPhase::Plan => "PLAN",
            RunPhase::Act => "ACT",
            RunPhase::ToolDispatch => "TOOL_DISPATCH",
            RunPhase::Critique => "CRITIQUE",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
            RunPhase::Timeout => "TIMEOUT",
            RunPhase::Cancelled => "CANCELLED",
            RunPhase::BudgetExceeded => "BUDGET_EXCEEDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Done
                | RunPhase::Failed
                | RunPhase::Timeout
                | RunPhase::Cancelled
                | RunPhase::BudgetExceeded
        )
    }

    /// 合法迁移表
    fn can_transition_to(&self, to: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_terminal() {
            return true;
        }
        matches!(
            (self, to),
            (RunPhase::Init, RunPhase::Plan)
                | (RunPhase::Plan, RunPhase::Act)
                | (RunPhase::Act, RunPhase::ToolDispatch)
                | (RunPhase::Act, RunPhase::Critique)
                | (RunPhase::ToolDispatch, RunPhase::Act)
                | (RunPhase::Critique, RunPhase::Plan)
                | (RunPhase::Critique, RunPhase::Act)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行终态（写入 RunResult.status）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
    Timeout,
    Cancelled,
    BudgetExceeded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Timeout => "TIMEOUT",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::BudgetExceeded => "BUDGET_EXCEEDED",
        }
    }

    /// 终态对应的状态机节点
    pub fn phase(&self) -> RunPhase {
        match self {
            RunStatus::Success => RunPhase::Done,
            RunStatus::Failed => RunPhase::Failed,
            RunStatus::Timeout => RunPhase::Timeout,
            RunStatus::Cancelled => RunPhase::Cancelled,
            RunStatus::BudgetExceeded => RunPhase::BudgetExceeded,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次运行的状态机：只记录当前阶段并校验迁移是否合法
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    phase: RunPhase,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// 迁移到下一阶段，返回迁移前的阶段
    pub fn transition(&mut self, to: RunPhase) -> Result<RunPhase, EngineError> {
        let from = self.phase;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        self.phase = to;
        Ok(from)
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
