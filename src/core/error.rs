//! 引擎错误类型
//!
//! EngineError 只在引擎内部流转：RunEngine::run 对外永远返回 RunResult，
//! 这里的错误最终会被折叠为 RunStatus::Failed + reason 字符串。

use thiserror::Error;

use crate::core::state::RunPhase;
use crate::llm::ModelRole;

/// 引擎运行过程中可能出现的错误（模型调用失败、缺少角色、非法状态迁移等）
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Missing model for role: {0}")]
    MissingModel(ModelRole),

    #[error("Model error ({role}): {message}")]
    Model { role: ModelRole, message: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl EngineError {
    /// 写入 RunResult.reason 的简短原因
    pub fn reason(&self) -> String {
        match self {
            EngineError::Model { message, .. } => format!("model_error: {message}"),
            other => format!("engine_error: {other}"),
        }
    }
}
