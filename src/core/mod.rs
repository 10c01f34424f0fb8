//! 核心类型层：引擎错误、运行状态机、运行请求与结果

pub mod error;
pub mod run;
pub mod state;

pub use error::EngineError;
pub use run::{RunRequest, RunResult, RunUsage};
pub use state::{RunPhase, RunStateMachine, RunStatus};
