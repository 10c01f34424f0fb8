//! 运行引擎：Plan → Act (Tool)* → Critique 状态机循环
//!
//! - critic：解析 `VERDICT | reason`
//! - prompt：各角色的消息拼装
//! - loop_：RunEngine 主循环与终止条件

pub mod critic;
pub mod loop_;
pub mod prompt;

pub use critic::{parse_verdict, Verdict};
pub use loop_::{EngineConfig, RunEngine, RunReport, DEFAULT_SYSTEM_PROMPT};
