//! Hive - Rust 智能体运行引擎
//!
//! 模块划分：
//! - **agent**: 无头运行时（组件组装 + 运行落盘）
//! - **artifacts**: 运行记录落盘、配置哈希、确定性归一化与 golden 比对
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 运行状态机、运行请求 / 结果、引擎错误
//! - **engine**: Plan → Act → Critique 主循环
//! - **llm**: 模型后端抽象、角色注册表、Mock 实现
//! - **memory**: 对话消息与按 token 限额滚动的会话记忆
//! - **observability**: 进程日志初始化与运行事件总线（追踪、脱敏、多路导出）
//! - **tools**: 工具契约、注册表、策略化执行器与内置工具

pub mod agent;
pub mod artifacts;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{RunRequest, RunResult, RunStatus};
pub use crate::engine::{EngineConfig, RunEngine};
