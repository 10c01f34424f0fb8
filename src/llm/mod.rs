//! 模型层：后端抽象、角色注册表、Mock 实现

pub mod mock;
pub mod parse;
pub mod registry;
pub mod traits;

pub use mock::{EchoModel, ScriptedModel};
pub use parse::parse_tool_calls;
pub use registry::ModelRegistry;
pub use traits::{ModelError, ModelProvider, ModelResponse, ModelRole};
