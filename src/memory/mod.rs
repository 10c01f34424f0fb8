//! 记忆层：对话消息、token 估算、按 token 上限滚动的会话记忆

pub mod conversation;
pub mod session;
pub mod token_budget;

pub use conversation::{Message, Role};
pub use session::SessionMemory;
pub use token_budget::TokenEstimator;
