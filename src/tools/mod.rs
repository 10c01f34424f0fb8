pub mod contract;
pub mod echo;
pub mod executor;
pub mod filesystem;
pub mod policy;
pub mod registry;
pub mod sandbox;
pub mod schema;
pub mod types;

pub use contract::{ContractError, DataHandling, Idempotency, RiskLevel, ToolContract, ToolContractBuilder};
pub use echo::EchoProvider;
pub use executor::ToolExecutor;
pub use filesystem::FileSystemProvider;
pub use policy::{PolicyOverrides, ToolPolicy};
pub use registry::{RegistryError, ToolProvider, ToolRegistry};
pub use sandbox::PathSandbox;
pub use schema::tool_call_schema_json;
pub use types::{
    ProviderError, ToolCall, ToolCallRecord, ToolError, ToolErrorKind, ToolResult, ToolStatus,
};
