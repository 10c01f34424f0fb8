//! Echo 工具（测试 / 演示用）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::schema::schema_of;
use crate::tools::{ProviderError, ToolContract, ToolProvider};

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoArgs {
    /// 要回显的文本
    text: String,
}

/// Echo 工具：回显文本
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoProvider;

#[async_trait]
impl ToolProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn list_tools(&self) -> Vec<ToolContract> {
        let contract = ToolContract::builder("echo")
            .description("Echo text (for testing). Args: {\"text\": \"message\"}")
            .input_schema(schema_of::<EchoArgs>())
            .output_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }))
            .build();
        match contract {
            Ok(c) => vec![c],
            Err(e) => {
                tracing::error!(error = %e, "echo contract rejected");
                Vec::new()
            }
        }
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, ProviderError> {
        if tool_name != "echo" {
            return Err(ProviderError::new("UnknownTool", tool_name));
        }
        let args: EchoArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| ProviderError::new("BadArguments", e.to_string()))?;
        Ok(json!({ "text": args.text }))
    }
}
