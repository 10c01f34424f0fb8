//! 工具注册表
//!
//! 所有工具后端实现 ToolProvider（list_tools / execute），启动时注册进 ToolRegistry；
//! 注册时收集每个后端的契约，工具名跨后端唯一。注册表构造完成后以 Arc 只读共享。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::{ProviderError, ToolContract};

/// 工具后端 trait：列出契约、按名执行（参数为 JSON）
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 该后端提供的全部工具契约
    fn list_tools(&self) -> Vec<ToolContract>;

    /// 执行工具；后端失败返回类型化 ProviderError
    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, ProviderError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool '{tool}' is already registered by provider '{provider}'")]
    DuplicateTool { tool: String, provider: String },
}

struct RegisteredTool {
    provider: Arc<dyn ToolProvider>,
    contract: ToolContract,
}

/// 工具注册表：工具名 → (后端, 契约)
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个后端；任一工具名与已注册的冲突时整体拒绝
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) -> Result<(), RegistryError> {
        let contracts = provider.list_tools();
        for contract in &contracts {
            if let Some(existing) = self.tools.get(contract.name()) {
                return Err(RegistryError::DuplicateTool {
                    tool: contract.name().to_string(),
                    provider: existing.provider.name().to_string(),
                });
            }
        }
        for contract in contracts {
            tracing::debug!(tool = contract.name(), provider = provider.name(), "tool registered");
            self.tools.insert(
                contract.name().to_string(),
                RegisteredTool {
                    provider: provider.clone(),
                    contract,
                },
            );
        }
        Ok(())
    }

    pub fn with_provider(mut self, provider: Arc<dyn ToolProvider>) -> Result<Self, RegistryError> {
        self.register(provider)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Option<(&Arc<dyn ToolProvider>, &ToolContract)> {
        self.tools.get(name).map(|t| (&t.provider, &t.contract))
    }

    pub fn contract(&self, name: &str) -> Option<&ToolContract> {
        self.tools.get(name).map(|t| &t.contract)
    }

    /// 按名称排序的工具名列表
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的契约列表
    pub fn contracts(&self) -> Vec<&ToolContract> {
        let mut contracts: Vec<&ToolContract> = self.tools.values().map(|t| &t.contract).collect();
        contracts.sort_by(|a, b| a.name().cmp(b.name()));
        contracts
    }

    /// 工具目录 JSON（name / description / risk / input_schema），用于 actor 的 system prompt
    pub fn to_catalog_json(&self) -> String {
        let tools: Vec<Value> = self
            .contracts()
            .into_iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name(),
                    "description": c.description(),
                    "risk": c.risk(),
                    "input_schema": c.input_schema(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
