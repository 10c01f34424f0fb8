//! 集成测试共用：固定工具后端与引擎组装

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use hive::engine::{EngineConfig, RunEngine};
use hive::llm::ModelRegistry;
use hive::observability::{InMemoryExporter, ObservabilityEmitter, Redactor};
use hive::tools::{
    EchoProvider, ProviderError, ToolContract, ToolExecutor, ToolPolicy, ToolProvider,
    ToolRegistry,
};

pub const LOOKUP_SCOPE: &str = "kv:read";

/// 固定工具：lookup（需 kv:read）、slow（50ms）、flaky（总是失败）
#[derive(Default)]
pub struct FixtureTools {
    calls: AtomicUsize,
}

impl FixtureTools {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolProvider for FixtureTools {
    fn name(&self) -> &str {
        "fixture"
    }

    fn list_tools(&self) -> Vec<ToolContract> {
        vec![
            ToolContract::builder("lookup")
                .description("Look up a value by key")
                .required_scopes([LOOKUP_SCOPE])
                .input_schema(json!({
                    "type": "object",
                    "properties": {"key": {"type": "string"}},
                    "required": ["key"]
                }))
                .output_schema(json!({
                    "type": "object",
                    "properties": {"value": {"type": "string"}},
                    "required": ["value"]
                }))
                .build()
                .unwrap(),
            ToolContract::builder("slow").build().unwrap(),
            ToolContract::builder("flaky").build().unwrap(),
        ]
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match tool_name {
            "lookup" => {
                let key = arguments["key"].as_str().unwrap_or_default();
                Ok(json!({ "value": format!("value-of-{key}") }))
            }
            "slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!({}))
            }
            "flaky" => Err(ProviderError::new("Unavailable", "backend is down")),
            other => Err(ProviderError::new("UnknownTool", other)),
        }
    }
}

pub struct Harness {
    pub engine: RunEngine,
    pub events: Arc<InMemoryExporter>,
    pub tools: Arc<FixtureTools>,
}

pub fn harness(models: ModelRegistry, policy: ToolPolicy, config: EngineConfig) -> Harness {
    let tools = Arc::new(FixtureTools::default());
    let registry = ToolRegistry::new()
        .with_provider(Arc::new(EchoProvider))
        .unwrap()
        .with_provider(tools.clone())
        .unwrap();
    let events = Arc::new(InMemoryExporter::new());
    // 工具日志断言需要明文载荷
    let emitter =
        Arc::new(ObservabilityEmitter::new(Redactor::disabled()).with_exporter(events.clone()));
    let executor = Arc::new(ToolExecutor::new(Arc::new(registry), policy, emitter.clone()));
    let engine = RunEngine::new(models, executor, emitter, config).unwrap();
    Harness {
        engine,
        events,
        tools,
    }
}

pub fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e["event_type"].as_str().map(str::to_string))
        .collect()
}
