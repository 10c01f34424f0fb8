//! Headless 运行时
//!
//! 供 CLI / 测试 / 上层服务调用的无界面组装逻辑：
//! create_engine_components 按配置构建工具注册表、执行器、事件总线、引擎与记录写入器；
//! run_and_persist 跑一次运行，收集该运行的事件与工具调用日志并落盘。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::artifacts::{ArtifactBundle, ArtifactWriter, FsArtifactStore};
use crate::config::{AppConfig, ObservabilitySection};
use crate::core::RunRequest;
use crate::engine::{EngineConfig, RunEngine, RunReport};
use crate::llm::ModelRegistry;
use crate::observability::{
    FileExporter, InMemoryExporter, ObservabilityEmitter, Redactor, StdoutExporter,
};
use crate::tools::{
    EchoProvider, FileSystemProvider, RegistryError, ToolExecutor, ToolPolicy, ToolRegistry,
};

/// 预构建的运行组件，可被多次运行共享
pub struct EngineComponents {
    pub config: AppConfig,
    pub engine: RunEngine,
    pub executor: Arc<ToolExecutor>,
    pub emitter: Arc<ObservabilityEmitter>,
    /// 每次运行结束后按 run id 取出事件
    pub events: Arc<InMemoryExporter>,
    pub writer: ArtifactWriter,
}

/// 持久化后的运行
#[derive(Debug, Clone)]
pub struct PersistedRun {
    pub report: RunReport,
    pub bundle: ArtifactBundle,
    pub dir: PathBuf,
}

/// 内置工具：echo + 沙箱文件系统（read_file / write_file）
pub fn create_tool_registry(workspace: &Path) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::new()
        .with_provider(Arc::new(EchoProvider))?
        .with_provider(Arc::new(FileSystemProvider::new(workspace)))
}

/// 事件总线：内存 exporter 总是注册；按配置追加 stdout / 文件 exporter
pub fn create_emitter(
    cfg: &ObservabilitySection,
) -> anyhow::Result<(ObservabilityEmitter, Arc<InMemoryExporter>)> {
    let memory = Arc::new(InMemoryExporter::new());
    let mut emitter =
        ObservabilityEmitter::new(Redactor::from_enabled(cfg.redaction)).with_exporter(memory.clone());
    if cfg.stdout {
        emitter.register(Arc::new(StdoutExporter));
    }
    if let Some(ref path) = cfg.event_log {
        let file = FileExporter::open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        emitter.register(Arc::new(file));
    }
    Ok((emitter, memory))
}

/// 按配置组装全部组件；models 由调用方提供（Mock / 真实后端）
pub fn create_engine_components(
    config: AppConfig,
    models: ModelRegistry,
) -> anyhow::Result<EngineComponents> {
    let policy = ToolPolicy::from_config(&config.tools);
    std::fs::create_dir_all(&policy.workspace_root).with_context(|| {
        format!(
            "Failed to create workspace {}",
            policy.workspace_root.display()
        )
    })?;
    let registry =
        create_tool_registry(&policy.workspace_root).context("Failed to register tools")?;

    let (emitter, events) = create_emitter(&config.observability)?;
    let emitter = Arc::new(emitter);
    let executor = Arc::new(ToolExecutor::new(Arc::new(registry), policy, emitter.clone()));
    let engine = RunEngine::new(
        models,
        executor.clone(),
        emitter.clone(),
        EngineConfig::from_config(&config.engine),
    )
    .context("Failed to build run engine")?;

    let store = Arc::new(FsArtifactStore::new(config.artifacts.root.clone()));
    let writer =
        ArtifactWriter::new(store).with_redactor(Redactor::from_enabled(config.observability.redaction));

    tracing::info!(
        tools = ?executor.registry().tool_names(),
        exporters = ?emitter.exporter_names(),
        "engine components ready"
    );
    Ok(EngineComponents {
        config,
        engine,
        executor,
        emitter,
        events,
        writer,
    })
}

/// 跑一次运行并落盘（index / config / events / tool_calls）
pub async fn run_and_persist(
    components: &EngineComponents,
    request: &RunRequest,
) -> anyhow::Result<PersistedRun> {
    let report = components.engine.run_with_log(request).await;
    let events = components.events.drain_run(request.run_id());
    let bundle = components
        .writer
        .write(&report, &components.config, events)
        .with_context(|| format!("Failed to persist run {}", request.run_id()))?;
    let dir = components.config.artifacts.root.join(&bundle.run_id);
    Ok(PersistedRun {
        report,
        bundle,
        dir,
    })
}
