//! 可观测性：进程日志初始化 + 运行事件总线（追踪上下文、脱敏、多路导出）

pub mod emitter;
pub mod event;
pub mod exporter;
pub mod redact;
pub mod trace;

pub use emitter::ObservabilityEmitter;
pub use event::{event_types, EventDraft, RunEvent, Severity};
pub use exporter::{ExportError, Exporter, FileExporter, InMemoryExporter, StdoutExporter};
pub use redact::{Redactor, REDACTED};
pub use trace::TraceContext;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化进程日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// JSON 格式的进程日志（每行一个对象）
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .try_init();
}
