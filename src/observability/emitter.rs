//! 同步扇出事件总线
//!
//! emit(draft)：补全默认值（时间戳、级别 info）→ 属性脱敏 → 依次投递给每个已注册 exporter。
//! 单个 exporter 失败只记 warn 日志，不影响其余 exporter。

use std::sync::Arc;

use crate::observability::{EventDraft, Exporter, Redactor, RunEvent};

pub struct ObservabilityEmitter {
    exporters: Vec<Arc<dyn Exporter>>,
    redactor: Redactor,
}

impl ObservabilityEmitter {
    pub fn new(redactor: Redactor) -> Self {
        Self {
            exporters: Vec::new(),
            redactor,
        }
    }

    /// 注册 exporter（启动阶段调用，之后 emitter 以 Arc 共享）
    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn register(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters.push(exporter);
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn exporter_names(&self) -> Vec<String> {
        self.exporters.iter().map(|e| e.name().to_string()).collect()
    }

    /// 发出事件，返回补全并脱敏后的 RunEvent
    pub fn emit(&self, draft: EventDraft) -> RunEvent {
        let mut event = draft.finish();
        self.redactor.redact_map(&mut event.attributes);
        let value = event.to_value();
        for exporter in &self.exporters {
            if let Err(e) = exporter.export(&value) {
                tracing::warn!(
                    exporter = exporter.name(),
                    event_type = %event.event_type,
                    error = %e,
                    "event export failed"
                );
            }
        }
        tracing::debug!(run_id = %event.run_id, event_type = %event.event_type, "event emitted");
        event
    }
}

impl Default for ObservabilityEmitter {
    fn default() -> Self {
        Self::new(Redactor::new())
    }
}
