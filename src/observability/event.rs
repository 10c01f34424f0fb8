//! 运行事件：点分类型（run.started / tool.call.finished 等）、追踪上下文、级别、时间戳、属性
//!
//! EventDraft 是调用方填写的原始事件；ObservabilityEmitter 补全默认值并脱敏后得到 RunEvent。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::observability::TraceContext;

/// 事件类型（点分分类）
pub mod event_types {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_STATE_CHANGED: &str = "run.state.changed";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const TURN_STARTED: &str = "turn.started";
    pub const TURN_FINISHED: &str = "turn.finished";
    pub const MODEL_CALL_STARTED: &str = "model.call.started";
    pub const MODEL_CALL_FINISHED: &str = "model.call.finished";
    pub const TOOL_CALL_STARTED: &str = "tool.call.started";
    pub const TOOL_CALL_FINISHED: &str = "tool.call.finished";
    pub const CRITIC_VERDICT: &str = "critic.verdict";
}

/// 事件级别，默认 info
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// 已发出的事件（只追加，发出后交给每个 exporter）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RunEvent {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// 原始事件：severity / timestamp 可留空，由 emitter 补默认值
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub run_id: String,
    pub event_type: String,
    pub trace: Option<TraceContext>,
    pub severity: Option<Severity>,
    pub timestamp: Option<DateTime<Utc>>,
    pub attributes: Map<String, Value>,
}

impl EventDraft {
    pub fn new(run_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            event_type: event_type.into(),
            trace: None,
            severity: None,
            timestamp: None,
            attributes: Map::new(),
        }
    }

    pub fn trace(mut self, trace: &TraceContext) -> Self {
        self.trace = Some(trace.clone());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 补全默认值（级别 info、当前 UTC 时间）
    pub fn finish(self) -> RunEvent {
        RunEvent {
            run_id: self.run_id,
            event_type: self.event_type,
            trace: self.trace,
            severity: self.severity.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            attributes: self.attributes,
        }
    }
}
