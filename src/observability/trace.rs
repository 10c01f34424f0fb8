//! 追踪上下文：trace_id 在一次运行内稳定，span_id 每个逻辑步骤唯一
//!
//! child() 继承父级 trace_id、生成新的 span_id 并记录父级 span_id，
//! 仅凭事件流即可重建调用树。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// 新的根上下文（新 trace_id，无父 span）
    pub fn root() -> Self {
        Self {
            trace_id: new_id(),
            span_id: new_id(),
            parent_span_id: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_id(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
