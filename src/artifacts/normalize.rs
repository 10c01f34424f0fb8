//! 确定性归一化：用于 golden 比对
//!
//! - timestamp / started_at / finished_at → 固定纪元
//! - trace_id → "trace-N"，span_id / parent_span_id → "span-N"（按首次出现顺序编号）
//! - duration_ms → 0
//! - 字符串中作为完整标识符出现的 run id → 固定哨兵（"run.started" 里的 "r" 不算）
//!
//! 归一化后逐行输出规范化 JSON，同一确定性配置的两次运行得到逐字节相同的日志。

use std::collections::HashMap;

use serde_json::Value;

use crate::artifacts::canonical::canonical_string;

pub const EPOCH: &str = "1970-01-01T00:00:00Z";
pub const RUN_ID_SENTINEL: &str = "<run-id>";

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "started_at", "finished_at"];
const SPAN_KEYS: &[&str] = &["span_id", "parent_span_id"];

struct Normalizer<'a> {
    run_id: &'a str,
    traces: HashMap<String, String>,
    spans: HashMap<String, String>,
}

impl<'a> Normalizer<'a> {
    fn new(run_id: &'a str) -> Self {
        Self {
            run_id,
            traces: HashMap::new(),
            spans: HashMap::new(),
        }
    }

    fn placeholder(map: &mut HashMap<String, String>, prefix: &str, id: &str) -> String {
        let next = map.len() + 1;
        map.entry(id.to_string())
            .or_insert_with(|| format!("{prefix}-{next}"))
            .clone()
    }

    fn value(&mut self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                // 按键序遍历，编号顺序与序列化顺序一致
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                for key in keys {
                    if let Some(v) = map.get_mut(&key) {
                        self.field(&key, v);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.value(v)),
            Value::String(s) => {
                if let Some(replaced) = replace_run_id(s, self.run_id) {
                    *s = replaced;
                }
            }
            _ => {}
        }
    }

    fn field(&mut self, key: &str, v: &mut Value) {
        match (key, &*v) {
            (k, Value::String(_)) if TIMESTAMP_KEYS.contains(&k) => {
                *v = Value::String(EPOCH.to_string());
            }
            ("trace_id", Value::String(id)) => {
                *v = Value::String(Self::placeholder(&mut self.traces, "trace", id));
            }
            (k, Value::String(id)) if SPAN_KEYS.contains(&k) => {
                *v = Value::String(Self::placeholder(&mut self.spans, "span", id));
            }
            ("duration_ms", Value::Number(_)) => *v = Value::from(0),
            _ => self.value(v),
        }
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// 替换作为完整标识符出现的 run id（两侧不是字母、数字、`-`、`_`）；无替换时返回 None
fn replace_run_id(s: &str, run_id: &str) -> Option<String> {
    if run_id.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (start, _) in s.match_indices(run_id) {
        let end = start + run_id.len();
        let bounded_before = !s[..start].chars().next_back().is_some_and(is_id_char);
        let bounded_after = !s[end..].chars().next().is_some_and(is_id_char);
        if bounded_before && bounded_after {
            out.push_str(&s[last..start]);
            out.push_str(RUN_ID_SENTINEL);
            last = end;
        }
    }
    if last == 0 {
        return None;
    }
    out.push_str(&s[last..]);
    Some(out)
}

/// 归一化一组事件（或工具调用记录）；同一调用内编号共享
pub fn normalize_events(events: &[Value], run_id: &str) -> Vec<Value> {
    let mut normalizer = Normalizer::new(run_id);
    events
        .iter()
        .map(|event| {
            let mut event = event.clone();
            normalizer.value(&mut event);
            event
        })
        .collect()
}

/// 归一化后的 JSONL（每行一个规范化 JSON，末尾换行）
pub fn normalize_jsonl(events: &[Value], run_id: &str) -> String {
    to_jsonl(&normalize_events(events, run_id))
}

pub fn to_jsonl(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| canonical_string(v) + "\n")
        .collect()
}
