//! 脱敏：按键名与值模式把敏感字段替换为 `<redacted>`
//!
//! - 键名命中（api_key、token、password、email 等）时整个值被替换
//! - 字符串值中命中的片段（邮箱、Bearer Token、sk- 风格 API Key）被替换
//!
//! 事件导出与配置快照落盘前都会经过同一个 Redactor。

use regex::Regex;
use serde_json::{Map, Value};

/// 脱敏占位符
pub const REDACTED: &str = "<redacted>";

const SENSITIVE_KEY_PATTERN: &str = r"(?i)^(.*[_\-.])?(api[_\-]?key|apikey|token|access[_\-]?token|refresh[_\-]?token|secret|client[_\-]?secret|password|passwd|authorization|credentials?|cookie|email)$";

const SENSITIVE_VALUE_PATTERNS: &[&str] = &[
    r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}",
    r"(?i)bearer\s+[A-Za-z0-9._~+/=\-]+",
    r"\b(?:sk|pk|rk)-[A-Za-z0-9_\-]{16,}",
    r"\bAKIA[0-9A-Z]{16}\b",
];

/// 键名 + 值模式脱敏器
#[derive(Debug, Clone)]
pub struct Redactor {
    enabled: bool,
    key_pattern: Option<Regex>,
    value_patterns: Vec<Regex>,
}

impl Redactor {
    /// 启用默认规则的脱敏器
    pub fn new() -> Self {
        Self {
            enabled: true,
            key_pattern: Regex::new(SENSITIVE_KEY_PATTERN).ok(),
            value_patterns: SENSITIVE_VALUE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    /// 不做任何替换（观测配置关闭脱敏时使用）
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            key_pattern: None,
            value_patterns: Vec::new(),
        }
    }

    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::new()
        } else {
            Self::disabled()
        }
    }

    /// 追加一条值模式（非法正则返回错误）
    pub fn with_value_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.value_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        self.enabled
            && self
                .key_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(key))
    }

    /// 替换字符串中命中值模式的片段
    pub fn redact_str(&self, input: &str) -> String {
        if !self.enabled {
            return input.to_string();
        }
        let mut out = input.to_string();
        for re in &self.value_patterns {
            if re.is_match(&out) {
                out = re.replace_all(&out, REDACTED).into_owned();
            }
        }
        out
    }

    /// 递归脱敏 JSON 值
    pub fn redact_value(&self, value: &mut Value) {
        if !self.enabled {
            return;
        }
        match value {
            Value::Object(map) => self.redact_map(map),
            Value::Array(items) => items.iter_mut().for_each(|v| self.redact_value(v)),
            Value::String(s) => {
                let redacted = self.redact_str(s);
                if redacted != *s {
                    *s = redacted;
                }
            }
            _ => {}
        }
    }

    pub fn redact_map(&self, map: &mut Map<String, Value>) {
        if !self.enabled {
            return;
        }
        for (key, v) in map.iter_mut() {
            if self.is_sensitive_key(key) && !v.is_null() {
                *v = Value::String(REDACTED.to_string());
            } else {
                self.redact_value(v);
            }
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sensitive_keys_replaced() {
        let r = Redactor::new();
        let mut v = json!({
            "api_key": "abc",
            "llm": {"openai_api_key": "sk-xyz", "model": "gpt"},
            "password": "hunter2",
            "total_tokens": 42,
            "token": "t0k"
        });
        r.redact_value(&mut v);
        assert_eq!(v["api_key"], REDACTED);
        assert_eq!(v["llm"]["openai_api_key"], REDACTED);
        assert_eq!(v["llm"]["model"], "gpt");
        assert_eq!(v["password"], REDACTED);
        assert_eq!(v["total_tokens"], 42);
        assert_eq!(v["token"], REDACTED);
    }

    #[test]
    fn test_value_patterns_replaced() {
        let r = Redactor::new();
        let out = r.redact_str("mail alice@example.com with Bearer abc.def-123");
        assert!(!out.contains("alice@example.com"));
        assert!(!out.contains("abc.def-123"));
        assert!(out.contains(REDACTED));

        let key = r.redact_str("key is sk-ABCDEFGHIJKLMNOPQRSTUV");
        assert_eq!(key, format!("key is {REDACTED}"));
    }

    #[test]
    fn test_arrays_and_plain_text_untouched() {
        let r = Redactor::new();
        let mut v = json!(["hello", "bob@corp.io", 3]);
        r.redact_value(&mut v);
        assert_eq!(v, json!(["hello", REDACTED, 3]));
    }

    #[test]
    fn test_disabled_is_noop() {
        let r = Redactor::disabled();
        let mut v = json!({"api_key": "abc", "note": "bob@corp.io"});
        let before = v.clone();
        r.redact_value(&mut v);
        assert_eq!(v, before);
    }

    #[test]
    fn test_custom_value_pattern() {
        let r = Redactor::new().with_value_pattern(r"ssn-\d{4}").unwrap();
        assert_eq!(r.redact_str("id ssn-1234"), format!("id {REDACTED}"));
        assert!(Redactor::new().with_value_pattern("(").is_err());
    }
}
