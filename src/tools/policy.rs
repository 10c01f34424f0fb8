//! 工具策略：白名单 / 黑名单、只读模式、每次运行的工具调用上限、默认超时、载荷脱敏
//!
//! ToolPolicy 是执行器的全局策略；PolicyOverrides 由 RunRequest 携带，仅对该运行生效。

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ToolsSection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    pub allowlist: Option<BTreeSet<String>>,
    pub blocklist: Option<BTreeSet<String>>,
    pub read_only: bool,
    pub max_tool_calls: Option<usize>,
    pub default_timeout: Duration,
    /// 相对路径参数的解析根
    pub workspace_root: PathBuf,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            allowlist: None,
            blocklist: None,
            read_only: false,
            max_tool_calls: None,
            default_timeout: Duration::from_secs(30),
            workspace_root: PathBuf::from("."),
        }
    }
}

impl ToolPolicy {
    pub fn from_config(section: &ToolsSection) -> Self {
        Self {
            allowlist: section.allowlist.as_ref().map(|l| l.iter().cloned().collect()),
            blocklist: section.blocklist.as_ref().map(|l| l.iter().cloned().collect()),
            read_only: section.read_only,
            max_tool_calls: section.max_tool_calls,
            default_timeout: Duration::from_millis(section.default_timeout_ms),
            workspace_root: section
                .workspace_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// 叠加单次运行的覆盖项，得到该运行的有效策略
    pub fn with_overrides(&self, overrides: Option<&PolicyOverrides>) -> ToolPolicy {
        let mut effective = self.clone();
        let Some(o) = overrides else {
            return effective;
        };
        if let Some(ref allow) = o.allowlist {
            effective.allowlist = Some(allow.iter().cloned().collect());
        }
        if let Some(ref block) = o.blocklist {
            effective.blocklist = Some(block.iter().cloned().collect());
        }
        if let Some(read_only) = o.read_only {
            effective.read_only = read_only;
        }
        if let Some(max) = o.max_tool_calls {
            effective.max_tool_calls = Some(max);
        }
        effective
    }

    /// 白名单 / 黑名单检查；违规时返回原因
    pub fn check_allowed(&self, tool: &str) -> Result<(), String> {
        if let Some(ref allow) = self.allowlist {
            if !allow.contains(tool) {
                return Err(format!("tool '{tool}' is not in the allowlist"));
            }
        }
        if let Some(ref block) = self.blocklist {
            if block.contains(tool) {
                return Err(format!("tool '{tool}' is blocklisted"));
            }
        }
        Ok(())
    }
}

/// 单次运行的策略覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub allowlist: Option<Vec<String>>,
    pub blocklist: Option<Vec<String>>,
    pub read_only: Option<bool>,
    pub max_tool_calls: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_and_block() {
        let policy = ToolPolicy {
            allowlist: Some(["echo".to_string(), "read_file".to_string()].into()),
            blocklist: Some(["read_file".to_string()].into()),
            ..ToolPolicy::default()
        };
        assert!(policy.check_allowed("echo").is_ok());
        assert!(policy.check_allowed("write_file").unwrap_err().contains("allowlist"));
        assert!(policy.check_allowed("read_file").unwrap_err().contains("blocklisted"));
    }

    #[test]
    fn test_no_lists_allows_everything() {
        assert!(ToolPolicy::default().check_allowed("anything").is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let base = ToolPolicy {
            max_tool_calls: Some(10),
            ..ToolPolicy::default()
        };
        let overrides = PolicyOverrides {
            read_only: Some(true),
            max_tool_calls: Some(1),
            allowlist: Some(vec!["echo".into()]),
            ..PolicyOverrides::default()
        };
        let eff = base.with_overrides(Some(&overrides));
        assert!(eff.read_only);
        assert_eq!(eff.max_tool_calls, Some(1));
        assert!(eff.check_allowed("write_file").is_err());
        assert_eq!(base.with_overrides(None), base);
    }
}
