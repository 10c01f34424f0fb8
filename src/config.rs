//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ENGINE__MAX_TURNS=4`）。
//! AppConfig 同时可序列化：运行记录中保存的配置快照就是生效的配置（脱敏后）。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub tools: ToolsSection,
    pub observability: ObservabilitySection,
    pub artifacts: ArtifactsSection,
}

/// [engine] 段：轮数、超时、token 预算、短期记忆容量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_turns: u32,
    pub timeout_ms: u64,
    pub token_budget: Option<u64>,
    pub memory_max_tokens: usize,
    pub max_tool_rounds_per_turn: u32,
    pub final_answer_call: bool,
    /// 为空时使用内置提示词
    pub system_prompt: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_turns: 8,
            timeout_ms: 120_000,
            token_budget: None,
            memory_max_tokens: 4000,
            max_tool_rounds_per_turn: 16,
            final_answer_call: false,
            system_prompt: String::new(),
        }
    }
}

/// [tools] 段：工作目录、默认超时、白名单 / 黑名单、只读、调用上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 沙箱根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    pub default_timeout_ms: u64,
    pub allowlist: Option<Vec<String>>,
    pub blocklist: Option<Vec<String>>,
    pub read_only: bool,
    /// 每次运行的工具调用上限
    pub max_tool_calls: Option<usize>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            default_timeout_ms: 30_000,
            allowlist: None,
            blocklist: None,
            read_only: false,
            max_tool_calls: None,
        }
    }
}

/// [observability] 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySection {
    /// 事件属性脱敏（键名 + 值模式）
    pub redaction: bool,
    /// 每个事件以一行 JSON 写到标准输出
    pub stdout: bool,
    /// 追加写入的事件日志文件
    pub event_log: Option<PathBuf>,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            redaction: true,
            stdout: false,
            event_log: None,
        }
    }
}

/// [artifacts] 段：运行记录根目录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsSection {
    pub root: PathBuf,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("runs"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
