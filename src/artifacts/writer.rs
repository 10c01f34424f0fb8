//! 运行记录落盘
//!
//! 每个 run id 一个目录，内含四个文件：
//! - index.json：状态、起止时间、配置哈希、结果摘要
//! - config.json：脱敏后的配置快照
//! - events.jsonl：完整有序事件日志（每行一个事件）
//! - tool_calls.jsonl：有序工具调用日志
//!
//! ArtifactWriter 只读取引擎产出，从不修改引擎状态。

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifacts::canonical::{config_hash, to_value};
use crate::artifacts::ArtifactError;
use crate::core::{RunResult, RunStatus};
use crate::engine::RunReport;
use crate::observability::Redactor;
use crate::tools::ToolCallRecord;

pub const INDEX_FILE: &str = "index.json";
pub const CONFIG_FILE: &str = "config.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const TOOL_CALLS_FILE: &str = "tool_calls.jsonl";

/// 同目录下其余三个文件的相对路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub config: String,
    pub events: String,
    pub tool_calls: String,
}

impl Default for ArtifactFiles {
    fn default() -> Self {
        Self {
            config: CONFIG_FILE.to_string(),
            events: EVENTS_FILE.to_string(),
            tool_calls: TOOL_CALLS_FILE.to_string(),
        }
    }
}

/// 运行索引（index.json 的内容）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: String,
    pub result: RunResult,
    pub files: ArtifactFiles,
}

/// 与 bundle 一起落盘的内容
#[derive(Debug, Clone, Default)]
pub struct ArtifactPayloads {
    /// 已脱敏的配置快照
    pub config: Value,
    pub events: Vec<Value>,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// 存储后端
pub trait ArtifactStore: Send + Sync {
    fn save_artifact(
        &self,
        bundle: &ArtifactBundle,
        payloads: &ArtifactPayloads,
    ) -> Result<(), ArtifactError>;
}

/// 文件系统存储：root/<run_id>/{index.json, config.json, events.jsonl, tool_calls.jsonl}
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// run id 只允许作为单个路径组件
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, ArtifactError> {
        let valid = !run_id.is_empty()
            && run_id != "."
            && run_id != ".."
            && !run_id.contains(['/', '\\']);
        if !valid {
            return Err(ArtifactError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.root.join(run_id))
    }

    /// 读取已保存的 index.json
    pub fn load_bundle(&self, run_id: &str) -> Result<ArtifactBundle, ArtifactError> {
        let path = self.run_dir(run_id)?.join(INDEX_FILE);
        let text = fs::read_to_string(&path).map_err(|e| ArtifactError::io(&path, e))?;
        serde_json::from_str(&text).map_err(ArtifactError::Serialize)
    }
}

fn write_json(path: &Path, value: &Value) -> Result<(), ArtifactError> {
    let text = serde_json::to_string_pretty(value).map_err(ArtifactError::Serialize)?;
    fs::write(path, text + "\n").map_err(|e| ArtifactError::io(path, e))
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), ArtifactError> {
    let file = fs::File::create(path).map_err(|e| ArtifactError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for item in items {
        let line = serde_json::to_string(item).map_err(ArtifactError::Serialize)?;
        writeln!(out, "{line}").map_err(|e| ArtifactError::io(path, e))?;
    }
    out.flush().map_err(|e| ArtifactError::io(path, e))
}

impl ArtifactStore for FsArtifactStore {
    fn save_artifact(
        &self,
        bundle: &ArtifactBundle,
        payloads: &ArtifactPayloads,
    ) -> Result<(), ArtifactError> {
        let dir = self.run_dir(&bundle.run_id)?;
        fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;

        write_json(&dir.join(&bundle.files.config), &payloads.config)?;
        write_jsonl(&dir.join(&bundle.files.events), &payloads.events)?;
        write_jsonl(&dir.join(&bundle.files.tool_calls), &payloads.tool_calls)?;
        // index 最后写：存在即表示其余文件已完整
        write_json(&dir.join(INDEX_FILE), &to_value(bundle)?)?;

        tracing::info!(run_id = %bundle.run_id, dir = %dir.display(), "run artifacts saved");
        Ok(())
    }
}

pub struct ArtifactWriter {
    store: Arc<dyn ArtifactStore>,
    redactor: Redactor,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            redactor: Redactor::new(),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// 脱敏配置快照并计算哈希
    pub fn snapshot<C: Serialize>(&self, config: &C) -> Result<(Value, String), ArtifactError> {
        let mut snapshot = to_value(config)?;
        self.redactor.redact_value(&mut snapshot);
        let hash = config_hash(&snapshot);
        Ok((snapshot, hash))
    }

    /// 组装 bundle 并交给存储后端；events 为该运行的完整有序事件
    pub fn write<C: Serialize>(
        &self,
        report: &RunReport,
        config: &C,
        events: Vec<Value>,
    ) -> Result<ArtifactBundle, ArtifactError> {
        let (snapshot, hash) = self.snapshot(config)?;
        let bundle = ArtifactBundle {
            run_id: report.result.run_id.clone(),
            status: report.result.status,
            started_at: report.started_at,
            finished_at: report.finished_at,
            config_hash: hash,
            result: report.result.clone(),
            files: ArtifactFiles::default(),
        };
        let payloads = ArtifactPayloads {
            config: snapshot,
            events,
            tool_calls: report.tool_calls.clone(),
        };
        self.store.save_artifact(&bundle, &payloads)?;
        Ok(bundle)
    }
}
