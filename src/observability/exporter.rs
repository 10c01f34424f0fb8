//! 事件导出器：内存列表、标准输出逐行 JSON、只追加文件
//!
//! 每个 exporter 相互独立；export 返回错误时由 emitter 记录日志并继续投递给其余 exporter。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 导出器 trait：接收已补全并脱敏的事件（JSON 对象）
pub trait Exporter: Send + Sync {
    /// 导出器名称（用于日志）
    fn name(&self) -> &str;

    fn export(&self, event: &Value) -> Result<(), ExportError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 内存导出器：按发出顺序保存全部事件，供测试与落盘包装器读取
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    events: Mutex<Vec<Value>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Value> {
        lock(&self.events).clone()
    }

    /// 某次运行的事件（保持顺序）
    pub fn events_for(&self, run_id: &str) -> Vec<Value> {
        lock(&self.events)
            .iter()
            .filter(|e| e.get("run_id").and_then(Value::as_str) == Some(run_id))
            .cloned()
            .collect()
    }

    /// 取出并移除某次运行的事件
    pub fn drain_run(&self, run_id: &str) -> Vec<Value> {
        let mut events = lock(&self.events);
        let (taken, kept): (Vec<Value>, Vec<Value>) = events
            .drain(..)
            .partition(|e| e.get("run_id").and_then(Value::as_str) == Some(run_id));
        *events = kept;
        taken
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl Exporter for InMemoryExporter {
    fn name(&self) -> &str {
        "memory"
    }

    fn export(&self, event: &Value) -> Result<(), ExportError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

/// 标准输出导出器：每个事件一行 JSON
#[derive(Debug, Default)]
pub struct StdoutExporter;

impl Exporter for StdoutExporter {
    fn name(&self) -> &str {
        "stdout"
    }

    fn export(&self, event: &Value) -> Result<(), ExportError> {
        let line = serde_json::to_string(event)?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{line}")?;
        Ok(())
    }
}

/// 文件导出器：只追加写入 JSONL，父目录不存在时自动创建
#[derive(Debug)]
pub struct FileExporter {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileExporter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Exporter for FileExporter {
    fn name(&self) -> &str {
        "file"
    }

    fn export(&self, event: &Value) -> Result<(), ExportError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = lock(&self.file);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
