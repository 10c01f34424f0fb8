//! Golden 比对：逐行比较归一化后的 JSONL

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::artifacts::normalize::normalize_jsonl;
use crate::artifacts::ArtifactError;

/// 第一处不同（行号从 1 开始；缺失的一侧为 None）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMismatch {
    pub line: usize,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

pub fn compare_lines(expected: &str, actual: &str) -> Result<(), LineMismatch> {
    let mut exp = expected.lines();
    let mut act = actual.lines();
    let mut line = 0;
    loop {
        line += 1;
        match (exp.next(), act.next()) {
            (None, None) => return Ok(()),
            (e, a) if e == a => continue,
            (e, a) => {
                return Err(LineMismatch {
                    line,
                    expected: e.map(str::to_string),
                    actual: a.map(str::to_string),
                })
            }
        }
    }
}

/// 读取 JSONL 事件日志（跳过空行）
pub fn load_events(path: impl AsRef<Path>) -> Result<Vec<Value>, ArtifactError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(ArtifactError::Serialize))
        .collect()
}

/// 归一化 actual 后与 golden 文件比对
pub fn assert_matches_golden(
    golden: impl AsRef<Path>,
    actual: &[Value],
    run_id: &str,
) -> Result<(), ArtifactError> {
    let path = golden.as_ref();
    let expected = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    compare_lines(&expected, &normalize_jsonl(actual, run_id)).map_err(|m| {
        ArtifactError::GoldenMismatch {
            line: m.line,
            expected: m.expected.unwrap_or_default(),
            actual: m.actual.unwrap_or_default(),
        }
    })
}
