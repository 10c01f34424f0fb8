//! 运行记录：规范化哈希、确定性归一化、落盘与 golden 比对

pub mod canonical;
pub mod golden;
pub mod normalize;
pub mod writer;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use canonical::{canonical_string, config_hash};
pub use golden::{assert_matches_golden, compare_lines, load_events, LineMismatch};
pub use normalize::{normalize_events, normalize_jsonl, EPOCH, RUN_ID_SENTINEL};
pub use writer::{
    ArtifactBundle, ArtifactFiles, ArtifactPayloads, ArtifactStore, ArtifactWriter,
    FsArtifactStore,
};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid run id for artifact directory: {0:?}")]
    InvalidRunId(String),

    #[error("Golden mismatch at line {line}:\n  expected: {expected}\n  actual:   {actual}")]
    GoldenMismatch {
        line: usize,
        expected: String,
        actual: String,
    },
}

impl ArtifactError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
