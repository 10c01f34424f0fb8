//! 沙箱文件系统工具
//!
//! FileSystemProvider 绑定 root_dir，提供 read_file（READ）与 write_file（WRITE）；
//! 两个契约的路径前缀都只声明 root_dir，越界路径在执行器的沙箱检查阶段即被拒绝。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::schema::schema_of;
use crate::tools::{
    ContractError, Idempotency, PathSandbox, ProviderError, RiskLevel, ToolContract, ToolProvider,
};

pub const READ_SCOPE: &str = "fs:read";
pub const WRITE_SCOPE: &str = "fs:write";

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// 相对 workspace 的文件路径
    path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WriteFileArgs {
    /// 相对 workspace 的文件路径
    path: String,
    /// 写入的完整内容（覆盖）
    content: String,
}

pub struct FileSystemProvider {
    sandbox: PathSandbox,
}

impl FileSystemProvider {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            sandbox: PathSandbox::new(root_dir),
        }
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    fn contracts(&self) -> Result<Vec<ToolContract>, ContractError> {
        let root: PathBuf = self.sandbox.root().to_path_buf();
        let read = ToolContract::builder("read_file")
            .description("Read file contents. Args: {\"path\": \"file path relative to workspace\"}")
            .required_scopes([READ_SCOPE])
            .input_schema(schema_of::<ReadFileArgs>())
            .output_schema(json!({
                "type": "object",
                "properties": {"content": {"type": "string"}},
                "required": ["content"]
            }))
            .read_paths([root.clone()])
            .build()?;
        let write = ToolContract::builder("write_file")
            .description("Write (overwrite) a file. Args: {\"path\": \"...\", \"content\": \"...\"}")
            .risk(RiskLevel::Write)
            .required_scopes([WRITE_SCOPE])
            .input_schema(schema_of::<WriteFileArgs>())
            .output_schema(json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "bytes": {"type": "integer"}},
                "required": ["path", "bytes"]
            }))
            .write_paths([root])
            .idempotency(Idempotency::Arguments(vec!["path".into(), "content".into()]))
            .build()?;
        Ok(vec![read, write])
    }

    async fn read_file(&self, arguments: &Value) -> Result<Value, ProviderError> {
        let args: ReadFileArgs = parse_args(arguments)?;
        let resolved = self.sandbox.resolve(&args.path);
        tracing::info!(path = %resolved.display(), "read_file tool execute");
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| io_error(&args.path, e))?;
        Ok(json!({ "content": content }))
    }

    async fn write_file(&self, arguments: &Value) -> Result<Value, ProviderError> {
        let args: WriteFileArgs = parse_args(arguments)?;
        let resolved = self.sandbox.resolve(&args.path);
        tracing::info!(path = %resolved.display(), "write_file tool execute");
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&args.path, e))?;
        }
        tokio::fs::write(&resolved, args.content.as_bytes())
            .await
            .map_err(|e| io_error(&args.path, e))?;
        Ok(json!({ "path": args.path, "bytes": args.content.len() }))
    }
}

fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T, ProviderError> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| ProviderError::new("BadArguments", e.to_string()))
}

fn io_error(path: &str, e: std::io::Error) -> ProviderError {
    let kind = if e.kind() == std::io::ErrorKind::NotFound {
        "NotFound"
    } else {
        "IoError"
    };
    ProviderError::new(kind, format!("{path}: {e}"))
}

#[async_trait]
impl ToolProvider for FileSystemProvider {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn list_tools(&self) -> Vec<ToolContract> {
        match self.contracts() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "filesystem contracts rejected");
                Vec::new()
            }
        }
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, ProviderError> {
        match tool_name {
            "read_file" => self.read_file(arguments).await,
            "write_file" => self.write_file(arguments).await,
            other => Err(ProviderError::new("UnknownTool", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystemProvider::new(dir.path());
        let out = fs
            .execute("write_file", &json!({"path": "notes/a.txt", "content": "hello"}))
            .await
            .unwrap();
        assert_eq!(out["bytes"], 5);
        let read = fs
            .execute("read_file", &json!({"path": "notes/a.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "hello");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystemProvider::new(dir.path());
        let err = fs
            .execute("read_file", &json!({"path": "nope.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "NotFound");
    }

    #[test]
    fn test_contracts_declare_root_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystemProvider::new(dir.path());
        let contracts = fs.list_tools();
        assert_eq!(contracts.len(), 2);
        let write = contracts.iter().find(|c| c.name() == "write_file").unwrap();
        assert_eq!(write.risk(), RiskLevel::Write);
        assert_eq!(write.permitted_paths(), [fs.root().to_path_buf()]);
        assert!(write.idempotency().is_some());
    }
}
