//! 路径沙箱
//!
//! PathSandbox 绑定 workspace 根：相对路径相对根解析，先做词法规范化（消去 `.` 与 `..`），
//! 再把已存在的最长祖先 canonicalize（展开符号链接），不存在的尾部原样接回，
//! 写入目标尚不存在时同样可以校验。解析结果必须落在契约声明的某个路径前缀之下。

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// 悬空符号链接的最大跟随层数
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self {
            root: resolve_links(&normalize(&absolute)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析为展开符号链接后的绝对路径
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        let lexical = if p.is_absolute() {
            normalize(p)
        } else {
            normalize(&self.root.join(p))
        };
        resolve_links(&lexical)
    }

    /// 解析后的路径是否落在任一前缀之下（前缀同样相对根解析）
    pub fn is_permitted(&self, path: &str, prefixes: &[PathBuf]) -> bool {
        let resolved = self.resolve(path);
        prefixes.iter().any(|prefix| {
            let prefix = match prefix.to_str() {
                Some(s) => self.resolve(s),
                None => resolve_links(&normalize(prefix)),
            };
            resolved.starts_with(prefix)
        })
    }

    /// 检查参数中所有路径类字段；返回第一个越界的路径
    pub fn check_arguments(&self, arguments: &Value, prefixes: &[PathBuf]) -> Result<(), String> {
        for (key, path) in path_arguments(arguments) {
            if !self.is_permitted(path, prefixes) {
                return Err(format!(
                    "argument '{key}' path '{path}' is outside permitted paths"
                ));
            }
        }
        Ok(())
    }

    /// 参数中所有路径字段的解析结果
    pub fn resolved_paths(&self, arguments: &Value) -> Vec<PathBuf> {
        path_arguments(arguments)
            .into_iter()
            .map(|(_, path)| self.resolve(path))
            .collect()
    }
}

/// 词法规范化：去掉 `.`，`..` 回退一级（不会越过根）
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// canonicalize 已存在的最长祖先并接回其余组件；悬空链接按其目标继续解析
fn resolve_links(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_LINK_HOPS {
        let mut existing = current.clone();
        let mut rest: Vec<OsString> = Vec::new();
        loop {
            if let Ok(real) = existing.canonicalize() {
                return rest.iter().rev().fold(real, |acc, name| acc.join(name));
            }
            // 存在但无法 canonicalize：悬空符号链接，改为解析其目标
            if let Ok(target) = fs::read_link(&existing) {
                let base = existing.parent().map(Path::to_path_buf).unwrap_or_default();
                let followed = rest
                    .iter()
                    .rev()
                    .fold(normalize(&base.join(target)), |acc, name| acc.join(name));
                current = normalize(&followed);
                break;
            }
            match existing.file_name() {
                Some(name) => {
                    rest.push(name.to_os_string());
                    existing.pop();
                }
                None => return current,
            }
        }
    }
    current
}

/// 判断参数键是否表示文件系统路径
fn is_path_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    matches!(key.as_str(), "path" | "file" | "dir" | "directory" | "filename")
        || key.ends_with("_path")
        || key.ends_with("_dir")
        || key.ends_with("_file")
}

/// 顶层参数中的路径字段（键名, 路径）
pub fn path_arguments(arguments: &Value) -> Vec<(&str, &str)> {
    let Some(obj) = arguments.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .filter(|(k, _)| is_path_key(k))
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
        .collect()
}
