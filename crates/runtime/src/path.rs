//! C1 — Path configuration: resolve WORKSPACE_ROOT / PROJECT_ROOT / SITE_ROOT
//! and enforce the write boundary.
//!
//! Modeled as an explicit, test-constructible context object rather than a
//! process-wide singleton (spec §9): callers receive a `PathConfig` and pass
//! it around instead of reaching for module globals.

use std::path::{Component, Path, PathBuf};

use crate::error::{RuntimeError, RuntimeResult};

const DEFAULT_PROJECT_DIR_NAME: &str = "project";

#[derive(Debug, Clone)]
pub struct PathConfig {
    pub workspace_root: PathBuf,
    pub project_root: PathBuf,
    pub site_root: PathBuf,
    pub preview_host: String,
    pub preview_port: u16,
}

impl PathConfig {
    /// Resolve roots from the environment, falling back through
    /// `{override, /workspace, /root/workspace, CWD}` for `WORKSPACE_ROOT`.
    pub fn from_env() -> RuntimeResult<Self> {
        let project_dir_name =
            std::env::var("PROJECT_DIR_NAME").unwrap_or_else(|_| DEFAULT_PROJECT_DIR_NAME.into());
        let workspace_root = resolve_workspace_root()?;
        Self::new(workspace_root, project_dir_name)
    }

    pub fn new(workspace_root: PathBuf, project_dir_name: impl Into<String>) -> RuntimeResult<Self> {
        let project_dir_name = project_dir_name.into();
        let project_root = workspace_root.join(&project_dir_name);
        let site_root = workspace_root.join("site");

        let preview_host =
            std::env::var("PREVIEW_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let preview_port = std::env::var("PREVIEW_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        Ok(Self {
            workspace_root,
            project_root,
            site_root,
            preview_host,
            preview_port,
        })
    }

    /// Join `parts` onto `PROJECT_ROOT`, failing with `PathEscape` if the
    /// resolved path is not a prefix-relative descendant of it.
    pub fn safe_path_join(&self, parts: &[&str]) -> RuntimeResult<PathBuf> {
        safe_join(&self.project_root, parts)
    }

    /// Same predicate as `safe_path_join` without raising.
    pub fn validate_path_in_project(&self, path: &Path) -> bool {
        is_descendant(&self.project_root, path)
    }

    /// One human-readable block listing roots, preview binding, CWD, and
    /// top-level contents — logged via `tracing::info!` by the caller.
    pub fn log_startup_info(&self) -> String {
        let cwd = std::env::current_dir().unwrap_or_default();
        let top_level: Vec<String> = std::fs::read_dir(&self.project_root)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        format!(
            "workspace_root={}\nproject_root={}\nsite_root={}\npreview={}:{}\ncwd={}\nproject_root_contents={:?}",
            self.workspace_root.display(),
            self.project_root.display(),
            self.site_root.display(),
            self.preview_host,
            self.preview_port,
            cwd.display(),
            top_level,
        )
    }
}

/// Resolve a path against `root`, normalizing `.`/`..` components lexically
/// (the target may not exist yet, so we cannot rely on `canonicalize`), and
/// reject any result that isn't a descendant of `root`.
fn safe_join(root: &Path, parts: &[&str]) -> RuntimeResult<PathBuf> {
    let mut joined = root.to_path_buf();
    for part in parts {
        joined.push(part);
    }
    let normalized = normalize_lexically(&joined);
    let normalized_root = normalize_lexically(root);

    if !normalized.starts_with(&normalized_root) {
        return Err(RuntimeError::PathEscape {
            attempted: normalized,
            root: normalized_root,
        });
    }
    Ok(normalized)
}

fn is_descendant(root: &Path, path: &Path) -> bool {
    let normalized_path = normalize_lexically(path);
    let normalized_root = normalize_lexically(root);
    normalized_path.starts_with(&normalized_root)
}

/// Lexical `.`/`..` resolution without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_workspace_root() -> RuntimeResult<PathBuf> {
    if let Ok(over) = std::env::var("WORKSPACE_ROOT") {
        let p = PathBuf::from(over);
        return ensure_dir(p);
    }
    for candidate in ["/workspace", "/root/workspace"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Ok(p);
        }
    }
    for candidate in ["/workspace", "/root/workspace"] {
        let p = PathBuf::from(candidate);
        if std::fs::create_dir_all(&p).is_ok() {
            return Ok(p);
        }
    }
    ensure_dir(std::env::current_dir()?)
}

fn ensure_dir(p: PathBuf) -> RuntimeResult<PathBuf> {
    std::fs::create_dir_all(&p)?;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PathConfig {
        let dir = tempfile::tempdir().unwrap();
        PathConfig::new(dir.keep(), "project").unwrap()
    }

    #[test]
    fn safe_path_join_rejects_escape() {
        let cfg = config();
        let result = cfg.safe_path_join(&["..", "..", "etc", "passwd"]);
        assert!(matches!(result, Err(RuntimeError::PathEscape { .. })));
    }

    #[test]
    fn safe_path_join_accepts_descendant() {
        let cfg = config();
        let result = cfg.safe_path_join(&["src", "index.html"]).unwrap();
        assert!(result.starts_with(&cfg.project_root));
    }

    #[test]
    fn validate_path_in_project_rejects_sibling() {
        let cfg = config();
        let sibling = cfg.workspace_root.join("other");
        assert!(!cfg.validate_path_in_project(&sibling));
    }

    #[test]
    fn dotdot_inside_parts_is_caught() {
        let cfg = config();
        let result = cfg.safe_path_join(&["assets/../../escape.txt"]);
        assert!(result.is_err());
    }
}
