//! C8 — Code-generation adapter: a uniform interface over the external
//! agentic code-editing backend, selectable between a scripted (structured
//! patch plan, no LLM) and delegated (subprocess agent) implementation.

pub mod delegated;
pub mod scripted;

use std::path::{Path, PathBuf};

use geminiloop_runtime::error::RuntimeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchAction {
    Modify,
    Create,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchFile {
    pub path: String,
    pub action: PatchAction,
    pub description: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPlan {
    pub instructions: String,
    pub files: Vec<PatchFile>,
    pub original_score: i64,
    pub issues_count: usize,
    pub fix_suggestions_from_evaluator: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateCodeResult {
    pub files_generated: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPatchResult {
    pub success: bool,
    pub files_modified: Vec<String>,
    pub error: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("code generation timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Other(String),
}

/// Resolve `rel_path` against `workspace_path`, rejecting anything that
/// would escape it — the same guardrail C1 enforces for PROJECT_ROOT.
pub fn resolve_in_workspace(workspace_path: &Path, rel_path: &str) -> Result<PathBuf, CodegenError> {
    let joined = workspace_path.join(rel_path);
    let normalized = geminiloop_runtime::path::normalize_lexically(&joined);
    let normalized_root = geminiloop_runtime::path::normalize_lexically(workspace_path);
    if !normalized.starts_with(&normalized_root) {
        return Err(CodegenError::Runtime(RuntimeError::PathEscape {
            attempted: normalized,
            root: normalized_root,
        }));
    }
    Ok(normalized)
}

/// List regular files under `workspace_path`, skipping unreadable entries
/// and anything outside the boundary.
pub fn capture_workspace_files(workspace_path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files(workspace_path, workspace_path, &mut files);
    files
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if !path.starts_with(root) {
            continue;
        }
        if file_type.is_dir() {
            collect_files(root, &path, out);
        } else if file_type.is_file() {
            out.push(path);
        }
    }
}
