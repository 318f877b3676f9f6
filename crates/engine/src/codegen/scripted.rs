//! Scripted C8 backend: applies a structured `PatchPlan` directly with no
//! LLM call. Each modified file is backed up (`.bak`) before being
//! rewritten so a bad patch plan never destroys the only copy.

use std::path::Path;
use std::time::Instant;

use super::{resolve_in_workspace, ApplyPatchResult, CodegenError, PatchAction, PatchPlan};

/// Apply every file op in `plan` under `workspace_path`. Best-effort: a
/// failure on one file is recorded and applying continues with the rest,
/// matching the "natural-language hints" best-effort posture in the spec.
pub fn apply_patch_plan(workspace_path: &Path, plan: &PatchPlan) -> ApplyPatchResult {
    let started = Instant::now();
    let mut files_modified = Vec::new();
    let mut errors = Vec::new();

    for file in &plan.files {
        match apply_one(workspace_path, file) {
            Ok(()) => files_modified.push(file.path.clone()),
            Err(e) => errors.push(format!("{}: {e}", file.path)),
        }
    }

    ApplyPatchResult {
        success: errors.is_empty(),
        files_modified,
        error: if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        },
        duration_seconds: started.elapsed().as_secs_f64(),
    }
}

fn apply_one(workspace_path: &Path, file: &super::PatchFile) -> Result<(), CodegenError> {
    let target = resolve_in_workspace(workspace_path, &file.path)?;

    match file.action {
        PatchAction::Delete => {
            if target.exists() {
                backup(&target)?;
                std::fs::remove_file(&target).map_err(|e| CodegenError::Other(e.to_string()))?;
            }
            Ok(())
        }
        PatchAction::Create => {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CodegenError::Other(e.to_string()))?;
            }
            std::fs::write(&target, render_changes(file))
                .map_err(|e| CodegenError::Other(e.to_string()))
        }
        PatchAction::Modify => {
            if target.exists() {
                backup(&target)?;
            }
            let existing = std::fs::read_to_string(&target).unwrap_or_default();
            let patched = apply_find_replace(&existing, &file.changes);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CodegenError::Other(e.to_string()))?;
            }
            std::fs::write(&target, patched).map_err(|e| CodegenError::Other(e.to_string()))
        }
    }
}

fn backup(target: &Path) -> Result<(), CodegenError> {
    let mut backup_name = target.file_name().unwrap_or_default().to_os_string();
    backup_name.push(".bak");
    let backup_path = target.with_file_name(backup_name);
    std::fs::copy(target, backup_path).map_err(|e| CodegenError::Other(e.to_string()))?;
    Ok(())
}

/// `changes` entries of the form `"find::replace"` are applied in order;
/// entries without the separator are treated as an append.
fn apply_find_replace(source: &str, changes: &[String]) -> String {
    let mut result = source.to_string();
    for change in changes {
        if let Some((find, replace)) = change.split_once("::") {
            result = result.replace(find, replace);
        } else {
            result.push('\n');
            result.push_str(change);
        }
    }
    result
}

fn render_changes(file: &super::PatchFile) -> String {
    file.changes.join("\n")
}
