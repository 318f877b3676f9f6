//! C3 — Template bootstrap: optionally populate `PROJECT_ROOT` from a git
//! template at run start.
//!
//! Shells out to `git` and an optional init script the same way the coder
//! routing layer shells out to `git commit`/`git diff` — bounded by
//! `tokio::time::timeout` rather than trusting the child process to behave.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{RuntimeError, RuntimeResult};
use crate::path::PathConfig;

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const INIT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);
const INIT_SCRIPT_CANDIDATES: &[&str] = &["init.sh", "bootstrap.sh", "setup.sh"];

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub repo_url: Option<String>,
    pub git_ref: String,
    pub run_init: bool,
    pub publish_to_site: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            repo_url: None,
            git_ref: "main".to_string(),
            run_init: false,
            publish_to_site: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub success: bool,
    pub enabled: bool,
    pub files_count: usize,
    pub repo_url: Option<String>,
    pub git_ref: String,
}

impl BootstrapResult {
    fn disabled() -> Self {
        Self {
            success: true,
            enabled: false,
            files_count: 0,
            repo_url: None,
            git_ref: String::new(),
        }
    }
}

pub async fn bootstrap(paths: &PathConfig, options: &BootstrapOptions) -> RuntimeResult<BootstrapResult> {
    let Some(repo_url) = options.repo_url.clone() else {
        return Ok(BootstrapResult::disabled());
    };

    let normalized_project = crate::path::normalize_lexically(&paths.project_root);
    let normalized_workspace = crate::path::normalize_lexically(&paths.workspace_root);
    if !normalized_project.starts_with(&normalized_workspace) {
        return Err(RuntimeError::PathEscape {
            attempted: normalized_project,
            root: normalized_workspace,
        });
    }

    if paths.project_root.exists() {
        std::fs::remove_dir_all(&paths.project_root)?;
    }
    std::fs::create_dir_all(&paths.project_root)?;

    clone_shallow(&repo_url, &paths.project_root).await?;

    if options.git_ref != "main" {
        checkout_ref(&paths.project_root, &options.git_ref).await?;
    }
    let commit_sha = head_commit(&paths.project_root).await.unwrap_or_default();
    tracing::info!(repo_url = %repo_url, git_ref = %options.git_ref, commit = %commit_sha, "template cloned");

    if options.run_init {
        run_init_script(&paths.project_root).await;
    }

    if options.publish_to_site {
        mirror_to_site(&paths.project_root, &paths.site_root)?;
    }

    let files_count = count_files(&paths.project_root);

    Ok(BootstrapResult {
        success: true,
        enabled: true,
        files_count,
        repo_url: Some(repo_url),
        git_ref: options.git_ref.clone(),
    })
}

async fn clone_shallow(repo_url: &str, dest: &Path) -> RuntimeResult<()> {
    let output = tokio::time::timeout(
        CLONE_TIMEOUT,
        Command::new("git")
            .args([
                "clone",
                "--depth",
                "1",
                "--single-branch",
                repo_url,
                &dest.to_string_lossy(),
            ])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| RuntimeError::Timeout {
        operation: "template clone".into(),
        elapsed_ms: CLONE_TIMEOUT.as_millis() as u64,
    })??;

    if !output.status.success() {
        return Err(RuntimeError::other(format!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

async fn checkout_ref(repo_dir: &Path, git_ref: &str) -> RuntimeResult<()> {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(["checkout", git_ref])
        .output()
        .await?;
    if !output.status.success() {
        tracing::warn!(git_ref = %git_ref, "checkout failed, staying on default branch");
    }
    Ok(())
}

async fn head_commit(repo_dir: &Path) -> RuntimeResult<String> {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .await?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn run_init_script(project_root: &Path) {
    for candidate in INIT_SCRIPT_CANDIDATES {
        let script = project_root.join(candidate);
        if !script.exists() {
            continue;
        }
        let result = tokio::time::timeout(
            INIT_SCRIPT_TIMEOUT,
            Command::new("sh")
                .arg(&script)
                .current_dir(project_root)
                .kill_on_drop(true)
                .output(),
        )
        .await;
        match result {
            Ok(Ok(output)) if !output.status.success() => {
                tracing::warn!(
                    script = %candidate,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "init script exited non-zero"
                );
            }
            Ok(Err(e)) => tracing::warn!(script = %candidate, error = %e, "init script failed to run"),
            Err(_) => tracing::warn!(script = %candidate, "init script timed out"),
            Ok(Ok(_)) => {}
        }
        break;
    }
}

fn mirror_to_site(project_root: &Path, site_root: &Path) -> RuntimeResult<()> {
    std::fs::create_dir_all(site_root)?;
    copy_dir_recursive(project_root, site_root)
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> RuntimeResult<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.file_name() == ".git" {
                continue;
            }
            if let Ok(file_type) = entry.file_type() {
                if file_type.is_dir() {
                    count += count_files(&entry.path());
                } else {
                    count += 1;
                }
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_when_repo_url_unset() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathConfig::new(dir.path().to_path_buf(), "project").unwrap();
        let result = bootstrap(&paths, &BootstrapOptions::default()).await.unwrap();
        assert!(!result.enabled);
        assert!(result.success);
    }

    #[test]
    fn count_files_skips_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        assert_eq!(count_files(dir.path()), 1);
    }
}
