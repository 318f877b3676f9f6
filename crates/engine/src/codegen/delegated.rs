//! Delegated C8 backend: invokes the external agentic code-editing backend
//! as a subprocess under a hard wall-clock timeout, the same
//! spawn-bound-by-timeout shape C3 uses for template clone/init.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use super::{CodegenError, GenerateCodeResult};

/// Runs `command` with `task` and `detailed_requirements` as arguments,
/// cwd'd into `workspace_path`, bounded by `timeout`. On timeout the child
/// is killed and any files it already wrote are left in place — captured
/// by re-scanning the workspace after the call returns.
pub async fn generate_code(
    command: &str,
    workspace_path: &Path,
    task: &str,
    detailed_requirements: &str,
    timeout: Duration,
) -> Result<GenerateCodeResult, CodegenError> {
    let before = super::capture_workspace_files(workspace_path);

    let mut child = Command::new(command)
        .arg(task)
        .arg(detailed_requirements)
        .current_dir(workspace_path)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CodegenError::Other(format!("failed to spawn {command}: {e}")))?;

    let wait = tokio::time::timeout(timeout, child.wait()).await;
    match wait {
        Ok(Ok(status)) if !status.success() => {
            tracing::warn!(command = %command, "delegated code generation exited non-zero");
        }
        Ok(Err(e)) => return Err(CodegenError::Other(e.to_string())),
        Err(_) => {
            let _ = child.kill().await;
            return Err(CodegenError::Timeout(timeout.as_secs()));
        }
        Ok(Ok(_)) => {}
    }

    let after = super::capture_workspace_files(workspace_path);
    let files_generated: Vec<String> = after
        .into_iter()
        .filter(|p| !before.contains(p))
        .filter_map(|p| {
            p.strip_prefix(workspace_path)
                .ok()
                .map(|rel| rel.to_string_lossy().into_owned())
        })
        .collect();

    Ok(GenerateCodeResult { files_generated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_kills_child_and_reports_timeout_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .unwrap();

        let result = generate_code(
            script.to_str().unwrap(),
            dir.path(),
            "task",
            "reqs",
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(CodegenError::Timeout(_))));
    }

    #[tokio::test]
    async fn files_written_before_timeout_are_still_counted() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gen.sh");
        std::fs::write(&script, "#!/bin/sh\ntouch generated.html\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .unwrap();

        let result = generate_code(
            script.to_str().unwrap(),
            dir.path(),
            "task",
            "reqs",
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(result, Err(CodegenError::Timeout(_))));
        assert!(dir.path().join("generated.html").exists());
    }
}
