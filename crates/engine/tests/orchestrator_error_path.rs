//! Integration test for the orchestrator's error path: what happens when
//! the browser-driver subprocess the evaluator depends on doesn't exist.
//! `rig::agent::Agent<M: CompletionModel>` and `BrowserDriverClient` are
//! both concrete types backed by a live LLM endpoint / real subprocess, so
//! this is the one S1-S8-style scenario (spec.md §8's "subprocess driver
//! lost") reachable without network access or a browser-driver binary —
//! `run_loop` must still finish cleanly: no panic, `stop_reason = error`,
//! and `state.json`/`manifest.json` written under the per-run
//! `artifacts/` directory.

use geminiloop_engine::config::EngineConfig;
use geminiloop_engine::orchestrator::run_loop;
use geminiloop_runtime::state::RunStatus;

#[tokio::test]
async fn missing_browser_driver_binary_ends_the_run_cleanly() {
    let base_dir = tempfile::tempdir().unwrap();
    std::env::set_var(
        "BROWSER_DRIVER_COMMAND",
        "geminiloop-test-nonexistent-browser-driver-binary",
    );

    let config = EngineConfig::for_tests();
    let result = run_loop(&config, "build a todo app", Some(1), base_dir.path().to_path_buf(), None).await;

    std::env::remove_var("BROWSER_DRIVER_COMMAND");

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error_message.is_some());

    let run_root = base_dir.path().join("runs").join(&result.run_id);
    assert!(run_root.join("workspace").is_dir());
    assert!(run_root.join("site").is_dir());
    assert!(run_root.join("artifacts").join("state.json").exists());
    assert!(run_root.join("artifacts").join("manifest.json").exists());
}

#[tokio::test]
async fn notes_bypass_still_requires_a_reachable_browser_driver() {
    // Even when `notes` skips the planner, the evaluator still needs the
    // browser driver, so the same clean-failure shape holds.
    let base_dir = tempfile::tempdir().unwrap();
    std::env::set_var(
        "BROWSER_DRIVER_COMMAND",
        "geminiloop-test-nonexistent-browser-driver-binary",
    );

    let config = EngineConfig::for_tests();
    let result = run_loop(
        &config,
        "build a todo app",
        Some(1),
        base_dir.path().to_path_buf(),
        Some("use a kanban layout"),
    )
    .await;

    std::env::remove_var("BROWSER_DRIVER_COMMAND");

    assert_eq!(result.status, RunStatus::Failed);
    let artifacts_dir = base_dir.path().join("runs").join(&result.run_id).join("artifacts");
    let brief_path = artifacts_dir.join("planning_brief.txt");
    assert!(
        !brief_path.exists(),
        "planner should never run when notes bypasses it"
    );
}
