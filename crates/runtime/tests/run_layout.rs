//! Integration test for the per-run filesystem layout: `RunState::new` and
//! `ArtifactStore` together must produce the exact sibling structure
//! spec.md §6 names under `<base>/runs/<run_id>/`, and it must hold
//! independently for two runs sharing the same `base_dir`.

use geminiloop_runtime::artifacts::ArtifactStore;
use geminiloop_runtime::path::PathConfig;
use geminiloop_runtime::state::{RunConfig, RunState};

fn run_root(base_dir: &std::path::Path, run_id: &str) -> std::path::PathBuf {
    base_dir.join("runs").join(run_id)
}

#[test]
fn run_root_has_workspace_artifacts_site_siblings() {
    let base_dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new("build a todo app", 2, base_dir.path().to_path_buf()).unwrap();
    let run_id = config.run_id.clone();
    let root = run_root(base_dir.path(), &run_id);

    let paths = PathConfig::new(root.clone(), "workspace").unwrap();
    let artifacts_dir = root.join("artifacts");

    let state = RunState::new(
        config,
        paths.project_root.clone(),
        artifacts_dir.clone(),
        paths.site_root.clone(),
        "gemini-2.0-flash",
        "gemini-2.0-flash",
    )
    .unwrap();

    assert_eq!(state.workspace_dir, root.join("workspace"));
    assert_eq!(state.artifacts_dir, root.join("artifacts"));
    assert_eq!(state.site_dir, root.join("site"));
    assert!(state.workspace_dir.is_dir());
    assert!(state.artifacts_dir.is_dir());
    assert!(state.site_dir.is_dir());

    state.save_state().unwrap();
    state.save_manifest().unwrap();
    assert!(artifacts_dir.join("state.json").exists());
    assert!(artifacts_dir.join("manifest.json").exists());
    assert!(!root.join("state.json").exists());
    assert!(!root.join("manifest.json").exists());
}

#[test]
fn two_runs_sharing_a_base_dir_get_independent_workspaces() {
    let base_dir = tempfile::tempdir().unwrap();

    let config_a = RunConfig::new("task a", 1, base_dir.path().to_path_buf()).unwrap();
    let root_a = run_root(base_dir.path(), &config_a.run_id);
    let paths_a = PathConfig::new(root_a.clone(), "workspace").unwrap();
    let state_a = RunState::new(
        config_a,
        paths_a.project_root.clone(),
        root_a.join("artifacts"),
        paths_a.site_root.clone(),
        "gemini-2.0-flash",
        "gemini-2.0-flash",
    )
    .unwrap();

    let config_b = RunConfig::new("task b", 1, base_dir.path().to_path_buf()).unwrap();
    let root_b = run_root(base_dir.path(), &config_b.run_id);
    let paths_b = PathConfig::new(root_b.clone(), "workspace").unwrap();
    let state_b = RunState::new(
        config_b,
        paths_b.project_root.clone(),
        root_b.join("artifacts"),
        paths_b.site_root.clone(),
        "gemini-2.0-flash",
        "gemini-2.0-flash",
    )
    .unwrap();

    assert_ne!(state_a.workspace_dir, state_b.workspace_dir);

    std::fs::write(state_a.workspace_dir.join("index.html"), "a").unwrap();
    std::fs::write(state_b.workspace_dir.join("index.html"), "b").unwrap();

    assert_eq!(
        std::fs::read_to_string(state_a.workspace_dir.join("index.html")).unwrap(),
        "a"
    );
    assert_eq!(
        std::fs::read_to_string(state_b.workspace_dir.join("index.html")).unwrap(),
        "b"
    );
}

#[test]
fn artifact_filenames_use_prefix_first_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();

    let entry = store.save_evaluation(3, "{}").unwrap();
    assert_eq!(entry.filename, "evaluation_iter_3.json");

    let plan_entry = store.save_report("patch_plan_iter_3.json", "{}").unwrap();
    assert_eq!(plan_entry.filename, "patch_plan_iter_3.json");

    let result_entry = store.save_report("patch_result_iter_3.json", "{}").unwrap();
    assert_eq!(result_entry.filename, "patch_result_iter_3.json");
}
