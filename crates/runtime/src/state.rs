//! C5 — Run configuration and lifecycle state.
//!
//! `RunState` plays the role a session manager plays over its session
//! state: it owns the mutable `RunResult` for the run's lifetime and is the
//! sole writer of `state.json`, while `RunManifest` is the separately
//! persisted, always-written machine-readable summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};
use crate::rubric::{EvaluationResult, RUBRIC_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenHandsMode {
    Mock,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub task: String,
    pub max_iterations: u32,
    pub base_dir: PathBuf,
    pub run_id: String,
    pub openhands_mode: OpenHandsMode,
}

impl RunConfig {
    pub fn new(task: impl Into<String>, max_iterations: u32, base_dir: PathBuf) -> RuntimeResult<Self> {
        if max_iterations < 1 {
            return Err(RuntimeError::other("max_iterations must be >= 1"));
        }
        Ok(Self {
            task: task.into(),
            max_iterations,
            base_dir,
            run_id: generate_run_id(),
            openhands_mode: OpenHandsMode::Mock,
        })
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_openhands_mode(mut self, mode: OpenHandsMode) -> Self {
        self.openhands_mode = mode;
        self
    }
}

fn generate_run_id() -> String {
    let now = Utc::now();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| {
            let c = rng.gen_range(0..16);
            std::char::from_digit(c, 16).unwrap()
        })
        .collect();
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Passed,
    MaxIterations,
    Completed,
    Failed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub iteration: u32,
    pub code_generated: Option<String>,
    pub screenshot_paths: std::collections::BTreeMap<String, PathBuf>,
    pub evaluation: Option<EvaluationResult>,
    pub score: i64,
    pub passed: bool,
    pub generation_duration_ms: u64,
    pub testing_duration_ms: u64,
    pub evaluation_duration_ms: u64,
    pub error: Option<String>,
}

impl IterationResult {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            code_generated: None,
            screenshot_paths: Default::default(),
            evaluation: None,
            score: 0,
            passed: false,
            generation_duration_ms: 0,
            testing_duration_ms: 0,
            evaluation_duration_ms: 0,
            error: None,
        }
    }

    pub fn apply_evaluation(&mut self, evaluation: EvaluationResult) {
        self.score = evaluation.score;
        self.passed = evaluation.passed;
        self.evaluation = Some(evaluation);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub iterations: Vec<IterationResult>,
    pub final_score: i64,
    pub final_passed: bool,
    pub preview_url: Option<String>,
    pub template_reference: Option<String>,
    pub error_message: Option<String>,
}

impl RunResult {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            iterations: Vec::new(),
            final_score: 0,
            final_passed: false,
            preview_url: None,
            template_reference: None,
            error_message: None,
        }
    }

    /// Status transitions are one-way: `running -> {completed, failed}`.
    /// Calling this again on a terminal state is a no-op.
    fn transition(&mut self, status: RunStatus) {
        if self.status == RunStatus::Running {
            self.status = status;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchCommitRecord {
    pub iteration: u32,
    pub commit_hash: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub status: RunStatus,
    pub generator_model: String,
    pub evaluator_model: String,
    pub rubric_version: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
    pub iteration_count: u32,
    pub stop_reason: Option<StopReason>,
    pub final_score: i64,
    pub final_passed: bool,
    pub preview_url: Option<String>,
    pub error_message: Option<String>,
    pub patch_commits: Vec<PatchCommitRecord>,
}

impl RunManifest {
    fn new(run_id: String, generator_model: String, evaluator_model: String) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            generator_model,
            evaluator_model,
            rubric_version: RUBRIC_VERSION.to_string(),
            started_at: Utc::now().to_rfc3339(),
            ended_at: None,
            duration_ms: None,
            iteration_count: 0,
            stop_reason: None,
            final_score: 0,
            final_passed: false,
            preview_url: None,
            error_message: None,
            patch_commits: Vec::new(),
        }
    }
}

/// Owns `workspace_dir`, `artifacts_dir`, `site_dir`, and everything under
/// them for the lifetime of one run; sole writer of `state.json`.
pub struct RunState {
    pub config: RunConfig,
    pub workspace_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub site_dir: PathBuf,
    pub result: RunResult,
    manifest: RunManifest,
    state_path: PathBuf,
    manifest_path: PathBuf,
    started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(
        config: RunConfig,
        workspace_dir: PathBuf,
        artifacts_dir: PathBuf,
        site_dir: PathBuf,
        generator_model: impl Into<String>,
        evaluator_model: impl Into<String>,
    ) -> RuntimeResult<Self> {
        std::fs::create_dir_all(&workspace_dir)?;
        std::fs::create_dir_all(&artifacts_dir)?;
        std::fs::create_dir_all(&site_dir)?;

        let result = RunResult::new(config.run_id.clone());
        let manifest = RunManifest::new(
            config.run_id.clone(),
            generator_model.into(),
            evaluator_model.into(),
        );

        // `state.json`/`manifest.json` live under `artifacts/`, not at the
        // run root, per the filesystem layout in spec.md §6.
        let state_path = artifacts_dir.join("state.json");
        let manifest_path = artifacts_dir.join("manifest.json");

        Ok(Self {
            state_path,
            manifest_path,
            workspace_dir,
            artifacts_dir,
            site_dir,
            config,
            result,
            manifest,
            started_at: Utc::now(),
        })
    }

    pub fn push_iteration(&mut self, iteration: IterationResult) {
        self.manifest.iteration_count += 1;
        self.result.iterations.push(iteration);
    }

    pub fn record_patch_commit(&mut self, iteration: u32, commit_hash: String, message: String) {
        self.manifest.patch_commits.push(PatchCommitRecord {
            iteration,
            commit_hash,
            message,
        });
    }

    pub fn set_preview_url(&mut self, url: String) {
        self.result.preview_url = Some(url.clone());
        self.manifest.preview_url = Some(url);
    }

    pub fn save_state(&self) -> RuntimeResult<()> {
        let json = serde_json::to_string_pretty(&self.result)?;
        std::fs::write(&self.state_path, json)?;
        Ok(())
    }

    pub fn save_manifest(&self) -> RuntimeResult<()> {
        let json = serde_json::to_string_pretty(&self.manifest)?;
        std::fs::write(&self.manifest_path, json)?;
        Ok(())
    }

    /// Finalize the run: `status` becomes `failed` iff `stop_reason ==
    /// error`, otherwise `completed`. Always writes state and manifest,
    /// even on the error path, per the spec's "manifest always written"
    /// invariant.
    pub fn complete(&mut self, stop_reason: StopReason) -> RuntimeResult<()> {
        let final_status = if stop_reason == StopReason::Error {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.result.transition(final_status);

        if let Some(last) = self.result.iterations.last() {
            self.result.final_score = last.score;
            self.result.final_passed = last.passed;
        }

        let ended_at = Utc::now();
        self.manifest.status = final_status;
        self.manifest.ended_at = Some(ended_at.to_rfc3339());
        self.manifest.duration_ms =
            Some((ended_at - self.started_at).num_milliseconds().max(0) as u64);
        self.manifest.stop_reason = Some(stop_reason);
        self.manifest.final_score = self.result.final_score;
        self.manifest.final_passed = self.result.final_passed;

        self.save_state()?;
        self.save_manifest()?;
        Ok(())
    }

    pub fn fail(&mut self, error_message: impl Into<String>) -> RuntimeResult<()> {
        let message = error_message.into();
        self.result.error_message = Some(message.clone());
        self.manifest.error_message = Some(message);
        self.complete(StopReason::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(dir: &std::path::Path) -> RunState {
        let config = RunConfig::new("build a todo app", 2, dir.to_path_buf()).unwrap();
        RunState::new(
            config,
            dir.join("workspace"),
            dir.join("artifacts"),
            dir.join("site"),
            "gemini-2.0-flash",
            "gemini-2.0-flash",
        )
        .unwrap()
    }

    #[test]
    fn max_iterations_below_one_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::new("x", 0, dir.path().to_path_buf());
        assert!(err.is_err());
    }

    #[test]
    fn completing_sets_status_and_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut rs = state(dir.path());
        let mut iter = IterationResult::new(1);
        let category_scores = crate::rubric::rubric_weights()
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight as i64))
            .collect();
        iter.apply_evaluation(
            EvaluationResult {
                score: 0,
                passed: false,
                category_scores,
                issues: vec![],
                fix_suggestions: vec![],
                feedback: "good".into(),
                observations: Default::default(),
            }
            .normalize(),
        );
        rs.push_iteration(iter);
        rs.complete(StopReason::Passed).unwrap();

        assert_eq!(rs.result.status, RunStatus::Completed);
        assert!(rs.result.final_passed);
        assert!(rs.manifest_path.exists());
        assert!(rs.state_path.exists());
    }

    #[test]
    fn error_stop_reason_marks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut rs = state(dir.path());
        rs.fail("browser driver crashed").unwrap();
        assert_eq!(rs.result.status, RunStatus::Failed);
        assert_eq!(rs.result.error_message.as_deref(), Some("browser driver crashed"));
    }

    #[test]
    fn terminal_status_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let mut rs = state(dir.path());
        rs.complete(StopReason::Passed).unwrap();
        rs.result.transition(RunStatus::Failed);
        assert_eq!(rs.result.status, RunStatus::Completed);
    }
}
