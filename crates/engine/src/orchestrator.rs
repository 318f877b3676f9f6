//! C11 — Orchestration engine: the public `run_loop` entry point composing
//! C1–C10 and the state machine above per spec.md §4.11's pseudocode.
//!
//! `run_loop` never panics and never propagates an `Err` to its caller: any
//! component failure is captured into the `RunState`/`RunResult` as
//! `stop_reason = error`, matching the "engine never crashes" policy in
//! spec.md §7. Preview server and browser driver subprocess are always shut
//! down before returning, success or failure, via explicit `stop()`/
//! `disconnect()` calls on every exit path rather than relying on async
//! `Drop` (which Rust doesn't have).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use geminiloop_runtime::artifacts::ArtifactStore;
use geminiloop_runtime::bootstrap::{self, BootstrapOptions};
use geminiloop_runtime::browser::BrowserDriverClient;
use geminiloop_runtime::path::PathConfig;
use geminiloop_runtime::preview::PreviewServer;
use geminiloop_runtime::rubric::EvaluationResult;
use geminiloop_runtime::state::{
    IterationResult, OpenHandsMode, RunConfig, RunResult, RunState, StopReason,
};
use geminiloop_runtime::trace::{TraceEventType, TraceWriter};
use rig::prelude::*;
use rig::providers::gemini;

use crate::codegen::{
    delegated, scripted, ApplyPatchResult, PatchAction, PatchFile, PatchPlan,
};
use crate::config::EngineConfig;
use crate::evaluator;
use crate::patch_planner;
use crate::planner;
use crate::prompts::EVALUATOR_EXPLORATION_PREAMBLE_V1;
use crate::state_machine::{OrchestratorState, StateMachine};

const DEFAULT_BROWSER_DRIVER_COMMAND: &str = "browser-driver-mcp";
const DEFAULT_OPENHANDS_COMMAND: &str = "openhands-cli";

/// Name of the per-run code-generation working copy, fixed by the
/// filesystem layout in spec.md §6 (`<base>/runs/<run_id>/workspace/`) —
/// distinct from `EngineConfig::project_dir_name`, which names the
/// directory under a standalone, non-run-scoped `PathConfig::from_env()`.
const RUN_WORKSPACE_DIR_NAME: &str = "workspace";

/// The public C11 entry point. `max_iterations` is clamped by `config`
/// before use; `notes`, when present, bypasses the planner entirely for the
/// whole run, matching the "never invoke the planner when notes was
/// supplied" invariant.
pub async fn run_loop(
    config: &EngineConfig,
    task: &str,
    max_iterations: Option<u32>,
    base_dir: PathBuf,
    notes: Option<&str>,
) -> RunResult {
    let max_iterations = config.clamp_max_iterations(max_iterations);

    let run_config = match RunConfig::new(task, max_iterations, base_dir.clone()) {
        Ok(c) => c,
        Err(e) => return bare_failure("unknown", e.to_string()),
    };
    let run_id = run_config.run_id.clone();

    // `<base>/runs/<run_id>/` is this run's own root; `workspace/`,
    // `artifacts/`, and `site/` are its three siblings (spec.md §6). Scoping
    // `PathConfig` to this root (rather than the shared `base_dir`) makes
    // `project_root` a fresh, run-private directory — C8 and C2 still share
    // exactly one directory within a run (spec.md §5), but two runs never
    // contend for the same one.
    let run_root = base_dir.join("runs").join(&run_id);
    let paths = match PathConfig::new(run_root.clone(), RUN_WORKSPACE_DIR_NAME) {
        Ok(p) => p,
        Err(e) => return bare_failure(&run_id, e.to_string()),
    };
    let artifacts_dir = run_root.join("artifacts");

    let mut state = match RunState::new(
        run_config,
        paths.project_root.clone(),
        artifacts_dir.clone(),
        paths.site_root.clone(),
        config.planner.model.clone(),
        config.evaluator.model.clone(),
    ) {
        Ok(s) => s,
        Err(e) => return bare_failure(&run_id, e.to_string()),
    };

    let trace = match TraceWriter::open(artifacts_dir.join("trace.jsonl")) {
        Ok(t) => t,
        Err(e) => {
            let _ = state.fail(e.to_string());
            return state.result.clone();
        }
    };
    let artifacts = match ArtifactStore::new(&artifacts_dir) {
        Ok(a) => a,
        Err(e) => {
            let _ = state.fail(e.to_string());
            return state.result.clone();
        }
    };

    let _ = trace.record(
        TraceEventType::RunStart,
        "run started",
        serde_json::json!({"task": task, "run_id": run_id, "max_iterations": max_iterations}),
    );

    let mut sm = StateMachine::new();
    let stop_reason = match run_phases(config, task, notes, &paths, &mut state, &trace, &artifacts, &mut sm).await {
        Ok(reason) => {
            let _ = state.complete(reason);
            reason
        }
        Err(message) => {
            tracing::error!(error = %message, "run_loop failed");
            let _ = sm.fail(&message);
            let _ = trace.record(TraceEventType::Error, message.clone(), serde_json::json!({}));
            let _ = state.fail(message);
            StopReason::Error
        }
    };

    let _ = trace.record(
        TraceEventType::RunEnd,
        "run ended",
        serde_json::json!({"stop_reason": format!("{stop_reason:?}")}),
    );
    state.result.clone()
}

fn bare_failure(run_id: &str, error_message: String) -> RunResult {
    RunResult {
        run_id: run_id.to_string(),
        status: geminiloop_runtime::state::RunStatus::Failed,
        iterations: Vec::new(),
        final_score: 0,
        final_passed: false,
        preview_url: None,
        template_reference: None,
        error_message: Some(error_message),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_phases(
    config: &EngineConfig,
    task: &str,
    notes: Option<&str>,
    paths: &PathConfig,
    state: &mut RunState,
    trace: &TraceWriter,
    artifacts: &ArtifactStore,
    sm: &mut StateMachine,
) -> Result<StopReason, String> {
    sm.advance(OrchestratorState::Bootstrap, None).map_err(|e| e.to_string())?;
    let bootstrap_options = BootstrapOptions {
        repo_url: config.template_repo_url.clone(),
        git_ref: config.template_ref.clone(),
        run_init: config.run_template_init,
        publish_to_site: config.publish_to_site,
    };
    let bootstrap_result = bootstrap::bootstrap(paths, &bootstrap_options)
        .await
        .map_err(|e| e.to_string())?;
    state.result.template_reference = bootstrap_result
        .repo_url
        .as_ref()
        .map(|url| format!("{url}@{}", bootstrap_result.git_ref));
    let _ = trace.record(
        TraceEventType::Info,
        "bootstrap complete",
        serde_json::to_value(&bootstrap_result).unwrap_or_default(),
    );

    sm.advance(OrchestratorState::PreviewUp, None).map_err(|e| e.to_string())?;
    let mut preview = PreviewServer::start(&paths.preview_host, paths.preview_port, state.workspace_dir.clone())
        .await
        .map_err(|e| e.to_string())?;
    state.set_preview_url(preview.url());
    let _ = trace.record(
        TraceEventType::Info,
        "preview server up",
        serde_json::json!({"url": preview.url()}),
    );

    let mut browser = BrowserDriverClient::new();
    let browser_command = std::env::var("BROWSER_DRIVER_COMMAND")
        .unwrap_or_else(|_| DEFAULT_BROWSER_DRIVER_COMMAND.to_string());
    let browser_args: Vec<String> = std::env::var("BROWSER_DRIVER_ARGS")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let connect_result = browser.connect(&browser_command, &browser_args).await;

    let outcome = match connect_result {
        Ok(()) => run_iterations(config, task, notes, state, trace, artifacts, sm, &preview, &browser).await,
        Err(e) => Err(format!("browser driver connect failed: {e}")),
    };

    browser.disconnect().await;
    preview.stop().await;
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn run_iterations(
    config: &EngineConfig,
    task: &str,
    notes: Option<&str>,
    state: &mut RunState,
    trace: &TraceWriter,
    artifacts: &ArtifactStore,
    sm: &mut StateMachine,
    preview: &PreviewServer,
    browser: &BrowserDriverClient,
) -> Result<StopReason, String> {
    let workspace_dir = state.workspace_dir.clone();

    sm.advance(OrchestratorState::Plan, None).map_err(|e| e.to_string())?;
    let _ = trace.record(TraceEventType::Info, "planning", serde_json::json!({}));
    let brief = planner::plan(&config.planner, task, notes)
        .await
        .map_err(|e| e.to_string())?;
    let _ = artifacts.save_report("planning_brief.txt", &brief.text);
    if let Some(thinking) = &brief.thinking {
        let _ = artifacts.save_report("planning_thinking.txt", thinking);
    }

    let evaluator_client = gemini::Client::new(&config.evaluator.api_key).map_err(|e| e.to_string())?;
    let evaluator_agent = evaluator_client
        .agent(&config.evaluator.model)
        .preamble(EVALUATOR_EXPLORATION_PREAMBLE_V1)
        .temperature(0.2)
        .build();

    let max_iterations = state.config.max_iterations;
    let mut previous_patch_plan: Option<PatchPlan> = None;

    for iteration in 1..=max_iterations {
        sm.set_iteration(iteration);
        let _ = trace.record(
            TraceEventType::IterationStart,
            format!("iteration {iteration} starting"),
            serde_json::json!({"iteration": iteration}),
        );
        let mut result = IterationResult::new(iteration);

        sm.advance(OrchestratorState::Generate, None).map_err(|e| e.to_string())?;
        let _ = trace.record(TraceEventType::GenerationStart, "generation starting", serde_json::json!({"iteration": iteration}));
        let gen_started = Instant::now();
        let generation = run_generation(config, &workspace_dir, task, &brief.text, previous_patch_plan.as_ref()).await;
        result.generation_duration_ms = gen_started.elapsed().as_millis() as u64;

        let files_generated = match generation {
            Ok(files) => {
                result.code_generated = Some(files.join(", "));
                files
            }
            Err(e) => {
                result.error = Some(e.clone());
                state.push_iteration(result);
                return Err(format!("generation failed on iteration {iteration}: {e}"));
            }
        };
        let _ = trace.record(
            TraceEventType::GenerationEnd,
            "generation complete",
            serde_json::json!({"iteration": iteration, "files": files_generated}),
        );

        sm.advance(OrchestratorState::Serve, None).map_err(|e| e.to_string())?;
        let _ = trace.record(
            TraceEventType::TestingStart,
            "serving generated output",
            serde_json::json!({"iteration": iteration, "url": preview.url()}),
        );
        let testing_started = Instant::now();
        let reachable = reqwest::get(preview.url()).await.is_ok();
        result.testing_duration_ms = testing_started.elapsed().as_millis() as u64;
        let _ = trace.record(
            TraceEventType::TestingEnd,
            "preview reachability checked",
            serde_json::json!({"iteration": iteration, "reachable": reachable}),
        );

        sm.advance(OrchestratorState::Evaluate, None).map_err(|e| e.to_string())?;
        let _ = trace.record(TraceEventType::EvaluationStart, "evaluation starting", serde_json::json!({"iteration": iteration}));
        let eval_started = Instant::now();
        let evaluation_outcome = evaluator::evaluate(
            &evaluator_agent,
            browser,
            task,
            &preview.url(),
            config.agentic_max_steps,
        )
        .await;
        result.evaluation_duration_ms = eval_started.elapsed().as_millis() as u64;

        let outcome = match evaluation_outcome {
            Ok(o) => o,
            Err(e) => {
                result.error = Some(e.to_string());
                state.push_iteration(result);
                return Err(format!("evaluation failed on iteration {iteration}: {e}"));
            }
        };

        if let Some(bytes) = outcome.desktop_screenshot_base64.as_deref().and_then(decode_base64) {
            if let Ok(entry) = artifacts.save_screenshot(iteration, "desktop", &bytes) {
                result.screenshot_paths.insert("desktop".to_string(), entry.absolute_path);
            }
        }
        if let Some(bytes) = outcome.mobile_screenshot_base64.as_deref().and_then(decode_base64) {
            if let Ok(entry) = artifacts.save_screenshot(iteration, "mobile", &bytes) {
                result.screenshot_paths.insert("mobile".to_string(), entry.absolute_path);
            }
        }

        let evaluation_json = serde_json::to_string_pretty(&outcome.result).unwrap_or_default();
        let _ = artifacts.save_evaluation(iteration, &evaluation_json);
        persist_exploration_artifacts(artifacts, &outcome.result);
        let _ = trace.record(
            TraceEventType::EvaluationEnd,
            "evaluation complete",
            serde_json::json!({
                "iteration": iteration,
                "score": outcome.result.score,
                "passed": outcome.result.passed,
                "stop_reason": outcome.stop_reason.as_str(),
            }),
        );

        result.apply_evaluation(outcome.result.clone());
        state.push_iteration(result);
        let _ = trace.record(
            TraceEventType::IterationEnd,
            format!("iteration {iteration} complete"),
            serde_json::json!({"iteration": iteration, "passed": outcome.result.passed}),
        );

        if outcome.result.passed {
            sm.advance(OrchestratorState::Finalize, Some("passed")).map_err(|e| e.to_string())?;
            write_report(artifacts, &outcome.result, "passed", iteration, state.result.preview_url.as_deref());
            return Ok(StopReason::Passed);
        }

        if iteration == max_iterations {
            sm.advance(OrchestratorState::Finalize, Some("max_iterations")).map_err(|e| e.to_string())?;
            write_report(artifacts, &outcome.result, "max_iterations", iteration, state.result.preview_url.as_deref());
            return Ok(StopReason::MaxIterations);
        }

        sm.advance(OrchestratorState::Patch, Some("score below threshold")).map_err(|e| e.to_string())?;
        let plan = patch_planner::plan_patch(&outcome.result);
        let plan_json = serde_json::to_string_pretty(&plan).unwrap_or_default();
        let _ = artifacts.save_report(&format!("patch_plan_iter_{iteration}.json"), &plan_json);
        let _ = trace.record(
            TraceEventType::PatchPlanned,
            "patch plan produced",
            serde_json::json!({"iteration": iteration, "files": plan.files.len()}),
        );

        let apply_result = apply_patch(config, &workspace_dir, task, &plan).await;
        let _ = artifacts.save_report(
            &format!("patch_result_iter_{iteration}.json"),
            &serde_json::to_string_pretty(&apply_result).unwrap_or_default(),
        );
        let _ = trace.record(
            TraceEventType::PatchApplied,
            "patch applied",
            serde_json::json!({"iteration": iteration, "success": apply_result.success}),
        );

        if !apply_result.success {
            sm.advance(OrchestratorState::Finalize, Some("patch application failed")).map_err(|e| e.to_string())?;
            write_report(artifacts, &outcome.result, "completed", iteration, state.result.preview_url.as_deref());
            return Ok(StopReason::Completed);
        }

        sm.advance(OrchestratorState::Generate, None).map_err(|e| e.to_string())?;
        previous_patch_plan = Some(plan);
    }

    unreachable!("loop always returns before exhausting max_iterations")
}

async fn run_generation(
    config: &EngineConfig,
    workspace_dir: &Path,
    task: &str,
    brief_text: &str,
    patch_plan: Option<&PatchPlan>,
) -> Result<Vec<String>, String> {
    match config.openhands_mode {
        OpenHandsMode::Local => {
            let command = std::env::var("OPENHANDS_COMMAND").unwrap_or_else(|_| DEFAULT_OPENHANDS_COMMAND.to_string());
            let timeout = Duration::from_secs(config.openhands_timeout_seconds);
            let requirements = patch_plan.map(|p| p.instructions.as_str()).unwrap_or(brief_text);
            delegated::generate_code(&command, workspace_dir, task, requirements, timeout)
                .await
                .map(|r| r.files_generated)
                .map_err(|e| e.to_string())
        }
        OpenHandsMode::Mock => {
            let plan = patch_plan
                .cloned()
                .unwrap_or_else(|| initial_patch_plan(brief_text));
            let result = scripted::apply_patch_plan(workspace_dir, &plan);
            if result.success {
                Ok(result.files_modified)
            } else {
                Err(result.error.unwrap_or_else(|| "scripted codegen failed".to_string()))
            }
        }
    }
}

async fn apply_patch(config: &EngineConfig, workspace_dir: &Path, task: &str, plan: &PatchPlan) -> ApplyPatchResult {
    match config.openhands_mode {
        OpenHandsMode::Local => {
            let command = std::env::var("OPENHANDS_COMMAND").unwrap_or_else(|_| DEFAULT_OPENHANDS_COMMAND.to_string());
            let timeout = Duration::from_secs(config.openhands_timeout_seconds);
            let started = Instant::now();
            match delegated::generate_code(&command, workspace_dir, task, &plan.instructions, timeout).await {
                Ok(r) => ApplyPatchResult {
                    success: true,
                    files_modified: r.files_generated,
                    error: None,
                    duration_seconds: started.elapsed().as_secs_f64(),
                },
                Err(e) => ApplyPatchResult {
                    success: false,
                    files_modified: Vec::new(),
                    error: Some(e.to_string()),
                    duration_seconds: started.elapsed().as_secs_f64(),
                },
            }
        }
        OpenHandsMode::Mock => scripted::apply_patch_plan(workspace_dir, plan),
    }
}

fn initial_patch_plan(brief_text: &str) -> PatchPlan {
    PatchPlan {
        instructions: brief_text.to_string(),
        files: vec![PatchFile {
            path: "index.html".to_string(),
            action: PatchAction::Create,
            description: "initial generation from planning brief".to_string(),
            changes: vec![render_initial_html(brief_text)],
        }],
        original_score: 0,
        issues_count: 0,
        fix_suggestions_from_evaluator: Vec::new(),
    }
}

fn render_initial_html(brief_text: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Generated</title></head>\n<body>\n<!--\n{brief_text}\n-->\n<h1>Generated UI</h1>\n</body>\n</html>\n"
    )
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(value).ok()
}

/// Writes the two exploration-step artifacts named in spec.md §6
/// (`agentic_exploration.json`, `step_<k>_observation.json`). These are not
/// `iter_<N>`-scoped in the layout, so — as with `report.json`/`view.html`
/// — each iteration's call overwrites the last; only the most recent
/// iteration's exploration is kept standalone (the full per-iteration
/// history still lives in `evaluation_iter_<N>.json`'s embedded
/// `observations`).
fn persist_exploration_artifacts(artifacts: &ArtifactStore, result: &EvaluationResult) {
    let steps = &result.observations.exploration_steps;
    let _ = artifacts.save_report(
        "agentic_exploration.json",
        &serde_json::to_string_pretty(steps).unwrap_or_default(),
    );
    for step in steps {
        let _ = artifacts.save_report(
            &format!("step_{}_observation.json", step.step),
            &serde_json::to_string_pretty(step).unwrap_or_default(),
        );
    }
}

/// Writes `report.json` (structured) and `view.html` (human-readable), the
/// two FINALIZE-phase artifacts named in spec.md §4.11/§6.
fn write_report(
    artifacts: &ArtifactStore,
    result: &EvaluationResult,
    stop_reason: &str,
    iteration_count: u32,
    preview_url: Option<&str>,
) {
    let report = serde_json::json!({
        "stop_reason": stop_reason,
        "final_score": result.score,
        "final_passed": result.passed,
        "iteration_count": iteration_count,
        "preview_url": preview_url,
        "feedback": result.feedback,
        "issues": result.issues,
    });
    let _ = artifacts.save_report(
        "report.json",
        &serde_json::to_string_pretty(&report).unwrap_or_default(),
    );

    let view = format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>GeminiLoop run report</title></head>\n<body>\n<h1>GeminiLoop run report</h1>\n<p>Stop reason: {stop_reason}</p>\n<p>Final score: {} (passed: {})</p>\n<p>Iterations: {iteration_count}</p>\n<pre>{}</pre>\n</body>\n</html>\n",
        result.score,
        result.passed,
        html_escape(&result.feedback),
    );
    let _ = artifacts.save_file("view.html", view.as_bytes());
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
