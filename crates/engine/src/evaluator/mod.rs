//! C10 — Agentic Evaluator: two-phase evaluation (Observation, then
//! Scoring) composed from the submodules below. No direct teacher analog
//! exists for browser-driven evaluation, so this is built fresh in the
//! teacher's idiom: manual multi-turn control (see `explore`), the
//! teacher's agent-builder pattern for LLM client configuration, and
//! `blake3`/rubric types already shared with `runtime`.

pub mod dialogs;
pub mod explore;
pub mod observe;
pub mod scoring;
pub mod targets;

use geminiloop_runtime::browser::BrowserDriverClient;
use geminiloop_runtime::error::RuntimeError;
use geminiloop_runtime::rubric::{BrowserObservation, EvaluationResult};
use rig::completion::CompletionModel;

use explore::StopReason;

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("scoring failed: {0}")]
    Scoring(#[from] scoring::ScoringError),
}

pub struct EvaluationOutcome {
    pub result: EvaluationResult,
    pub stop_reason: StopReason,
    pub desktop_screenshot_base64: Option<String>,
    pub mobile_screenshot_base64: Option<String>,
}

fn screenshot_base64(outcome: &geminiloop_runtime::browser::ToolCallOutcome) -> Option<String> {
    outcome
        .result
        .as_ref()
        .and_then(|v| v.get("base64").or_else(|| v.get("data")).or_else(|| v.get("image")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

const DESKTOP_VIEWPORT: (u32, u32) = (1440, 900);
const MOBILE_WIDTH: u32 = 375;

/// Run the full observation-then-scoring evaluation for one iteration's
/// preview `url`. Requires an already-connected `client`.
pub async fn evaluate<M: CompletionModel + Clone>(
    agent: &rig::agent::Agent<M>,
    client: &BrowserDriverClient,
    task: &str,
    url: &str,
    max_steps: u32,
) -> Result<EvaluationOutcome, EvaluatorError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        tracing::warn!(url, "evaluator navigating to a non-http(s) URL");
    }

    client
        .call_tool(
            "navigate",
            serde_json::json!({ "url": url, "width": DESKTOP_VIEWPORT.0, "height": DESKTOP_VIEWPORT.1 }),
        )
        .await?;
    dialogs::inject(client).await?;

    let desktop_screenshot = client.call_tool("screenshot", serde_json::json!({})).await?;
    let desktop_screenshot_base64 = screenshot_base64(&desktop_screenshot);
    let dom_snapshot = client.call_tool("dom_snapshot", serde_json::json!({})).await?;

    let exploration = explore::run(agent, client, max_steps).await?;

    client
        .call_tool("resize_viewport", serde_json::json!({ "width": MOBILE_WIDTH }))
        .await?;
    let mobile_screenshot = client.call_tool("screenshot", serde_json::json!({})).await?;
    let mobile_screenshot_base64 = screenshot_base64(&mobile_screenshot);
    let console = client.call_tool("console_messages", serde_json::json!({})).await?;
    let console_errors: Vec<String> = console
        .result
        .map(|v| serde_json::from_value(v).unwrap_or_default())
        .unwrap_or_default();

    let interactions_performed: Vec<String> = exploration.steps.iter().map(|s| s.tool.clone()).collect();
    let interaction_results = exploration
        .steps
        .iter()
        .map(|s| {
            (
                format!("step_{}_{}", s.step, s.tool),
                s.verification.dom_changed || s.verification.text_changed || s.verification.url_changed,
            )
        })
        .collect();

    let observations = BrowserObservation {
        desktop_screenshot: desktop_screenshot.success.then(|| "desktop.png".to_string()),
        mobile_screenshot: mobile_screenshot.success.then(|| "mobile.png".to_string()),
        console_errors,
        dom_snapshot: dom_snapshot.result.map(|v| v.to_string()),
        interactions_performed,
        interaction_results,
        exploration_steps: exploration.steps,
    };

    let exploration_summary = summarize_exploration(&observations);
    let dialog_report = summarize_dialogs(&observations);
    let console_report = format!("{:?}", observations.console_errors);

    let outcome = scoring::score(agent, task, observations, &exploration_summary, &dialog_report, &console_report).await?;
    if let Some(warning) = &outcome.rubric_violation_warning {
        tracing::warn!(%warning, "evaluator rubric violation");
    }

    Ok(EvaluationOutcome {
        result: outcome.result,
        stop_reason: exploration.stop_reason,
        desktop_screenshot_base64,
        mobile_screenshot_base64,
    })
}

fn summarize_exploration(observations: &BrowserObservation) -> String {
    observations
        .exploration_steps
        .iter()
        .map(|s| {
            format!(
                "step {}: tool={} dom_changed={} text_changed={} url_changed={} new_errors={:?} new_dialogs={:?}",
                s.step,
                s.tool,
                s.verification.dom_changed,
                s.verification.text_changed,
                s.verification.url_changed,
                s.verification.new_console_errors,
                s.verification.new_dialogs,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize_dialogs(observations: &BrowserObservation) -> String {
    observations
        .exploration_steps
        .iter()
        .flat_map(|s| s.after_state.dialogs.iter().cloned())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_exploration_is_empty_for_no_steps() {
        let observations = BrowserObservation::default();
        assert_eq!(summarize_exploration(&observations), "");
    }
}
