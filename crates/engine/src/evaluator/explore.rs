//! Exploration loop (spec.md §4.10): single-threaded, cooperative, bounded
//! by `max_steps`. Owns the consecutive-empty and consecutive-send-failure
//! counters itself rather than handing the turn loop to rig's automatic
//! `multi_turn` — BEFORE state must be captured *before* the model acts,
//! which a framework-driven tool loop can't express, so each turn here is
//! one manual `agent.completion(...).send()` call followed by this module
//! executing whatever tool call came back against C6.

use std::time::Duration;

use geminiloop_runtime::browser::BrowserDriverClient;
use geminiloop_runtime::error::RuntimeResult;
use geminiloop_runtime::rubric::{BrowserState, ExplorationStep, InteractiveTarget, Verification};
use rig::completion::{AssistantContent, Completion, CompletionModel, Message, ToolDefinition};
use rig::message::{ImageMediaType, ToolFunction, UserContent};
use rig::OneOrMany;

use super::observe::capture_state;

const SAFE_DEFAULT_TOOL: &str = "dom_snapshot";
const MAX_CONSECUTIVE_EMPTY: u32 = 3;
const MAX_CONSECUTIVE_SEND_FAILURES: u32 = 3;
const SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    AgentFinished,
    MaxStepsReached,
    EmptyResponses,
    SendFailures,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::AgentFinished => "agent_finished",
            StopReason::MaxStepsReached => "max_steps_reached",
            StopReason::EmptyResponses => "empty_responses",
            StopReason::SendFailures => "send_failures",
        }
    }
}

pub struct ExplorationOutcome {
    pub steps: Vec<ExplorationStep>,
    pub stop_reason: StopReason,
}

pub fn exploration_tools() -> Vec<ToolDefinition> {
    let actions = ["click", "type", "scroll", "navigate", "evaluate", "dom_snapshot"];
    let mut tools: Vec<ToolDefinition> = actions
        .iter()
        .map(|name| ToolDefinition {
            name: name.to_string(),
            description: format!("Perform a browser `{name}` action."),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string"},
                    "value": {"type": "string"},
                    "script": {"type": "string"},
                    "url": {"type": "string"},
                },
            }),
        })
        .collect();
    tools.push(ToolDefinition {
        name: "finish_exploration".to_string(),
        description: "Call when no further exploration is useful.".to_string(),
        parameters: serde_json::json!({"type": "object", "properties": {}}),
    });
    tools
}

/// Build the multimodal observation message: the BEFORE state rendered as
/// text plus its screenshot, when one was captured.
fn build_observation_message(step: u32, before: &BrowserState, screenshot_base64: Option<&str>) -> Message {
    let targets_text = summarize_targets(&before.interactive_targets);
    let text = format!(
        "Step {step}. URL: {url}\nVisible text:\n{visible}\nInteractive targets:\n{targets}\nConsole errors: {errors:?}\nDialogs: {dialogs:?}\nChoose exactly one tool call, or call finish_exploration if nothing further is worth trying.",
        url = before.url,
        visible = before.visible_text,
        targets = targets_text,
        errors = before.console_errors,
        dialogs = before.dialogs,
    );

    let mut content = vec![UserContent::text(text)];
    if let Some(b64) = screenshot_base64 {
        content.push(UserContent::image_base64(b64, Some(ImageMediaType::PNG), None));
    }
    Message::User {
        content: OneOrMany::many(content).expect("always at least the text part"),
    }
}

fn summarize_targets(targets: &[InteractiveTarget]) -> String {
    targets
        .iter()
        .map(|t| format!("{} ({})", t.selector, t.text))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Concatenate reasoning/text parts and collect every function call from one
/// turn's response, per the defensive-parsing rule in spec.md §7.
fn parse_response(choice: &OneOrMany<AssistantContent>) -> (String, Vec<ToolFunction>) {
    let mut reasoning = String::new();
    let mut calls = Vec::new();
    for part in choice.iter() {
        match part {
            AssistantContent::Text(text) => {
                reasoning.push_str(text.text());
                reasoning.push('\n');
            }
            AssistantContent::Reasoning(r) => {
                reasoning.push_str(&r.reasoning.join("\n"));
                reasoning.push('\n');
            }
            AssistantContent::ToolCall(call) => calls.push(call.function.clone()),
            AssistantContent::Image(_) => {}
        }
    }
    (reasoning.trim().to_string(), calls)
}

/// Execute `function` via C6, falling back to an `evaluate`-based
/// implementation when the native tool name isn't recognized or fails.
async fn execute_tool(client: &BrowserDriverClient, function: &ToolFunction) -> (String, serde_json::Value) {
    let native = client.call_tool(&function.name, function.arguments.clone()).await;
    match native {
        Ok(outcome) if outcome.success => (
            function.name.clone(),
            outcome.result.unwrap_or(serde_json::Value::Null),
        ),
        _ => {
            let fallback_script = fallback_script_for(function);
            let fallback = client
                .call_tool("evaluate", serde_json::json!({ "script": fallback_script }))
                .await;
            match fallback {
                Ok(outcome) => (
                    function.name.clone(),
                    outcome.result.unwrap_or(serde_json::Value::Null),
                ),
                Err(e) => (function.name.clone(), serde_json::json!({"error": e.to_string()})),
            }
        }
    }
}

fn fallback_script_for(function: &ToolFunction) -> String {
    let selector = function
        .arguments
        .get("selector")
        .and_then(|v| v.as_str())
        .unwrap_or("body");
    match function.name.as_str() {
        // `{:?}` renders a Rust string as an escaped, double-quoted literal
        // (quotes and backslashes escaped the same way JS expects), so a
        // selector or value containing a quote doesn't break out of the
        // generated script — unlike splicing it into a bare `'...'` literal.
        "click" => format!("document.querySelector({selector:?})?.click()"),
        "type" => {
            let value = function.arguments.get("value").and_then(|v| v.as_str()).unwrap_or("");
            format!("document.querySelector({selector:?}).value = {value:?}")
        }
        "scroll" => "window.scrollBy(0, 400)".to_string(),
        _ => "document.documentElement.outerHTML.length".to_string(),
    }
}

/// Run the exploration loop against an already-bootstrapped page (wrapper
/// injected, desktop screenshot/dom_snapshot already taken by the caller).
pub async fn run<M: CompletionModel + Clone>(
    agent: &rig::agent::Agent<M>,
    client: &BrowserDriverClient,
    max_steps: u32,
) -> RuntimeResult<ExplorationOutcome> {
    let mut steps = Vec::new();
    let mut history: Vec<Message> = Vec::new();
    let mut consecutive_empty = 0u32;
    let mut consecutive_send_failures = 0u32;

    for step in 1..=max_steps {
        let before = capture_state(client, &format!("step_{step}_before.png")).await?;

        let message = build_observation_message(step, &before.state, before.screenshot_base64.as_deref());

        let response = agent
            .completion(message.clone(), history.clone())
            .await
            .map(|builder| builder.tools(exploration_tools()))
            .map_err(|e| geminiloop_runtime::error::RuntimeError::Other(e.to_string()));

        let send_result = match response {
            Ok(builder) => builder.send().await,
            Err(e) => {
                consecutive_send_failures += 1;
                tracing::warn!(error = %e, "exploration turn failed to build");
                if consecutive_send_failures >= MAX_CONSECUTIVE_SEND_FAILURES {
                    return Ok(ExplorationOutcome {
                        steps,
                        stop_reason: StopReason::SendFailures,
                    });
                }
                continue;
            }
        };

        let completion = match send_result {
            Ok(completion) => {
                consecutive_send_failures = 0;
                completion
            }
            Err(e) => {
                consecutive_send_failures += 1;
                tracing::warn!(error = %e, "exploration completion call failed");
                if consecutive_send_failures >= MAX_CONSECUTIVE_SEND_FAILURES {
                    return Ok(ExplorationOutcome {
                        steps,
                        stop_reason: StopReason::SendFailures,
                    });
                }
                continue;
            }
        };

        let (reasoning, calls) = parse_response(&completion.choice);
        history.push(message);
        history.push(Message::Assistant {
            id: None,
            content: completion.choice.clone(),
        });

        if calls.is_empty() {
            consecutive_empty += 1;
            let _ = execute_tool(
                client,
                &ToolFunction::new(SAFE_DEFAULT_TOOL.to_string(), serde_json::json!({})),
            )
            .await;
            if consecutive_empty >= MAX_CONSECUTIVE_EMPTY {
                return Ok(ExplorationOutcome {
                    steps,
                    stop_reason: StopReason::EmptyResponses,
                });
            }
            continue;
        }
        consecutive_empty = 0;

        let first = &calls[0];
        let (tool_name, tool_result) = execute_tool(client, first).await;
        let finished = tool_name == "finish_exploration";

        tokio::time::sleep(SETTLE_DELAY).await;
        let after = capture_state(client, &format!("step_{step}_after.png")).await?;
        let verification = Verification::compute(&before.state, &after.state);

        let tool_result_text = serde_json::to_string(&tool_result).unwrap_or_else(|_| "ok".to_string());

        steps.push(ExplorationStep {
            step,
            tool: tool_name,
            args: first.arguments.clone(),
            reasoning,
            tool_result,
            before_state: before.state,
            after_state: after.state,
            verification,
        });

        // The preamble asks for exactly one action per turn; a model that
        // returns several anyway only has its first call executed (BEFORE
        // state is captured once, not once per call). Every tool_call still
        // needs a matching ToolResult for the provider's message protocol,
        // so the rest get an honest "not executed" result instead of a
        // fabricated success, or the next turn would reason about actions
        // that never touched the page.
        for (i, call) in calls.iter().enumerate() {
            let content = if i == 0 {
                tool_result_text.clone()
            } else {
                "not executed: only the first tool call in a turn is run".to_string()
            };
            history.push(Message::User {
                content: OneOrMany::one(UserContent::ToolResult(rig::message::ToolResult {
                    id: call.name.clone(),
                    call_id: None,
                    content: OneOrMany::one(rig::message::ToolResultContent::text(content)),
                })),
            });
        }

        if finished {
            return Ok(ExplorationOutcome {
                steps,
                stop_reason: StopReason::AgentFinished,
            });
        }
    }

    Ok(ExplorationOutcome {
        steps,
        stop_reason: StopReason::MaxStepsReached,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_strings_match_spec_vocabulary() {
        assert_eq!(StopReason::AgentFinished.as_str(), "agent_finished");
        assert_eq!(StopReason::MaxStepsReached.as_str(), "max_steps_reached");
        assert_eq!(StopReason::EmptyResponses.as_str(), "empty_responses");
        assert_eq!(StopReason::SendFailures.as_str(), "send_failures");
    }

    #[test]
    fn fallback_script_for_click_targets_the_selector() {
        let function = ToolFunction::new("click".to_string(), serde_json::json!({"selector": "#go"}));
        let script = fallback_script_for(&function);
        assert!(script.contains("#go"));
    }

    #[test]
    fn exploration_tools_include_finish_exploration() {
        let tools = exploration_tools();
        assert!(tools.iter().any(|t| t.name == "finish_exploration"));
    }
}
