//! C7 — Planner: one call to a "thinking" LLM that turns the user task into
//! a detailed implementation brief for the code generator.

use std::collections::BTreeMap;

use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::gemini;

use crate::config::LlmEndpoint;
use crate::json_extract::extract_json;
use crate::prompts::{self, render_template};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner LLM call failed: {0}")]
    Completion(String),
    #[error("planner returned an empty brief")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct PlanningBrief {
    pub text: String,
    pub thinking: Option<String>,
}

/// Pull `brief`/`thinking` out of the model's JSON response via the
/// recursive brace-matcher (spec.md §4.7 forbids a single non-greedy
/// regex here). Falls back to the raw response as the brief when no
/// balanced JSON object is found, so a model that ignores the
/// JSON-envelope instruction still produces a usable brief.
fn parse_brief(response: &str) -> PlanningBrief {
    match extract_json(response) {
        Some(value) => {
            let text = value
                .get("brief")
                .and_then(|v| v.as_str())
                .unwrap_or(response)
                .to_string();
            let thinking = value
                .get("thinking")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            PlanningBrief { text, thinking }
        }
        None => PlanningBrief {
            text: response.to_string(),
            thinking: None,
        },
    }
}

const BRIEF_TEMPLATE: &str = "\
Task: {{task}}
{{notes_section}}
Produce the implementation brief now.";

/// Runs the planner unless `notes` was supplied at the run-entry boundary,
/// in which case the notes are used verbatim as the brief and the LLM is
/// never called.
pub async fn plan(
    endpoint: &LlmEndpoint,
    task: &str,
    notes: Option<&str>,
) -> Result<PlanningBrief, PlannerError> {
    if let Some(notes) = notes {
        return Ok(PlanningBrief {
            text: notes.to_string(),
            thinking: None,
        });
    }

    let client = gemini::Client::new(&endpoint.api_key)
        .map_err(|e| PlannerError::Completion(e.to_string()))?;
    let agent = client
        .agent(&endpoint.model)
        .preamble(prompts::PLANNER_PREAMBLE_V1)
        .temperature(0.3)
        .build();

    let mut values = BTreeMap::new();
    values.insert("task", task.to_string());
    values.insert("notes_section", String::new());
    let prompt_text = render_template(BRIEF_TEMPLATE, &values);

    let response = agent
        .prompt(prompt_text.as_str())
        .await
        .map_err(|e| PlannerError::Completion(e.to_string()))?;

    if response.trim().is_empty() {
        return Err(PlannerError::EmptyResponse);
    }

    Ok(parse_brief(&response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notes_skip_the_planner_entirely() {
        let endpoint = LlmEndpoint {
            api_key: String::new(),
            model: "unused".to_string(),
        };
        let brief = plan(&endpoint, "build a todo app", Some("use a kanban layout"))
            .await
            .unwrap();
        assert_eq!(brief.text, "use a kanban layout");
        assert!(brief.thinking.is_none());
    }

    #[test]
    fn parse_brief_extracts_fenced_json_with_thinking() {
        let response = "Sure thing:\n```json\n{\"brief\": \"a kanban board\", \"thinking\": \"kanban fits task management\"}\n```\n";
        let brief = parse_brief(response);
        assert_eq!(brief.text, "a kanban board");
        assert_eq!(brief.thinking.as_deref(), Some("kanban fits task management"));
    }

    #[test]
    fn parse_brief_falls_back_to_raw_text_when_unparseable() {
        let response = "just a plain-text brief, no JSON here";
        let brief = parse_brief(response);
        assert_eq!(brief.text, response);
        assert!(brief.thinking.is_none());
    }
}
