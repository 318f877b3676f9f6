//! Scoring phase (spec.md §4.10): one call to the evaluator LLM with the
//! task, rubric, exploration log, dialog/console reports, and both
//! screenshots. The response is parsed with the same recursive
//! brace-matcher C7 uses, then validated so `sum(category_scores) == score`
//! and each category stays within its weight — `EvaluationResult::normalize`
//! already enforces that by construction, so a rubric violation is
//! detected by comparing the raw response against its normalized form and
//! surfaced as a warning rather than silently eaten.

use geminiloop_runtime::rubric::{
    rubric_weights, BrowserObservation, EvaluationIssue, EvaluationResult,
};
use rig::completion::{CompletionModel, Prompt};

use crate::json_extract::extract_json;

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring LLM call failed: {0}")]
    Completion(String),
    #[error("scoring response did not contain a parseable JSON object")]
    Unparseable,
}

pub struct ScoringOutcome {
    pub result: EvaluationResult,
    /// Set when the raw response violated the rubric invariant and had to
    /// be clamped deterministically rather than matching exactly.
    pub rubric_violation_warning: Option<String>,
}

pub fn build_scoring_prompt(task: &str, exploration_summary: &str, dialog_report: &str, console_report: &str) -> String {
    let weights = rubric_weights();
    format!(
        "Task: {task}\n\nRubric weights (sum 100, passing threshold 70): {weights:?}\n\nExploration log:\n{exploration_summary}\n\nDialog report: {dialog_report}\nConsole report: {console_report}\n\nRespond with a single JSON object: {{\"score\": int, \"category_scores\": {{...}}, \"issues\": [...], \"fix_suggestions\": [...], \"feedback\": str}}."
    )
}

pub async fn score<M: CompletionModel>(
    agent: &rig::agent::Agent<M>,
    task: &str,
    observations: BrowserObservation,
    exploration_summary: &str,
    dialog_report: &str,
    console_report: &str,
) -> Result<ScoringOutcome, ScoringError> {
    let prompt = build_scoring_prompt(task, exploration_summary, dialog_report, console_report);
    let response = agent
        .prompt(prompt.as_str())
        .await
        .map_err(|e| ScoringError::Completion(e.to_string()))?;

    parse_scoring_response(&response, observations)
}

pub fn parse_scoring_response(
    response: &str,
    observations: BrowserObservation,
) -> Result<ScoringOutcome, ScoringError> {
    let value = extract_json(response).ok_or(ScoringError::Unparseable)?;

    let category_scores: std::collections::BTreeMap<String, i64> = value
        .get("category_scores")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    let issues: Vec<EvaluationIssue> = value
        .get("issues")
        .cloned()
        .map(|v| serde_json::from_value(v).unwrap_or_default())
        .unwrap_or_default();

    let fix_suggestions: Vec<String> = value
        .get("fix_suggestions")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let feedback = value.get("feedback").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let reported_score = value.get("score").and_then(|v| v.as_i64()).unwrap_or(0);

    let raw = EvaluationResult {
        score: reported_score,
        passed: false,
        category_scores,
        issues,
        fix_suggestions,
        feedback,
        observations,
    };

    let normalized = raw.clone().normalize();
    let warning = if normalized.score != reported_score {
        Some(format!(
            "rubric violation: model reported score {reported_score} but category_scores summed to {}; clamped deterministically",
            normalized.score
        ))
    } else {
        None
    };

    Ok(ScoringOutcome {
        result: normalized,
        rubric_violation_warning: warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_scoring_response() {
        let response = r#"{"score": 80, "category_scores": {"functionality": 25, "visual_design": 20, "ux": 15, "accessibility": 10, "responsiveness": 10, "robustness": 0}, "issues": [], "fix_suggestions": [], "feedback": "solid"}"#;
        let outcome = parse_scoring_response(response, BrowserObservation::default()).unwrap();
        assert_eq!(outcome.result.score, 80);
        assert!(outcome.rubric_violation_warning.is_none());
    }

    #[test]
    fn clamps_and_warns_on_rubric_violation() {
        let response = r#"{"score": 999, "category_scores": {"functionality": 999}, "issues": [], "fix_suggestions": [], "feedback": "bad"}"#;
        let outcome = parse_scoring_response(response, BrowserObservation::default()).unwrap();
        assert_eq!(outcome.result.category_scores["functionality"], 25);
        assert!(outcome.rubric_violation_warning.is_some());
    }

    #[test]
    fn unparseable_response_is_an_error() {
        let result = parse_scoring_response("not json", BrowserObservation::default());
        assert!(matches!(result, Err(ScoringError::Unparseable)));
    }
}
