//! C9 — Patch Planner: turns a failed `EvaluationResult` into a structured
//! `PatchPlan` with no LLM call. Deterministic given the same evaluation,
//! grounded on the same severity-prioritized, budget-bounded summarization
//! shape the teacher uses to turn raw signals into an actionable brief.

use std::collections::BTreeMap;

use geminiloop_runtime::rubric::{EvaluationIssue, EvaluationResult, Severity};

use crate::codegen::{PatchAction, PatchFile, PatchPlan};

const CATCH_ALL_PATH: &str = "index.html";

/// Derive a `PatchPlan` from `evaluation`. Caller is expected to only call
/// this when `evaluation.score < 70`; the function itself doesn't gate on
/// that since it's a pure transform of whatever issues are present.
pub fn plan_patch(evaluation: &EvaluationResult) -> PatchPlan {
    let mut issues: Vec<&EvaluationIssue> = evaluation.issues.iter().collect();
    issues.sort_by_key(|issue| severity_rank(issue.severity));

    let mut by_path: BTreeMap<String, Vec<&EvaluationIssue>> = BTreeMap::new();
    for issue in &issues {
        let path = guess_path(issue);
        by_path.entry(path).or_default().push(issue);
    }

    let files = by_path
        .into_iter()
        .map(|(path, issues)| {
            let description = issues
                .iter()
                .map(|i| format!("[{:?}] {}", i.severity, i.description))
                .collect::<Vec<_>>()
                .join("; ");
            let changes = issues
                .iter()
                .flat_map(|i| i.repro_steps.iter().cloned())
                .collect();
            PatchFile {
                path,
                action: PatchAction::Modify,
                description,
                changes,
            }
        })
        .collect();

    PatchPlan {
        instructions: build_instructions(&issues, &evaluation.fix_suggestions),
        files,
        original_score: evaluation.score,
        issues_count: evaluation.issues.len(),
        fix_suggestions_from_evaluator: evaluation.fix_suggestions.clone(),
    }
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
    }
}

/// Best-effort guess at which file an issue concerns: prefer a path-like
/// token in `screenshot_reference`, then one in `description`, else fall
/// back to a single catch-all file so every issue still lands somewhere.
fn guess_path(issue: &EvaluationIssue) -> String {
    if let Some(reference) = &issue.screenshot_reference {
        if let Some(path) = extract_path_token(reference) {
            return path;
        }
    }
    if let Some(path) = extract_path_token(&issue.description) {
        return path;
    }
    CATCH_ALL_PATH.to_string()
}

const KNOWN_EXTENSIONS: &[&str] = &[".html", ".css", ".js", ".json", ".png", ".svg"];

fn extract_path_token(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.' && c != '/' && c != '_' && c != '-'))
        .find(|word| KNOWN_EXTENSIONS.iter().any(|ext| word.ends_with(ext)))
        .map(|word| word.to_string())
}

fn build_instructions(issues: &[&EvaluationIssue], fix_suggestions: &[String]) -> String {
    let mut lines = Vec::new();
    if !fix_suggestions.is_empty() {
        lines.push("Apply the following fixes:".to_string());
        for suggestion in fix_suggestions {
            lines.push(format!("- {suggestion}"));
        }
    }
    if !issues.is_empty() {
        lines.push("Address the following issues, most severe first:".to_string());
        for issue in issues {
            lines.push(format!("- [{:?}/{}] {}", issue.severity, issue.category, issue.description));
        }
    }
    lines.join("\n")
}
