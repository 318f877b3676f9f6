//! Shared evaluation data model: rubric weights, browser observation
//! snapshots, and the exploration-step trace produced by the agentic
//! evaluator loop (C10). Lives in `runtime` rather than `engine` because
//! C4 (artifacts) and C5 (run state) both need to serialize these types
//! without depending on the engine crate's rig/LLM machinery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category weights; `sum(RUBRIC_WEIGHTS.values()) == 100`.
pub const RUBRIC_VERSION: &str = "1.0";

pub fn rubric_weights() -> BTreeMap<&'static str, u32> {
    BTreeMap::from([
        ("functionality", 25),
        ("visual_design", 25),
        ("ux", 15),
        ("accessibility", 15),
        ("responsiveness", 15),
        ("robustness", 5),
    ])
}

pub const PASS_THRESHOLD: i64 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationIssue {
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub repro_steps: Vec<String>,
    pub screenshot_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: i64,
    pub passed: bool,
    pub category_scores: BTreeMap<String, i64>,
    pub issues: Vec<EvaluationIssue>,
    pub fix_suggestions: Vec<String>,
    pub feedback: String,
    pub observations: BrowserObservation,
}

impl EvaluationResult {
    /// Recompute `score`/`passed` from `category_scores`, clamping each
    /// category into `[0, weight]` per the spec invariant (score ==
    /// sum(category_scores), passed == score >= 70).
    pub fn normalize(mut self) -> Self {
        let weights = rubric_weights();
        for (name, weight) in &weights {
            let entry = self.category_scores.entry((*name).to_string()).or_insert(0);
            *entry = (*entry).clamp(0, *weight as i64);
        }
        self.score = self.category_scores.values().sum();
        self.passed = self.score >= PASS_THRESHOLD;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveTarget {
    pub selector: String,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    pub target_type: Option<String>,
}

/// One snapshot of the page taken before or after an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserState {
    pub screenshot_path: Option<String>,
    pub visible_text: String,
    pub interactive_targets: Vec<InteractiveTarget>,
    pub console_errors: Vec<String>,
    pub dom_signature: String,
    pub url: String,
    pub dialogs: Vec<String>,
}

impl BrowserState {
    pub const MAX_VISIBLE_TEXT: usize = 1500;
    pub const MAX_TARGETS: usize = 15;

    /// Truncate `visible_text` to the byte budget on a char boundary and cap
    /// `interactive_targets` to the top-salience slice the caller already
    /// ranked.
    pub fn clamp(mut self) -> Self {
        if self.visible_text.len() > Self::MAX_VISIBLE_TEXT {
            let mut end = Self::MAX_VISIBLE_TEXT;
            while !self.visible_text.is_char_boundary(end) {
                end -= 1;
            }
            self.visible_text.truncate(end);
        }
        self.interactive_targets.truncate(Self::MAX_TARGETS);
        self
    }

    /// Stable 16-hex digest of the fields that define "the page changed":
    /// visible text, element count, and URL.
    pub fn compute_dom_signature(visible_text: &str, element_count: usize, url: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(visible_text.as_bytes());
        hasher.update(&(element_count as u64).to_le_bytes());
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        digest.to_hex()[..16].to_string()
    }
}

/// Deltas between a before/after `BrowserState` pair, proving an action had
/// (or didn't have) effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub dom_changed: bool,
    pub text_changed: bool,
    pub url_changed: bool,
    pub new_console_errors: Vec<String>,
    pub new_dialogs: Vec<String>,
}

impl Verification {
    pub fn compute(before: &BrowserState, after: &BrowserState) -> Self {
        let new_console_errors = after
            .console_errors
            .iter()
            .filter(|e| !before.console_errors.contains(e))
            .cloned()
            .collect();
        let new_dialogs = after
            .dialogs
            .iter()
            .filter(|d| !before.dialogs.contains(d))
            .cloned()
            .collect();
        Self {
            dom_changed: before.dom_signature != after.dom_signature,
            text_changed: before.visible_text != after.visible_text,
            url_changed: before.url != after.url,
            new_console_errors,
            new_dialogs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationStep {
    pub step: u32,
    pub tool: String,
    pub args: serde_json::Value,
    pub reasoning: String,
    pub tool_result: serde_json::Value,
    pub before_state: BrowserState,
    pub after_state: BrowserState,
    pub verification: Verification,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrowserObservation {
    pub desktop_screenshot: Option<String>,
    pub mobile_screenshot: Option<String>,
    pub console_errors: Vec<String>,
    pub dom_snapshot: Option<String>,
    pub interactions_performed: Vec<String>,
    pub interaction_results: BTreeMap<String, bool>,
    pub exploration_steps: Vec<ExplorationStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_100() {
        let total: u32 = rubric_weights().values().sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn normalize_clamps_and_recomputes_score() {
        let mut categories = BTreeMap::new();
        categories.insert("functionality".to_string(), 999);
        categories.insert("visual_design".to_string(), -5);
        let result = EvaluationResult {
            score: 0,
            passed: false,
            category_scores: categories,
            issues: vec![],
            fix_suggestions: vec![],
            feedback: String::new(),
            observations: BrowserObservation::default(),
        }
        .normalize();
        assert_eq!(result.category_scores["functionality"], 25);
        assert_eq!(result.category_scores["visual_design"], 0);
        assert_eq!(result.score, 25);
        assert!(!result.passed);
    }

    #[test]
    fn verification_detects_dom_change() {
        let before = BrowserState {
            screenshot_path: None,
            visible_text: "hello".into(),
            interactive_targets: vec![],
            console_errors: vec![],
            dom_signature: "aaaa".into(),
            url: "http://localhost/".into(),
            dialogs: vec![],
        };
        let mut after = before.clone();
        after.dom_signature = "bbbb".into();
        after.console_errors = vec!["TypeError".into()];
        let verification = Verification::compute(&before, &after);
        assert!(verification.dom_changed);
        assert!(!verification.text_changed);
        assert_eq!(verification.new_console_errors, vec!["TypeError".to_string()]);
    }

    #[test]
    fn clamp_truncates_on_char_boundary() {
        let long = "a".repeat(2000);
        let state = BrowserState {
            screenshot_path: None,
            visible_text: long,
            interactive_targets: (0..20)
                .map(|i| InteractiveTarget {
                    selector: format!("#el{i}"),
                    tag: "button".into(),
                    role: None,
                    text: String::new(),
                    target_type: None,
                })
                .collect(),
            console_errors: vec![],
            dom_signature: "x".into(),
            url: "http://localhost/".into(),
            dialogs: vec![],
        }
        .clamp();
        assert_eq!(state.visible_text.len(), BrowserState::MAX_VISIBLE_TEXT);
        assert_eq!(state.interactive_targets.len(), BrowserState::MAX_TARGETS);
    }
}
