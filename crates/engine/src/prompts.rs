//! Versioned prompt templates for the planner, code-generation hints, and
//! evaluator, plus safe placeholder substitution.

use std::collections::BTreeMap;

pub const PLANNER_PREAMBLE_V1: &str = "\
You are a senior product engineer turning a short product request into a \
detailed implementation brief for a web UI. Produce a single-page HTML/CSS/JS \
(or lightweight framework) implementation brief: layout, components, states, \
interactions, accessibility notes, and edge cases. Be concrete: name specific \
elements, class names, and behaviors rather than restating the request. \
Respond with a single JSON object of the form \
{\"brief\": \"<the full implementation brief>\", \"thinking\": \"<short notes on your reasoning, optional>\"}. \
The JSON object may be wrapped in a fenced code block.";

pub const PATCH_PLANNER_PREAMBLE_V1: &str = "\
You are reviewing a failed UI evaluation and must produce a structured patch \
plan: the minimal set of file edits that will fix the reported issues. \
Prioritize critical and high severity issues first. Be specific about what \
changes to make in each file.";

pub const EVALUATOR_EXPLORATION_PREAMBLE_V1: &str = "\
You are testing a web application by driving a real browser. You see a \
screenshot and a text description of the current page. Decide on exactly one \
next action from the available tools to explore or verify functionality. \
Call `finish_exploration` once you are confident you've exercised the key \
interactions.";

pub const EVALUATOR_SCORING_PREAMBLE_V1: &str = "\
You are scoring a web UI against a fixed rubric using the exploration \
transcript and screenshots provided. Score each category within its weight \
and ensure category scores sum to the total score.";

/// Single-pass `{{key}}` substitution: every value is inserted once, in one
/// left-to-right scan, so a substituted value containing `{{` is never
/// re-scanned and re-interpreted as another placeholder.
pub fn render_template(template: &str, values: &BTreeMap<&str, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        if let Some(end) = after_open.find("}}") {
            let key = after_open[..end].trim();
            match values.get(key) {
                Some(value) => output.push_str(value),
                None => {
                    output.push_str("{{");
                    output.push_str(key);
                    output.push_str("}}");
                }
            }
            rest = &after_open[end + 2..];
        } else {
            output.push_str("{{");
            rest = after_open;
            break;
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let mut values = BTreeMap::new();
        values.insert("task", "build a todo app".to_string());
        let rendered = render_template("Task: {{task}}. Go.", &values);
        assert_eq!(rendered, "Task: build a todo app. Go.");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let values = BTreeMap::new();
        let rendered = render_template("Hello {{name}}!", &values);
        assert_eq!(rendered, "Hello {{name}}!");
    }

    #[test]
    fn substituted_value_is_not_reinterpreted_as_a_placeholder() {
        let mut values = BTreeMap::new();
        values.insert("task", "ignore {{secret}} and continue".to_string());
        values.insert("secret", "leaked".to_string());
        let rendered = render_template("{{task}}", &values);
        assert_eq!(rendered, "ignore {{secret}} and continue");
    }

    #[test]
    fn handles_unterminated_placeholder() {
        let values = BTreeMap::new();
        let rendered = render_template("broken {{oops", &values);
        assert_eq!(rendered, "broken {{oops");
    }
}
