//! Recursive brace-matching JSON extraction from LLM output.
//!
//! LLM responses routinely wrap JSON in fenced code blocks or surrounding
//! prose; a single non-greedy regex can't handle nested braces inside
//! string values, so this walks the text byte-by-byte tracking brace
//! depth and string/escape state instead.

use serde_json::Value;

/// Find the first top-level `{...}` or `[...]` span in `text` (skipping
/// fenced code block markers) and parse it as JSON. Returns `None` if no
/// balanced span parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_fences(text);
    let brace_start = cleaned.find('{');
    let bracket_start = cleaned.find('[');

    let brackets = match (brace_start, bracket_start) {
        (Some(b), Some(k)) if k < b => ('[', ']'),
        (Some(_), _) => ('{', '}'),
        (None, Some(_)) => ('[', ']'),
        (None, None) => return None,
    };

    let span = find_balanced_span(cleaned, brackets.0, brackets.1)?;
    serde_json::from_str(span).ok()
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        return rest.trim_end_matches("```").trim();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        return rest.trim_end_matches("```").trim();
    }
    trimmed
}

/// Scan for the first `open` character, then track nesting depth while
/// respecting string literals and escape sequences so braces inside
/// string values don't throw off the count.
fn find_balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(open)?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return std::str::from_utf8(&bytes[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let text = "Here's the plan:\n```json\n{\"task\": \"build a form\"}\n```\nLet me know.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["task"], "build a form");
    }

    #[test]
    fn extracts_with_surrounding_prose_and_nested_braces() {
        let text = r#"Sure, here it is: {"files": [{"path": "a.rs", "nested": {"x": 1}}]} thanks!"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["files"][0]["nested"]["x"], 1);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_depth_tracking() {
        let text = r#"{"message": "use { and } carefully", "ok": true}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn returns_none_for_unbalanced_input() {
        let text = "not json at all { incomplete";
        assert!(extract_json(text).is_none());
    }

    #[test]
    fn extracts_top_level_array() {
        let text = "steps: [1, 2, {\"nested\": true}, 3]";
        let value = extract_json(text).unwrap();
        assert!(value.is_array());
    }
}
