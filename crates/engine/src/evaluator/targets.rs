//! Interactive-target discovery (spec.md §4.10): a page-side script run
//! through C6's `evaluate` tool, plus the Rust-side ranking that turns its
//! raw return value into the top-15 `InteractiveTarget` list.

use geminiloop_runtime::rubric::InteractiveTarget;
use serde::Deserialize;

/// Executed via the browser driver's `evaluate` tool. Walks all visible,
/// actionable elements and computes a stable selector per element with
/// priority `#id` -> `[data-testid=...]` -> `tag[aria-label=...]` ->
/// `tag[name=...]` -> `tag.firstClass`, returning raw candidates for Rust to
/// rank — ranking is done here, not in JS, so it stays testable without a
/// browser.
pub const TARGET_DISCOVERY_SCRIPT: &str = r#"
(() => {
  const actionable = ['a', 'button', 'input', 'select', 'textarea', '[role=button]', '[onclick]'];
  const nodes = Array.from(document.querySelectorAll(actionable.join(',')));
  const vh = window.innerHeight || 0;
  return nodes
    .filter((el) => {
      const rect = el.getBoundingClientRect();
      const style = window.getComputedStyle(el);
      return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
    })
    .map((el) => {
      let selector;
      if (el.id) {
        selector = `#${el.id}`;
      } else if (el.getAttribute('data-testid')) {
        selector = `[data-testid="${el.getAttribute('data-testid')}"]`;
      } else if (el.getAttribute('aria-label')) {
        selector = `${el.tagName.toLowerCase()}[aria-label="${el.getAttribute('aria-label')}"]`;
      } else if (el.getAttribute('name')) {
        selector = `${el.tagName.toLowerCase()}[name="${el.getAttribute('name')}"]`;
      } else if (el.classList.length > 0) {
        selector = `${el.tagName.toLowerCase()}.${el.classList[0]}`;
      } else {
        selector = el.tagName.toLowerCase();
      }
      const rect = el.getBoundingClientRect();
      return {
        selector,
        tag: el.tagName.toLowerCase(),
        role: el.getAttribute('role'),
        text: (el.textContent || el.value || '').trim().slice(0, 80),
        type: el.getAttribute('type'),
        has_id: Boolean(el.id),
        above_the_fold: rect.top < vh,
      };
    });
})()
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct RawTarget {
    pub selector: String,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    pub target_type: Option<String>,
    #[serde(default)]
    pub has_id: bool,
    #[serde(default)]
    pub above_the_fold: bool,
}

/// Rank `raw` by salience — {has-id, has-text, above-the-fold} — and keep
/// the top `InteractiveTarget::MAX_TARGETS` (15).
pub fn rank_targets(mut raw: Vec<RawTarget>) -> Vec<InteractiveTarget> {
    raw.sort_by_key(|t| std::cmp::Reverse(salience(t)));
    raw.into_iter()
        .take(geminiloop_runtime::rubric::BrowserState::MAX_TARGETS)
        .map(|t| InteractiveTarget {
            selector: t.selector,
            tag: t.tag,
            role: t.role,
            text: t.text,
            target_type: t.target_type,
        })
        .collect()
}

fn salience(t: &RawTarget) -> u8 {
    (t.has_id as u8) + (!t.text.is_empty() as u8) + (t.above_the_fold as u8)
}

/// Parse the raw JSON value returned by `evaluate(TARGET_DISCOVERY_SCRIPT)`.
pub fn parse_targets(value: &serde_json::Value) -> Vec<InteractiveTarget> {
    let raw: Vec<RawTarget> = serde_json::from_value(value.clone()).unwrap_or_default();
    rank_targets(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(selector: &str, has_id: bool, text: &str, above_the_fold: bool) -> RawTarget {
        RawTarget {
            selector: selector.to_string(),
            tag: "button".to_string(),
            role: None,
            text: text.to_string(),
            target_type: None,
            has_id,
            above_the_fold,
        }
    }

    #[test]
    fn ranks_by_salience_descending() {
        let raw = vec![
            target("button.generic", false, "", false),
            target("#submit", true, "Submit", true),
            target("[data-testid=x]", false, "Click me", false),
        ];
        let ranked = rank_targets(raw);
        assert_eq!(ranked[0].selector, "#submit");
    }

    #[test]
    fn caps_at_fifteen() {
        let raw: Vec<RawTarget> = (0..30)
            .map(|i| target(&format!("#el{i}"), true, "x", true))
            .collect();
        let ranked = rank_targets(raw);
        assert_eq!(ranked.len(), 15);
    }

    #[test]
    fn parses_evaluate_return_value() {
        let value = serde_json::json!([
            {"selector": "#a", "tag": "a", "role": null, "text": "Home", "type": null, "has_id": true, "above_the_fold": true}
        ]);
        let parsed = parse_targets(&value);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].selector, "#a");
    }
}
