//! State capture (spec.md §4.10 step 1 / exploration loop BEFORE/AFTER):
//! a single `evaluate` probe collects visible text, element count, and URL;
//! `screenshot` and `console_messages` are separate C6 calls. Coercion
//! rules for `visible_text` follow spec.md §4.10 verbatim: list -> first 50
//! joined, dict -> JSON string, null -> "".

use geminiloop_runtime::browser::BrowserDriverClient;
use geminiloop_runtime::error::RuntimeResult;
use geminiloop_runtime::rubric::{BrowserState, InteractiveTarget};

use super::dialogs::read_dialogs;
use super::targets::{parse_targets, TARGET_DISCOVERY_SCRIPT};

pub const PAGE_PROBE_SCRIPT: &str = r#"
(() => ({
  visible_text: document.body ? document.body.innerText : '',
  element_count: document.querySelectorAll('*').length,
  url: window.location.href,
}))()
"#;

/// Coerce an arbitrary JSON value returned for "visible text" into the
/// string shape the rubric expects: a list becomes the first 50 items
/// joined with newlines, an object becomes its JSON text, null becomes "".
pub fn coerce_visible_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .take(50)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        object @ serde_json::Value::Object(_) => object.to_string(),
        other => other.to_string(),
    }
}

/// A `BrowserState` plus the raw screenshot payload needed to build a
/// multimodal observation message — kept alongside rather than inside
/// `BrowserState`, which only stores the artifact-relative path.
pub struct CapturedState {
    pub state: BrowserState,
    pub screenshot_base64: Option<String>,
}

/// Browser-driver screenshot results carry the image under one of a few
/// plausible keys depending on the MCP server; try each rather than assuming
/// one shape.
fn extract_screenshot_base64(value: &serde_json::Value) -> Option<String> {
    value
        .get("base64")
        .or_else(|| value.get("data"))
        .or_else(|| value.get("image"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Capture a full `BrowserState` snapshot: screenshot, probed text/url/
/// element-count, ranked interactive targets, console errors, and the
/// current dialog recorder contents.
pub async fn capture_state(
    client: &BrowserDriverClient,
    screenshot_relative_path: &str,
) -> RuntimeResult<CapturedState> {
    let screenshot = client
        .call_tool("screenshot", serde_json::json!({}))
        .await?;
    let screenshot_path = screenshot.success.then(|| screenshot_relative_path.to_string());
    let screenshot_base64 = screenshot.result.as_ref().and_then(extract_screenshot_base64);

    let probe = client
        .call_tool("evaluate", serde_json::json!({ "script": PAGE_PROBE_SCRIPT }))
        .await?;
    let probe_value = probe.result.unwrap_or(serde_json::Value::Null);
    let visible_text = coerce_visible_text(probe_value.get("visible_text").unwrap_or(&serde_json::Value::Null));
    let element_count = probe_value
        .get("element_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;
    let url = probe_value
        .get("url")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let targets_outcome = client
        .call_tool("evaluate", serde_json::json!({ "script": TARGET_DISCOVERY_SCRIPT }))
        .await?;
    let interactive_targets: Vec<InteractiveTarget> = targets_outcome
        .result
        .map(|v| parse_targets(&v))
        .unwrap_or_default();

    let console = client
        .call_tool("console_messages", serde_json::json!({}))
        .await?;
    let console_errors: Vec<String> = console
        .result
        .map(|v| serde_json::from_value(v).unwrap_or_default())
        .unwrap_or_default();

    let dialogs = read_dialogs(client).await?;

    let dom_signature = BrowserState::compute_dom_signature(&visible_text, element_count, &url);

    Ok(CapturedState {
        state: BrowserState {
            screenshot_path,
            visible_text,
            interactive_targets,
            console_errors,
            dom_signature,
            url,
            dialogs,
        }
        .clamp(),
        screenshot_base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_list_to_first_fifty_joined() {
        let value = serde_json::json!(["a", "b", "c"]);
        assert_eq!(coerce_visible_text(&value), "a\nb\nc");
    }

    #[test]
    fn coerces_object_to_json_string() {
        let value = serde_json::json!({"x": 1});
        assert_eq!(coerce_visible_text(&value), r#"{"x":1}"#);
    }

    #[test]
    fn coerces_null_to_empty_string() {
        assert_eq!(coerce_visible_text(&serde_json::Value::Null), "");
    }

    #[test]
    fn truncates_list_to_fifty_items() {
        let items: Vec<serde_json::Value> = (0..100).map(|i| serde_json::json!(format!("item{i}"))).collect();
        let value = serde_json::Value::Array(items);
        let text = coerce_visible_text(&value);
        assert_eq!(text.lines().count(), 50);
    }
}
