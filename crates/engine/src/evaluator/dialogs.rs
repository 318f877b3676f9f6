//! Dialog-wrapper injection (spec.md §4.10 step 2): replaces
//! `window.alert/confirm/prompt` and `onbeforeunload` with no-op recorders
//! so native dialogs never block the exploration loop, and every dialog
//! attempt is still observable on the page-global recorder array.

use geminiloop_runtime::browser::BrowserDriverClient;
use geminiloop_runtime::error::{RuntimeError, RuntimeResult};

pub const DIALOG_RECORDER_GLOBAL: &str = "__geminiloop_dialogs__";

pub const DIALOG_WRAPPER_SCRIPT: &str = r#"
(() => {
  if (window.__geminiloop_dialogs__) return 'already-installed';
  window.__geminiloop_dialogs__ = [];
  const record = (type, message) => {
    window.__geminiloop_dialogs__.push({ type, message, timestamp: Date.now() });
  };
  window.alert = (message) => { record('alert', String(message)); };
  window.confirm = (message) => { record('confirm', String(message)); return true; };
  window.prompt = (message) => { record('prompt', String(message)); return ''; };
  window.onbeforeunload = null;
  Object.defineProperty(window, 'onbeforeunload', {
    get() { return null; },
    set(_handler) { record('beforeunload', 'suppressed'); },
  });
  return 'installed';
})()
"#;

pub const DIALOG_READ_SCRIPT: &str = "window.__geminiloop_dialogs__ || []";

/// Install the wrapper once per observation run.
pub async fn inject(client: &BrowserDriverClient) -> RuntimeResult<()> {
    let outcome = client
        .call_tool("evaluate", serde_json::json!({ "script": DIALOG_WRAPPER_SCRIPT }))
        .await?;
    if !outcome.success {
        return Err(RuntimeError::Other(
            outcome.error.unwrap_or_else(|| "dialog wrapper injection failed".to_string()),
        ));
    }
    Ok(())
}

/// Read the recorder array, stringified for diffing between steps.
pub async fn read_dialogs(client: &BrowserDriverClient) -> RuntimeResult<Vec<String>> {
    let outcome = client
        .call_tool("evaluate", serde_json::json!({ "script": DIALOG_READ_SCRIPT }))
        .await?;
    let value = outcome.result.unwrap_or(serde_json::Value::Array(vec![]));
    let dialogs: Vec<serde_json::Value> = serde_json::from_value(value).unwrap_or_default();
    Ok(dialogs.into_iter().map(|d| d.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_script_guards_against_double_install() {
        assert!(DIALOG_WRAPPER_SCRIPT.contains("already-installed"));
    }

    #[test]
    fn read_script_defaults_to_empty_array() {
        assert!(DIALOG_READ_SCRIPT.contains("|| []"));
    }
}
