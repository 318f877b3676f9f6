//! C6 — Browser driver client: newline-delimited JSON-RPC 2.0 over a
//! subprocess's stdio, via `rmcp`'s client + child-process transport (the
//! same crate the teacher's own coordination server speaks, here used from
//! the client side against an external headless-browser MCP server).
//!
//! `rmcp` already demultiplexes responses to pending-request futures keyed
//! by request id on a background reader task, so this wrapper only needs to
//! add per-tool timeout overrides and the defensive `result.result` unwrap.

use std::time::Duration;

use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use tokio::process::Command;

use crate::error::{RuntimeError, RuntimeResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(90);
const EVALUATE_TIMEOUT: Duration = Duration::from_secs(90);
const CONSOLE_TIMEOUT: Duration = Duration::from_secs(60);
const DISCONNECT_GRACE: Duration = Duration::from_secs(3);

fn timeout_for(tool: &str) -> Duration {
    match tool {
        "screenshot" => SCREENSHOT_TIMEOUT,
        "evaluate" => EVALUATE_TIMEOUT,
        "console_messages" => CONSOLE_TIMEOUT,
        _ => DEFAULT_TIMEOUT,
    }
}

#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

pub struct BrowserDriverClient {
    service: Option<RunningService<RoleClient, ()>>,
}

impl BrowserDriverClient {
    pub fn new() -> Self {
        Self { service: None }
    }

    /// Spawn the subprocess and complete the MCP `initialize` handshake.
    pub async fn connect(&mut self, command: &str, args: &[String]) -> RuntimeResult<()> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| RuntimeError::TransportError(format!("spawn failed: {e}")))?;

        let service = ().serve(transport).await.map_err(|e| {
            RuntimeError::TransportError(format!("initialize handshake failed: {e}"))
        })?;
        self.service = Some(service);
        Ok(())
    }

    /// Call a tool with the default or operation-specific timeout. A timeout
    /// only fails this call — the subprocess and pending-unrelated futures
    /// are left alone.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> RuntimeResult<ToolCallOutcome> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| RuntimeError::TransportError("not connected".into()))?;

        let arguments = match args {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(RuntimeError::ProtocolShape {
                    component: "browser_driver".into(),
                    detail: format!("tool args must be an object, got {other}"),
                })
            }
        };

        let param = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
            task: None,
        };

        let timeout = timeout_for(name);
        let call = service.peer().call_tool(param);
        let outcome = tokio::time::timeout(timeout, call).await.map_err(|_| RuntimeError::Timeout {
            operation: format!("browser_driver.{name}"),
            elapsed_ms: timeout.as_millis() as u64,
        })?;

        match outcome {
            Ok(result) => Ok(unwrap_tool_result(result)),
            Err(e) => Ok(ToolCallOutcome {
                success: false,
                result: None,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Best-effort graceful shutdown, then let `rmcp`'s drop guard SIGTERM
    /// (and eventually SIGKILL) the child if it hasn't exited within the
    /// grace period.
    pub async fn disconnect(&mut self) {
        if let Some(service) = self.service.take() {
            let cancelled = tokio::time::timeout(DISCONNECT_GRACE, service.cancel()).await;
            if cancelled.is_err() {
                tracing::warn!("browser driver did not shut down within grace period");
            }
        }
    }
}

impl Default for BrowserDriverClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `tools/call` results are double-wrapped: the useful payload lives under
/// `result.result`. Unwrap defensively rather than assuming the shape.
fn unwrap_tool_result(result: rmcp::model::CallToolResult) -> ToolCallOutcome {
    if result.is_error.unwrap_or(false) {
        let message = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("; ");
        return ToolCallOutcome {
            success: false,
            result: None,
            error: Some(message),
        };
    }

    let structured = result.structured_content.clone();
    let inner = structured
        .as_ref()
        .and_then(|v| v.get("result"))
        .cloned()
        .or(structured);

    ToolCallOutcome {
        success: true,
        result: inner,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_for_screenshot_is_extended() {
        assert_eq!(timeout_for("screenshot"), SCREENSHOT_TIMEOUT);
        assert_eq!(timeout_for("navigate"), DEFAULT_TIMEOUT);
        assert_eq!(timeout_for("console_messages"), CONSOLE_TIMEOUT);
    }

    #[test]
    fn unwrap_strips_double_wrapping() {
        let result = rmcp::model::CallToolResult {
            content: vec![],
            structured_content: Some(serde_json::json!({"result": {"value": 42}})),
            is_error: Some(false),
            meta: None,
        };
        let outcome = unwrap_tool_result(result);
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(serde_json::json!({"value": 42})));
    }

    #[test]
    fn unwrap_surfaces_error_flag() {
        let result = rmcp::model::CallToolResult {
            content: vec![],
            structured_content: None,
            is_error: Some(true),
            meta: None,
        };
        let outcome = unwrap_tool_result(result);
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn call_tool_without_connect_errors() {
        let client = BrowserDriverClient::new();
        let result = client.call_tool("navigate", serde_json::json!({})).await;
        assert!(matches!(result, Err(RuntimeError::TransportError(_))));
    }
}
