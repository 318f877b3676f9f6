//! Error taxonomy for the runtime crate.
//!
//! Mirrors the policy in spec §7: the engine never crashes on a component
//! error, so every fallible runtime operation returns one of these variants
//! rather than an opaque string, letting the orchestrator match on kind to
//! decide recoverable-vs-fatal.

use std::path::PathBuf;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A write or resolved path escaped its configured root. Fatal at the
    /// boundary where it's detected.
    #[error("path escape: {attempted} is not within {root}")]
    PathEscape { attempted: PathBuf, root: PathBuf },

    /// A bounded operation exceeded its deadline. Recoverable at the
    /// component level; counted against the iteration budget.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// The browser driver subprocess connection was lost.
    #[error("browser driver transport lost: {0}")]
    TransportError(String),

    /// An external response (browser driver or LLM) had an unexpected
    /// shape. Soft-recoverable via defensive coercion at the call site.
    #[error("unexpected response shape from {component}: {detail}")]
    ProtocolShape { component: String, detail: String },

    /// score != sum(category_scores) or a category fell outside its weight.
    #[error("rubric violation: {0}")]
    RubricViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
