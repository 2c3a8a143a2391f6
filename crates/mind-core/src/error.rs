use thiserror::Error;

/// Unified error type for the Mind runtime.
#[derive(Error, Debug)]
pub enum MindError {
    // ── Lookup / validation errors ─────────────────────────────
    #[error("{0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    // ── Sandbox errors ─────────────────────────────────────────
    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Run errors ─────────────────────────────────────────────
    #[error("{0}")]
    ResourceLimitExceeded(String),

    #[error("model transport failure: {0}")]
    Transport(String),

    #[error("run cancelled")]
    Cancelled,

    // ── Infrastructure errors ──────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl MindError {
    /// Shorthand for a tool-level failure.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MindError>;
