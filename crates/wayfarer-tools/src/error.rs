//! Error types for the tool handlers and the mailer.

use thiserror::Error;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Failures inside a tool handler or the SMTP mailer.
///
/// At the agent boundary these never fail a session: handler errors are
/// folded into tool-result content by the registry, and mailer errors
/// surface as retryable delivery failures.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A search backend request failed or returned a bad status.
    #[error("search failed: {reason}")]
    SearchFailed { reason: String },

    /// Tool call arguments did not match the expected shape.
    #[error("invalid arguments for `{tool_name}`: {reason}")]
    InvalidArguments {
        tool_name: &'static str,
        reason: String,
    },

    /// An SMTP step failed (connect, auth, or a rejected command).
    #[error("smtp failure: {reason}")]
    Smtp { reason: String },

    /// TCP connect, TLS handshake, or server response timed out.
    #[error("timed out after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// HTTP transport error from a search backend.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization failure for arguments or results.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    /// Map into the agent error space for a named tool.
    pub fn for_tool(self, tool_name: &str) -> wayfarer_agent::AgentError {
        wayfarer_agent::AgentError::ToolExecutionFailed {
            tool_name: tool_name.to_owned(),
            reason: self.to_string(),
        }
    }
}
