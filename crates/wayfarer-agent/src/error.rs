//! Agent error types.
//!
//! Errors that originate inside the model-driven tool loop (unknown
//! tool, bad arguments, handler failure) are *not* represented here:
//! they are fed back into the conversation as tool results so the model
//! can self-correct. [`AgentError`] covers only the conditions that
//! must reach the caller.

use thiserror::Error;

use crate::session::SessionState;

/// Unified error type for the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A model invocation failed -- transport error, timeout, or a
    /// response that could not be parsed. The session state is left
    /// untouched; the caller may retry.
    #[error("model invocation failed: {reason}")]
    ModelInvocationFailed { reason: String },

    /// The decide/execute loop exceeded the configured iteration bound.
    /// The session is forced to `Finalized` with an error marker.
    #[error("session {session_id} exceeded max iterations ({max_iterations})")]
    MaxIterationsExceeded {
        session_id: String,
        max_iterations: u32,
    },

    /// No session exists for the given id, in memory or in the
    /// checkpoint store.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The side-effect executor failed to deliver. The session stays in
    /// `AwaitingApproval`; a later `approve` may retry.
    #[error("delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    /// An operation was invoked in a state that does not permit it
    /// (e.g. `approve` before the session reaches the gate).
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A checkpoint record could not be turned back into a session.
    #[error("corrupt checkpoint for session {session_id}: {reason}")]
    CorruptCheckpoint { session_id: String, reason: String },

    /// Checkpoint persistence failed.
    #[error("store error: {0}")]
    Store(#[from] wayfarer_store::StoreError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A tool handler failed in a way it wants surfaced to its own
    /// caller (direct invocation, outside the self-correcting loop).
    #[error("tool `{tool_name}` failed: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::ModelInvocationFailed {
            reason: err.to_string(),
        }
    }
}
