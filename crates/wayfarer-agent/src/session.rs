//! Session and state model.
//!
//! A session is one end-to-end interaction: initial query, the
//! decide/execute loop, the approval gate, and a terminal outcome.
//! The session exclusively owns its conversation; the checkpoint store
//! holds a durable copy but never mutates it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::llm::types::Message;
use wayfarer_store::CheckpointRecord;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The model decides the next action (initial state).
    Deciding,
    /// Tool calls from the last assistant message are being executed.
    ExecutingTools,
    /// Paused at the approval gate; only `approve` or `reject` move on.
    AwaitingApproval,
    /// Terminal. Either delivered, rejected, or failed.
    Finalized,
}

impl SessionState {
    /// Stable string form, matching what the checkpoint schema stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deciding => "deciding",
            Self::ExecutingTools => "executing_tools",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Finalized => "finalized",
        }
    }

    /// Parse the stored string form back into a state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deciding" => Some(Self::Deciding),
            "executing_tools" => Some(Self::ExecutingTools),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery parameters
// ---------------------------------------------------------------------------

/// Side-channel configuration for the email dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryParams {
    /// Sender address.
    pub sender: String,
    /// Recipient address.
    pub recipient: String,
    /// Email subject line.
    pub subject: String,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One end-to-end interaction, from initial query to finalized outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier (UUID v7).
    pub id: String,

    /// Ordered, append-only conversation history.
    pub messages: Vec<Message>,

    /// Current machine state.
    pub state: SessionState,

    /// Default delivery parameters attached at session start, if any.
    /// `approve` may override them per call.
    pub delivery: Option<DeliveryParams>,

    /// Error marker set when the session is forced to `Finalized`.
    pub error: Option<String>,
}

impl Session {
    /// Create a fresh session in `Deciding` with one user message.
    pub fn new(initial_user_text: impl Into<String>, delivery: Option<DeliveryParams>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            messages: vec![Message::user(initial_user_text)],
            state: SessionState::Deciding,
            delivery,
            error: None,
        }
    }

    /// The last assistant message, if the model has spoken yet.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::Assistant)
    }

    /// Text content of the last assistant message.
    pub fn last_assistant_content(&self) -> Option<String> {
        self.last_assistant().map(|m| m.content.clone())
    }

    /// Serialize into a checkpoint record.
    pub fn to_checkpoint(&self) -> Result<CheckpointRecord> {
        Ok(CheckpointRecord {
            session_id: self.id.clone(),
            state: self.state.as_str().to_owned(),
            conversation: serde_json::to_string(&self.messages)?,
            delivery: self
                .delivery
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            error: self.error.clone(),
            updated_at: 0,
        })
    }

    /// Rebuild a session from its checkpoint record.
    pub fn from_checkpoint(record: &CheckpointRecord) -> Result<Self> {
        let state = SessionState::parse(&record.state).ok_or_else(|| {
            AgentError::CorruptCheckpoint {
                session_id: record.session_id.clone(),
                reason: format!("unknown state `{}`", record.state),
            }
        })?;

        Ok(Self {
            id: record.session_id.clone(),
            messages: serde_json::from_str(&record.conversation)?,
            state,
            delivery: record
                .delivery
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error: record.error.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
