//! Agent core for Wayfarer.
//!
//! This crate implements the engine of the travel agent: a per-session
//! state machine that alternates between asking a model what to do next
//! and executing the tool calls it requests, then pauses at a durable
//! approval gate before the one irreversible action (sending an email).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  decide   ┌─────────────────┐
//! │ Deciding │──────────>│ ExecutingTools  │
//! └────┬─────┘<──────────└─────────────────┘
//!      │ no tool calls        tool results
//!      v
//! ┌──────────────────┐  approve (email)  ┌───────────┐
//! │ AwaitingApproval │──────────────────>│ Finalized │
//! └──────────────────┘      reject       └───────────┘
//! ```
//!
//! Every transition is checkpointed through `wayfarer-store`, so the
//! approval gate survives process restarts: a human can release the
//! session from a different process hours later.
//!
//! ## Modules
//!
//! - [`llm`] -- model client trait, wire types, and the HTTP client.
//! - [`registry`] -- tool handler trait and the validating registry.
//! - [`session`] -- session and state model.
//! - [`machine`] -- the session runtime (start / advance / approve / reject).
//! - [`prompts`] -- fixed system instructions for the two model passes.
//! - [`error`] -- agent error types.

pub mod error;
pub mod llm;
pub mod machine;
pub mod prompts;
pub mod registry;
pub mod session;

// Re-export the most commonly used types at the crate root.
pub use error::{AgentError, Result};
pub use llm::{
    HttpModelClient, Message, ModelClient, ModelConfig, ModelResponse, Role, ToolCall,
    ToolDefinition,
};
pub use machine::{RuntimeConfig, SessionRuntime, SideEffectExecutor};
pub use registry::{ToolHandler, ToolRegistry};
pub use session::{DeliveryParams, Session, SessionState};
