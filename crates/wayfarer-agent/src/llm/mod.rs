//! Model integration layer.
//!
//! - [`types`] -- conversation data types (messages, tool calls).
//! - [`client`] -- the [`ModelClient`] trait and an OpenAI-compatible
//!   HTTP implementation.

pub mod client;
pub mod types;

// Re-export the most commonly used types for convenience.
pub use client::{HttpModelClient, ModelClient, ModelConfig};
pub use types::{Message, ModelResponse, Role, ToolCall, ToolDefinition};
