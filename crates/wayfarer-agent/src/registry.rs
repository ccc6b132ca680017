//! Tool handler trait and the validating registry.
//!
//! The registry is built once at startup and immutable afterwards. Tool
//! dispatch never fails the session: an unknown tool name, arguments
//! that violate the tool's schema, or a handler error all become
//! tool-result content that is fed back to the model so it can
//! self-correct on its next turn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::types::ToolDefinition;

/// Fixed reply for a tool name the model invented. Instructs the model
/// to retry rather than killing the session.
pub const BAD_TOOL_NAME_REPLY: &str = "bad tool name, retry";

// ---------------------------------------------------------------------------
// Tool handler trait
// ---------------------------------------------------------------------------

/// A named external capability the model may invoke.
///
/// Implementations live outside the core (search-backed finders, etc.);
/// the runtime only sees this trait.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool's name, description, and input schema, exposed to the
    /// model and used for argument validation.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON arguments.
    ///
    /// Errors are caught by the dispatcher and turned into result
    /// content -- a handler failure never terminates a session.
    async fn invoke(&self, arguments: Value) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Entry for one registered tool: its handler plus the compiled schema.
struct RegisteredTool {
    handler: Arc<dyn ToolHandler>,
    definition: ToolDefinition,
    schema: JSONSchema,
}

/// Static mapping from tool name to handler, built once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Build a registry from a set of handlers, compiling each tool's
    /// input schema up front.
    pub fn new(handlers: Vec<Arc<dyn ToolHandler>>) -> Result<Self> {
        let mut tools = HashMap::with_capacity(handlers.len());

        for handler in handlers {
            let definition = handler.definition();
            let schema = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&definition.input_schema)
                .map_err(|e| AgentError::ToolExecutionFailed {
                    tool_name: definition.name.clone(),
                    reason: format!("invalid input schema: {e}"),
                })?;

            debug!(tool = %definition.name, "tool registered");
            tools.insert(
                definition.name.clone(),
                RegisteredTool {
                    handler,
                    definition,
                    schema,
                },
            );
        }

        Ok(Self { tools })
    }

    /// All tool definitions, for handing to the deciding model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Dispatch one tool call, returning the content for its result
    /// message. This is infallible by design: every failure mode is
    /// rendered into the returned string.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "model requested unknown tool");
            return BAD_TOOL_NAME_REPLY.to_owned();
        };

        // Validate against the declared schema before touching the handler.
        if let Err(errors) = tool.schema.validate(arguments) {
            let detail: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            warn!(tool = %name, "tool arguments failed validation");
            return format!("invalid arguments for `{name}`: {}", detail.join(", "));
        }

        match tool.handler.invoke(arguments.clone()).await {
            Ok(value) => match value {
                Value::String(s) => s,
                other => other.to_string(),
            },
            Err(e) => {
                warn!(tool = %name, error = %e, "tool execution failed");
                format!("tool `{name}` failed: {e}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
