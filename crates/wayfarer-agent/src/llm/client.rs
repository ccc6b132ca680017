//! Model client abstraction and HTTP implementation.
//!
//! The session runtime needs two model capabilities: a *deciding* pass
//! that either answers in text or requests tool calls, and a
//! *transform* pass that rewrites content under a fixed instruction
//! (used once, to format the outgoing email). Both are synchronous
//! request/response -- no streaming.
//!
//! [`HttpModelClient`] targets any OpenAI-compatible Chat Completions
//! endpoint (OpenAI, Groq, Together, vLLM, Ollama, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::types::{Message, ModelResponse, Role, ToolCall, ToolDefinition};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default maximum tokens per response.
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A model that can drive the session loop.
///
/// Both methods fail with [`AgentError::ModelInvocationFailed`] on
/// transport or parse errors; retry policy belongs to the caller.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Given a conversation and the available tools, return the next
    /// assistant message -- either final text or a set of tool calls.
    async fn decide(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message>;

    /// Rewrite `content` under a fixed `instruction`, returning
    /// free-form text. Used for the pre-send formatting pass.
    async fn transform(&self, instruction: &str, content: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one Chat Completions endpoint.
///
/// Constructed explicitly and passed into [`HttpModelClient::new`] --
/// credentials are injected, never read from ambient process state.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.groq.com/openai/v1`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature, if the pass wants one.
    pub temperature: Option<f32>,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ModelConfig {
    /// Configuration for an OpenAI-compatible endpoint.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Builder: set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builder: set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Non-streaming Chat Completions client.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    config: ModelConfig,
    http: reqwest::Client,
}

impl HttpModelClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AgentError::ModelInvocationFailed {
                reason: "empty API key".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, http })
    }

    /// Build the JSON body for a Chat Completions request.
    fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages_to_wire(messages),
        });

        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }

        if !tools.is_empty() {
            body["tools"] = tools_to_wire(tools);
        }

        body
    }

    /// Send the request and parse the first choice.
    async fn send_request(&self, body: &Value) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AgentError::ModelInvocationFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], "sending model request");

        let resp = self.http.post(&url).headers(headers).json(body).send().await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::ModelInvocationFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::ModelInvocationFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value =
            serde_json::from_str(&text).map_err(|e| AgentError::ModelInvocationFailed {
                reason: format!("invalid JSON response: {e}"),
            })?;

        parse_response(&v)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn decide(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message> {
        let body = self.build_request_body(messages, tools);
        let response = self.send_request(&body).await?;
        Ok(response.into_message())
    }

    async fn transform(&self, instruction: &str, content: &str) -> Result<String> {
        let messages = [Message::system(instruction), Message::user(content)];
        let body = self.build_request_body(&messages, &[]);

        match self.send_request(&body).await? {
            ModelResponse::Text(text) => Ok(text),
            ModelResponse::ToolCalls(_) => Err(AgentError::ModelInvocationFailed {
                reason: "transform pass returned tool calls instead of text".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire conversion
// ---------------------------------------------------------------------------

/// Convert messages into the Chat Completions wire format.
///
/// System messages keep `role: "system"`, tool calls go into
/// `assistant.tool_calls` with stringified arguments, and tool results
/// use `role: "tool"` with a `tool_call_id`.
pub fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => {
                wire_messages.push(json!({
                    "role": "system",
                    "content": msg.content,
                }));
            }
            Role::User => {
                wire_messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                }));
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": msg.content,
                    }));
                } else {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();

                    let mut m = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });

                    if !msg.content.is_empty() {
                        m["content"] = json!(msg.content);
                    }

                    wire_messages.push(m);
                }
            }
            Role::Tool => {
                wire_messages.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id,
                    "content": msg.content,
                }));
            }
        }
    }

    wire_messages
}

/// Convert tool definitions into the Chat Completions wire format.
pub fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming Chat Completions response.
pub fn parse_response(v: &Value) -> Result<ModelResponse> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::ModelInvocationFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    // Tool calls take precedence over any accompanying text.
    if let Some(tool_calls_arr) = message["tool_calls"].as_array()
        && !tool_calls_arr.is_empty()
    {
        let calls: Result<Vec<ToolCall>> = tool_calls_arr
            .iter()
            .map(|tc| {
                let func = &tc["function"];
                let name = func["name"].as_str().unwrap_or_default().to_owned();
                let args_str = func["arguments"].as_str().unwrap_or("{}");
                let arguments: Value = serde_json::from_str(args_str).map_err(|e| {
                    AgentError::ModelInvocationFailed {
                        reason: format!("invalid JSON in tool call `{name}` arguments: {e}"),
                    }
                })?;

                Ok(ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_owned(),
                    name,
                    arguments,
                })
            })
            .collect();

        return Ok(ModelResponse::ToolCalls(calls?));
    }

    let content = message["content"].as_str().unwrap_or_default();
    Ok(ModelResponse::Text(content.to_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
