//! The session runtime: decide, act, pause, finalize.
//!
//! Implements the loop that drives one travel-planning session. The
//! runtime asks the deciding model what to do next; when the model
//! responds with tool calls it executes them in request order and feeds
//! the results back. When the model answers in plain text the session
//! pauses at the approval gate, and only an explicit `approve` releases
//! the irreversible side effect (the email). Every transition is
//! checkpointed, so the pause is durable across process restarts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::llm::ModelClient;
use crate::llm::types::Message;
use crate::prompts::{EMAIL_FORMAT_PROMPT, TOOLS_SYSTEM_PROMPT};
use crate::registry::ToolRegistry;
use crate::session::{DeliveryParams, Session, SessionState};
use wayfarer_store::CheckpointStore;

// ---------------------------------------------------------------------------
// Side-effect executor trait
// ---------------------------------------------------------------------------

/// The one irreversible action behind the approval gate.
///
/// Implementations (an SMTP mailer in production, a recording stub in
/// tests) deliver the formatted payload. A failure must surface as
/// [`AgentError::DeliveryFailed`] so the caller can retry `approve`.
#[async_trait]
pub trait SideEffectExecutor: Send + Sync {
    /// Deliver `payload` to `recipient` from `sender` under `subject`.
    async fn deliver(
        &self,
        payload: &str,
        sender: &str,
        recipient: &str,
        subject: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of model passes per `advance` call. Bounds the
    /// cost of a model that never stops requesting tools.
    pub max_iterations: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

// ---------------------------------------------------------------------------
// Session runtime
// ---------------------------------------------------------------------------

/// Drives sessions through their lifecycle.
///
/// Access to any one session is strictly serial: each session sits
/// behind its own `tokio::Mutex`, so concurrent `advance`/`approve`/
/// `reject` calls for the same id queue up while different sessions
/// proceed in parallel. Sessions missing from the in-memory map are
/// rehydrated from the checkpoint store, which is how an approval
/// arriving from another process finds its session.
pub struct SessionRuntime {
    /// The tool-deciding model.
    decider: Arc<dyn ModelClient>,
    /// The content-transform model for email formatting. May be the
    /// same endpoint as `decider` with different sampling settings.
    formatter: Arc<dyn ModelClient>,
    /// Registered tools, immutable after construction.
    registry: Arc<ToolRegistry>,
    /// Durable checkpoint storage.
    store: CheckpointStore,
    /// Executor for the post-approval side effect.
    executor: Arc<dyn SideEffectExecutor>,
    /// Runtime limits.
    config: RuntimeConfig,
    /// Per-session locks.
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionRuntime {
    /// Create a new runtime. All collaborators are injected.
    pub fn new(
        decider: Arc<dyn ModelClient>,
        formatter: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        store: CheckpointStore,
        executor: Arc<dyn SideEffectExecutor>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            decider,
            formatter,
            registry,
            store,
            executor,
            config,
            sessions: DashMap::new(),
        }
    }

    // ── session lifecycle entry points ───────────────────────────────

    /// Create a new session from the user's request and checkpoint it.
    /// Returns the session id.
    pub async fn start(
        &self,
        initial_user_text: impl Into<String>,
        delivery: Option<DeliveryParams>,
    ) -> Result<String> {
        let session = Session::new(initial_user_text, delivery);
        let id = session.id.clone();

        info!(session_id = %id, "session started");
        self.checkpoint(&session).await?;
        self.sessions
            .insert(id.clone(), Arc::new(Mutex::new(session)));

        Ok(id)
    }

    /// Execute exactly one state transition.
    pub async fn step(&self, session_id: &str) -> Result<()> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        self.step_locked(&mut session).await
    }

    /// Run the decide/execute loop until the session pauses at the
    /// approval gate (or finalizes).
    ///
    /// A model that keeps requesting tools is cut off after
    /// `max_iterations` passes: the session is forced to `Finalized`
    /// with an error marker and [`AgentError::MaxIterationsExceeded`]
    /// is returned.
    pub async fn advance(&self, session_id: &str) -> Result<()> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;

        if !matches!(
            session.state,
            SessionState::Deciding | SessionState::ExecutingTools
        ) {
            return Err(AgentError::InvalidState {
                operation: "advance",
                state: session.state,
            });
        }

        let mut passes = 0u32;
        while matches!(
            session.state,
            SessionState::Deciding | SessionState::ExecutingTools
        ) {
            if session.state == SessionState::Deciding {
                if passes >= self.config.max_iterations {
                    warn!(
                        session_id = %session.id,
                        max_iterations = self.config.max_iterations,
                        "model did not converge, forcing session to finalized"
                    );
                    session.state = SessionState::Finalized;
                    session.error = Some(format!(
                        "max iterations exceeded ({})",
                        self.config.max_iterations
                    ));
                    self.checkpoint(&session).await?;
                    return Err(AgentError::MaxIterationsExceeded {
                        session_id: session.id.clone(),
                        max_iterations: self.config.max_iterations,
                    });
                }
                passes += 1;
            }

            self.step_locked(&mut session).await?;
        }

        info!(session_id = %session.id, state = ?session.state, passes, "advance complete");
        Ok(())
    }

    /// Release the approval gate: format the last assistant content as
    /// an email and deliver it.
    ///
    /// On delivery failure the session stays in `AwaitingApproval` and
    /// the error is surfaced -- `approve` may be retried.
    pub async fn approve(
        &self,
        session_id: &str,
        delivery: Option<DeliveryParams>,
    ) -> Result<()> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;

        if session.state != SessionState::AwaitingApproval {
            return Err(AgentError::InvalidState {
                operation: "approve",
                state: session.state,
            });
        }

        let params = delivery
            .or_else(|| session.delivery.clone())
            .ok_or_else(|| AgentError::DeliveryFailed {
                reason: "no delivery parameters configured".into(),
            })?;

        let content =
            session
                .last_assistant_content()
                .ok_or_else(|| AgentError::DeliveryFailed {
                    reason: "no assistant content to deliver".into(),
                })?;

        // Second model pass: reshape the summary into an email body.
        info!(session_id = %session.id, recipient = %params.recipient, "preparing email");
        let payload = self.formatter.transform(EMAIL_FORMAT_PROMPT, &content).await?;

        // The irreversible part. Failures surface verbatim; the session
        // stays at the gate so the caller can retry.
        self.executor
            .deliver(&payload, &params.sender, &params.recipient, &params.subject)
            .await?;

        session.state = SessionState::Finalized;
        self.checkpoint(&session).await?;
        info!(session_id = %session.id, "email delivered, session finalized");
        Ok(())
    }

    /// Decline the pending side effect. The session finalizes without
    /// the executor ever being invoked.
    pub async fn reject(&self, session_id: &str) -> Result<()> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;

        if session.state != SessionState::AwaitingApproval {
            return Err(AgentError::InvalidState {
                operation: "reject",
                state: session.state,
            });
        }

        session.state = SessionState::Finalized;
        self.checkpoint(&session).await?;
        info!(session_id = %session.id, "session rejected and finalized");
        Ok(())
    }

    /// Current state plus the last assistant text, for status displays.
    pub async fn get_state(&self, session_id: &str) -> Result<(SessionState, Option<String>)> {
        let handle = self.session_handle(session_id).await?;
        let session = handle.lock().await;
        Ok((session.state, session.last_assistant_content()))
    }

    // ── internals ────────────────────────────────────────────────────

    /// Fetch the per-session lock, rehydrating from the checkpoint
    /// store on a cache miss.
    async fn session_handle(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Ok(Arc::clone(&existing));
        }

        let record = self.store.load(session_id).await.map_err(|e| match e {
            wayfarer_store::StoreError::NotFound { .. } => AgentError::SessionNotFound {
                session_id: session_id.to_owned(),
            },
            other => AgentError::Store(other),
        })?;
        let session = Session::from_checkpoint(&record)?;
        debug!(session_id = %session_id, state = ?session.state, "session rehydrated from checkpoint");

        // First insert wins if two callers rehydrate concurrently.
        let handle = self
            .sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
        Ok(Arc::clone(&handle))
    }

    /// One transition of the state machine. The caller holds the
    /// session lock.
    async fn step_locked(&self, session: &mut Session) -> Result<()> {
        match session.state {
            SessionState::Deciding => self.step_deciding(session).await,
            SessionState::ExecutingTools => self.step_executing(session).await,
            state @ (SessionState::AwaitingApproval | SessionState::Finalized) => {
                Err(AgentError::InvalidState {
                    operation: "step",
                    state,
                })
            }
        }
    }

    /// Ask the model for the next action and transition accordingly.
    async fn step_deciding(&self, session: &mut Session) -> Result<()> {
        // The system instruction is prefixed per call, never stored.
        let mut messages = Vec::with_capacity(session.messages.len() + 1);
        messages.push(Message::system(TOOLS_SYSTEM_PROMPT));
        messages.extend_from_slice(&session.messages);

        let definitions = self.registry.definitions();
        let assistant = self.decider.decide(&messages, &definitions).await?;

        let requested = assistant.tool_calls.len();
        session.messages.push(assistant);
        session.state = if requested == 0 {
            SessionState::AwaitingApproval
        } else {
            SessionState::ExecutingTools
        };

        debug!(
            session_id = %session.id,
            tool_calls = requested,
            next = ?session.state,
            "decide pass complete"
        );
        self.checkpoint(session).await
    }

    /// Execute the requested tool calls strictly in request order.
    ///
    /// Every call produces exactly one result message -- unknown tools,
    /// invalid arguments, and handler failures included -- so the model
    /// always sees a complete, ordered result set on its next turn.
    async fn step_executing(&self, session: &mut Session) -> Result<()> {
        let calls = session
            .last_assistant()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        for call in &calls {
            debug!(session_id = %session.id, tool = %call.name, call_id = %call.id, "executing tool");
            let content = self.registry.dispatch(&call.name, &call.arguments).await;
            session
                .messages
                .push(Message::tool_result(&call.id, &call.name, content));
        }

        session.state = SessionState::Deciding;
        debug!(session_id = %session.id, executed = calls.len(), "back to the model");
        self.checkpoint(session).await
    }

    /// Persist the session after a transition.
    async fn checkpoint(&self, session: &Session) -> Result<()> {
        let record = session.to_checkpoint()?;
        self.store
            .save(
                &record.session_id,
                &record.state,
                &record.conversation,
                record.delivery.as_deref(),
                record.error.as_deref(),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
