//! End-to-end tests for the session runtime: scripted model, stub
//! tools, recording executor, real sqlite-backed checkpoints.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use wayfarer_agent::{
    AgentError, DeliveryParams, Message, ModelClient, ModelResponse, Result, Role, RuntimeConfig,
    SessionRuntime, SessionState, SideEffectExecutor, ToolCall, ToolDefinition, ToolHandler,
    ToolRegistry,
};
use wayfarer_store::{CheckpointStore, Database};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct ScriptedModel {
    script: StdMutex<VecDeque<ModelResponse>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: StdMutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn decide(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<Message> {
        let response = self.script.lock().unwrap().pop_front().ok_or_else(|| {
            AgentError::ModelInvocationFailed {
                reason: "script exhausted".into(),
            }
        })?;
        Ok(response.into_message())
    }

    async fn transform(&self, _instruction: &str, content: &str) -> Result<String> {
        Ok(format!("<html><body>{content}</body></html>"))
    }
}

struct RecordingExecutor {
    deliveries: StdMutex<Vec<(String, String, String, String)>>,
    calls: AtomicUsize,
}

impl RecordingExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SideEffectExecutor for RecordingExecutor {
    async fn deliver(
        &self,
        payload: &str,
        sender: &str,
        recipient: &str,
        subject: &str,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.deliveries.lock().unwrap().push((
            payload.to_owned(),
            sender.to_owned(),
            recipient.to_owned(),
            subject.to_owned(),
        ));
        Ok(())
    }
}

struct StubFlights;

#[async_trait]
impl ToolHandler for StubFlights {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "flights_finder".into(),
            description: "Find flights between two airports".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "departure_airport": {"type": "string"},
                    "arrival_airport": {"type": "string"},
                    "outbound_date": {"type": "string"},
                },
                "required": ["departure_airport", "arrival_airport"],
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        let from = arguments["departure_airport"].as_str().unwrap_or("?");
        let to = arguments["arrival_airport"].as_str().unwrap_or("?");
        Ok(json!([
            {"airline": "Delta", "route": format!("{from}-{to}"), "price": "$612"},
            {"airline": "British Airways", "route": format!("{from}-{to}"), "price": "$745"},
        ]))
    }
}

struct StubHotels;

#[async_trait]
impl ToolHandler for StubHotels {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "hotels_finder".into(),
            description: "Find hotels in a location".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                },
                "required": ["location"],
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        let location = arguments["location"].as_str().unwrap_or("?");
        Ok(json!([{"name": format!("The {location} Grand"), "price": "$220/night"}]))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn fresh_db() -> Database {
    // Honors RUST_LOG for debugging failing runs; idempotent across tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let db = Database::open_in_memory().expect("in-memory db");
    db.run_migrations().await.expect("migrations");
    db
}

fn registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new(vec![Arc::new(StubFlights), Arc::new(StubHotels)]).expect("registry"))
}

fn runtime_on(
    db: Database,
    model: Arc<dyn ModelClient>,
    executor: Arc<RecordingExecutor>,
) -> SessionRuntime {
    SessionRuntime::new(
        Arc::clone(&model),
        model,
        registry(),
        CheckpointStore::new(db),
        executor,
        RuntimeConfig::default(),
    )
}

fn delivery() -> DeliveryParams {
    DeliveryParams {
        sender: "agent@wayfarer.example".into(),
        recipient: "traveler@example.com".into(),
        subject: "Your Travel Options".into(),
    }
}

fn flight_request_script() -> Vec<ModelResponse> {
    vec![
        ModelResponse::ToolCalls(vec![ToolCall {
            id: "call_flights".into(),
            name: "flights_finder".into(),
            arguments: json!({
                "departure_airport": "JFK",
                "arrival_airport": "LHR",
                "outbound_date": "2026-09-15",
            }),
        }]),
        ModelResponse::ToolCalls(vec![ToolCall {
            id: "call_hotels".into(),
            name: "hotels_finder".into(),
            arguments: json!({"location": "London"}),
        }]),
        ModelResponse::Text(
            "Delta flies JFK-LHR for $612; The London Grand is $220/night.".into(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_trip_planning_flow_to_delivery() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(flight_request_script());
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db, model, Arc::clone(&executor));

    let id = runtime
        .start(
            "Find me a flight from JFK to LHR on 2026-09-15 and a hotel in London",
            Some(delivery()),
        )
        .await
        .unwrap();

    runtime.advance(&id).await.unwrap();
    let (state, summary) = runtime.get_state(&id).await.unwrap();
    assert_eq!(state, SessionState::AwaitingApproval);
    assert!(summary.unwrap().contains("Delta"));

    // Nothing delivered until the human says so.
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

    runtime.approve(&id, None).await.unwrap();
    let (state, _) = runtime.get_state(&id).await.unwrap();
    assert_eq!(state, SessionState::Finalized);

    let deliveries = executor.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    let (payload, sender, recipient, subject) = &deliveries[0];
    assert!(payload.contains("<html>"));
    assert!(payload.contains("Delta"));
    assert_eq!(sender, "agent@wayfarer.example");
    assert_eq!(recipient, "traveler@example.com");
    assert_eq!(subject, "Your Travel Options");
}

#[tokio::test]
async fn approval_gate_survives_runtime_restart() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(flight_request_script());
    let executor = RecordingExecutor::new();

    // First runtime drives the session to the gate.
    let first = runtime_on(db.clone(), model, Arc::clone(&executor));
    let id = first
        .start("JFK to LHR please", Some(delivery()))
        .await
        .unwrap();
    first.advance(&id).await.unwrap();
    drop(first);

    // Second runtime has an empty in-memory map and must rehydrate
    // from the checkpoint store.
    let replay = ScriptedModel::new(vec![]);
    let second = runtime_on(db, replay, Arc::clone(&executor));
    let (state, summary) = second.get_state(&id).await.unwrap();
    assert_eq!(state, SessionState::AwaitingApproval);
    assert!(summary.unwrap().contains("Delta"));

    second.approve(&id, None).await.unwrap();
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    let (state, _) = second.get_state(&id).await.unwrap();
    assert_eq!(state, SessionState::Finalized);
}

#[tokio::test]
async fn rehydrated_conversation_is_byte_identical() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(flight_request_script());
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db.clone(), model, Arc::clone(&executor));

    let id = runtime.start("plan my trip", None).await.unwrap();
    runtime.advance(&id).await.unwrap();

    let store = CheckpointStore::new(db);
    let record = store.load(&id).await.unwrap();
    let restored: Vec<Message> = serde_json::from_str(&record.conversation).unwrap();
    let rewritten = serde_json::to_string(&restored).unwrap();
    assert_eq!(record.conversation, rewritten);

    // The tool exchange is fully present: two assistant tool-call
    // turns, two matching results, one final summary.
    let tool_results: Vec<_> = restored.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_results.len(), 2);
    assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("call_flights"));
    assert_eq!(tool_results[1].tool_call_id.as_deref(), Some("call_hotels"));
}

#[tokio::test]
async fn every_transition_is_checkpointed() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(flight_request_script());
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db.clone(), model, executor);
    let store = CheckpointStore::new(db);

    let id = runtime.start("plan my trip", None).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().state, "deciding");

    runtime.step(&id).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().state, "executing_tools");

    runtime.step(&id).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().state, "deciding");

    runtime.advance(&id).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().state, "awaiting_approval");
}

#[tokio::test]
async fn invalid_arguments_become_tool_result_content() {
    let db = fresh_db().await;
    // First call omits the required arrival_airport; the model corrects
    // itself on the second pass.
    let model = ScriptedModel::new(vec![
        ModelResponse::ToolCalls(vec![ToolCall {
            id: "call_bad".into(),
            name: "flights_finder".into(),
            arguments: json!({"departure_airport": "JFK"}),
        }]),
        ModelResponse::ToolCalls(vec![ToolCall {
            id: "call_good".into(),
            name: "flights_finder".into(),
            arguments: json!({"departure_airport": "JFK", "arrival_airport": "LHR"}),
        }]),
        ModelResponse::Text("found it".into()),
    ]);
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db.clone(), model, executor);

    let id = runtime.start("JFK to somewhere", None).await.unwrap();
    runtime.advance(&id).await.unwrap();

    let store = CheckpointStore::new(db);
    let record = store.load(&id).await.unwrap();
    let messages: Vec<Message> = serde_json::from_str(&record.conversation).unwrap();
    let results: Vec<_> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].content.contains("invalid arguments"));
    assert!(results[1].content.contains("Delta"));
    assert_eq!(record.state, "awaiting_approval");
}

#[tokio::test]
async fn reject_is_durable_and_skips_delivery() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(vec![ModelResponse::Text("trip summary".into())]);
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db.clone(), model, Arc::clone(&executor));

    let id = runtime.start("anything", Some(delivery())).await.unwrap();
    runtime.advance(&id).await.unwrap();
    runtime.reject(&id).await.unwrap();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    let store = CheckpointStore::new(db);
    assert_eq!(store.load(&id).await.unwrap().state, "finalized");

    // The terminal state is sticky.
    let err = runtime.advance(&id).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState { .. }));
}

#[tokio::test]
async fn approve_override_takes_precedence_over_stored_params() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(vec![ModelResponse::Text("trip summary".into())]);
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db, model, Arc::clone(&executor));

    let id = runtime.start("anything", Some(delivery())).await.unwrap();
    runtime.advance(&id).await.unwrap();

    let override_params = DeliveryParams {
        sender: "agent@wayfarer.example".into(),
        recipient: "other@example.com".into(),
        subject: "Updated Itinerary".into(),
    };
    runtime.approve(&id, Some(override_params)).await.unwrap();

    let deliveries = executor.deliveries.lock().unwrap();
    assert_eq!(deliveries[0].2, "other@example.com");
    assert_eq!(deliveries[0].3, "Updated Itinerary");
}

#[tokio::test]
async fn sessions_progress_independently() {
    let db = fresh_db().await;
    let model = ScriptedModel::new(vec![
        ModelResponse::Text("first summary".into()),
        ModelResponse::Text("second summary".into()),
    ]);
    let executor = RecordingExecutor::new();
    let runtime = runtime_on(db, model, executor);

    let a = runtime.start("trip a", None).await.unwrap();
    let b = runtime.start("trip b", None).await.unwrap();
    assert_ne!(a, b);

    runtime.advance(&a).await.unwrap();
    let (state_a, _) = runtime.get_state(&a).await.unwrap();
    let (state_b, _) = runtime.get_state(&b).await.unwrap();
    assert_eq!(state_a, SessionState::AwaitingApproval);
    assert_eq!(state_b, SessionState::Deciding);

    runtime.advance(&b).await.unwrap();
    let (state_b, summary_b) = runtime.get_state(&b).await.unwrap();
    assert_eq!(state_b, SessionState::AwaitingApproval);
    assert_eq!(summary_b.as_deref(), Some("second summary"));
}
