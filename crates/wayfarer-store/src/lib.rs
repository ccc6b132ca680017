//! # wayfarer-store
//!
//! Checkpoint persistence for Wayfarer sessions.
//!
//! A checkpoint is a durable snapshot of a session's conversation and
//! state, written after every state transition so that a crash between
//! transitions loses at most the in-flight step. Writes replace the
//! whole record (last-write-wins); reads return the record exactly as
//! written so a resumed session sees byte-identical history.
//!
//! ## Quick start
//!
//! ```ignore
//! use wayfarer_store::{CheckpointStore, Database};
//!
//! let db = Database::open_and_migrate("data/wayfarer.db").await?;
//! let store = CheckpointStore::new(db);
//! store.save("session-1", "deciding", conversation_json, None, None).await?;
//! let record = store.load("session-1").await?;
//! ```

pub mod checkpoint;
pub mod db;
pub mod error;
pub mod migration;

// ── re-exports ───────────────────────────────────────────────────────

pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use db::Database;
pub use error::{StoreError, StoreResult};
