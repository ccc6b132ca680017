//! Checkpoint persistence for agent sessions.
//!
//! Every state transition of a session writes one [`CheckpointRecord`]
//! keyed by session id. Saves replace the whole record (last-write-wins)
//! and the conversation is stored as a single opaque JSON blob, so a
//! resumed session reads back history byte-identical to what was saved.
//! The store never interprets the blob -- that is the agent's job.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// The session this snapshot belongs to.
    pub session_id: String,
    /// Machine state at the time of the snapshot, e.g. `"awaiting_approval"`.
    pub state: String,
    /// The full conversation, JSON-serialized by the caller.
    pub conversation: String,
    /// JSON-serialized delivery parameters, if the session carries any.
    pub delivery: Option<String>,
    /// Error marker for sessions forced to a terminal state.
    pub error: Option<String>,
    /// Unix timestamp of the last save.
    pub updated_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════
//  CheckpointStore
// ═══════════════════════════════════════════════════════════════════════

/// Durable storage for session checkpoints.
///
/// Safe to clone and share across sessions; per-session write ordering
/// is the caller's responsibility.
#[derive(Clone)]
pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    /// Create a new checkpoint store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Save a checkpoint, replacing any existing record for the session.
    ///
    /// Idempotent: re-saving identical data is a no-op from the reader's
    /// perspective.
    #[instrument(skip(self, conversation, delivery, error))]
    pub async fn save(
        &self,
        session_id: &str,
        state: &str,
        conversation: &str,
        delivery: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let session_id = session_id.to_string();
        let state = state.to_string();
        let conversation = conversation.to_string();
        let delivery = delivery.map(|s| s.to_string());
        let error = error.map(|s| s.to_string());
        let now = chrono::Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO checkpoints \
                     (session_id, state, conversation, delivery, error, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![session_id, state, conversation, delivery, error, now],
                )?;
                Ok(())
            })
            .await?;

        debug!("checkpoint saved");
        Ok(())
    }

    /// Load the checkpoint for a session, or `NotFound` if none exists.
    #[instrument(skip(self))]
    pub async fn load(&self, session_id: &str) -> StoreResult<CheckpointRecord> {
        let session_id = session_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT session_id, state, conversation, delivery, error, updated_at \
                     FROM checkpoints WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| {
                        Ok(CheckpointRecord {
                            session_id: row.get(0)?,
                            state: row.get(1)?,
                            conversation: row.get(2)?,
                            delivery: row.get(3)?,
                            error: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "checkpoint",
                        id: session_id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    /// Delete the checkpoint for a finished session.
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str) -> StoreResult<()> {
        let session_id = session_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM checkpoints WHERE session_id = ?1",
                    rusqlite::params![session_id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "checkpoint",
                        id: session_id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// List checkpoints ordered by most recently updated, with pagination.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: u32, offset: u32) -> StoreResult<Vec<CheckpointRecord>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT session_id, state, conversation, delivery, error, updated_at \
                     FROM checkpoints ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit, offset], |row| {
                        Ok(CheckpointRecord {
                            session_id: row.get(0)?,
                            state: row.get(1)?,
                            conversation: row.get(2)?,
                            delivery: row.get(3)?,
                            error: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
