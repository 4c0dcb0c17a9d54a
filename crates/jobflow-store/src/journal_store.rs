//! Durable persistence for `jobflow_engine`'s per-execution event journals,
//! keyed by `(workflow_id, event_seq)` in the `workflow_events` table.
//!
//! `jobflow_journal` only knows how to interpret a sequence of
//! [`JournalEntry`] values; this is the layer that remembers one across a
//! restart, the same split `jobflow-store`'s own doc comment describes for
//! `JobStore` versus the domain types it persists.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use jobflow_types::{ExecutionId, JournalEntry};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Append `entries` to `execution_id`'s history. Entries are appended
    /// in order and never rewritten, matching the journal's own append-only
    /// contract.
    async fn append(&self, execution_id: &ExecutionId, entries: &[JournalEntry]) -> Result<(), StoreError>;

    /// Load an execution's full recorded history, ordered by sequence.
    /// Empty if nothing has ever been appended for this ID.
    async fn load(&self, execution_id: &ExecutionId) -> Result<Vec<JournalEntry>, StoreError>;
}

/// Every execution identity this store hands out is root-level (empty
/// promise path) and derived from a job's `workflow_run_id`, so the root
/// hash's first 16 bytes round-trip through a `UUID` column losslessly —
/// see `jobflow-server`'s derivation of `ExecutionId` from `workflow_run_id`.
fn workflow_uuid(execution_id: &ExecutionId) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&execution_id.root_bytes()[..16]);
    Uuid::from_bytes(bytes)
}

pub struct PgJournalStore {
    pool: PgPool,
}

impl PgJournalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JournalStore for PgJournalStore {
    async fn append(&self, execution_id: &ExecutionId, entries: &[JournalEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let workflow_id = workflow_uuid(execution_id);
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let payload = serde_json::to_value(entry)?;
            sqlx::query(
                "INSERT INTO workflow_events (workflow_id, event_seq, event_payload) \
                 VALUES ($1, $2, $3) ON CONFLICT (workflow_id, event_seq) DO NOTHING",
            )
            .bind(workflow_id)
            .bind(entry.sequence as i64)
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, execution_id: &ExecutionId) -> Result<Vec<JournalEntry>, StoreError> {
        let workflow_id = workflow_uuid(execution_id);
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT event_payload FROM workflow_events WHERE workflow_id = $1 ORDER BY event_seq ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(payload,)| serde_json::from_value(payload).map_err(StoreError::from))
            .collect()
    }
}

/// In-memory twin for tests that don't stand up Postgres.
#[derive(Default)]
pub struct InMemoryJournalStore {
    histories: Mutex<HashMap<Uuid, Vec<JournalEntry>>>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn append(&self, execution_id: &ExecutionId, entries: &[JournalEntry]) -> Result<(), StoreError> {
        let workflow_id = workflow_uuid(execution_id);
        let mut histories = self.histories.lock().unwrap();
        histories.entry(workflow_id).or_default().extend(entries.iter().cloned());
        Ok(())
    }

    async fn load(&self, execution_id: &ExecutionId) -> Result<Vec<JournalEntry>, StoreError> {
        let workflow_id = workflow_uuid(execution_id);
        Ok(self.histories.lock().unwrap().get(&workflow_id).cloned().unwrap_or_default())
    }
}
