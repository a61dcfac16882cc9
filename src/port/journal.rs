use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{AppendMeta, EntityId, JournalError, JournalRecord};

/// Append-only per-entity event log with monotonic sequence numbers.
///
/// Guarantees the runtime relies on:
/// - per-entity total order, gap-free sequence numbers starting at 1
/// - durable commit before the append returns
/// - optimistic concurrency through `expected_seq`
/// - idempotent appends via the confirmation id in [`AppendMeta`]
#[async_trait]
pub trait Journal: Send + Sync {
    /// Append events after `expected_seq`. Returns the new highest
    /// sequence number. A stale `expected_seq` returns
    /// [`JournalError::Conflict`]; a replayed confirmation id returns the
    /// current sequence without appending.
    async fn append(
        &self,
        stream: &EntityId,
        expected_seq: u64,
        tag: &str,
        events: Vec<Value>,
        meta: AppendMeta,
    ) -> Result<u64, JournalError>;

    /// Events of one stream, `from_seq..=to_seq` inclusive. Soft-deleted
    /// events are not returned.
    async fn read(
        &self,
        stream: &EntityId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<JournalRecord>, JournalError>;

    async fn highest_sequence(&self, stream: &EntityId) -> Result<u64, JournalError>;

    /// Soft-delete events up to and including `seq`. Sequence numbers keep
    /// counting from where they were.
    async fn delete_up_to(&self, stream: &EntityId, seq: u64) -> Result<(), JournalError>;

    /// All live events carrying `tag`, across streams, in append order.
    /// Used for read-model rebuild and closure reconciliation.
    async fn current_events_by_tag(&self, tag: &str) -> Result<Vec<JournalRecord>, JournalError>;
}

pub fn encode_events<E: serde::Serialize>(events: &[E]) -> Result<Vec<Value>, JournalError> {
    events
        .iter()
        .map(|event| {
            serde_json::to_value(event).map_err(|e| JournalError::Serialization(e.to_string()))
        })
        .collect()
}

pub fn decode_event<E: serde::de::DeserializeOwned>(
    record: &JournalRecord,
) -> Result<E, JournalError> {
    record
        .decode()
        .map_err(|e| JournalError::Serialization(e.to_string()))
}
