use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{EntityId, JournalError};

/// Snapshot read/write so recovery replays only the journal tail.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot` as the state after `seq`.
    async fn save(&self, stream: &EntityId, seq: u64, snapshot: Value) -> Result<(), JournalError>;

    /// Latest snapshot, if any, with the sequence it was taken at.
    async fn load(&self, stream: &EntityId) -> Result<Option<(u64, Value)>, JournalError>;

    /// Drop the snapshot; part of entity deletion.
    async fn delete(&self, stream: &EntityId) -> Result<(), JournalError>;
}
