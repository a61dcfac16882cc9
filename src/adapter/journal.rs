use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{AppendMeta, ConfirmationId, EntityId, JournalError, JournalRecord};
use crate::port::{Journal, SnapshotStore};

#[derive(Default)]
struct StreamData {
    records: Vec<Arc<JournalRecord>>,
    highest: u64,
    deleted_up_to: u64,
    confirmations: HashMap<ConfirmationId, u64>,
}

#[derive(Default)]
struct JournalData {
    streams: HashMap<EntityId, StreamData>,
    by_tag: HashMap<String, Vec<Arc<JournalRecord>>>,
}

/// In-memory journal. Per-stream sequence numbers are assigned under the
/// write lock, so appends are atomic and gap-free; the confirmation index
/// makes at-least-once redeliveries no-ops.
pub struct InMemoryJournal {
    data: Arc<RwLock<JournalData>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(JournalData::default())),
        }
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append(
        &self,
        stream: &EntityId,
        expected_seq: u64,
        tag: &str,
        events: Vec<Value>,
        meta: AppendMeta,
    ) -> Result<u64, JournalError> {
        let mut data = self.data.write().await;
        let stream_data = data.streams.entry(stream.clone()).or_default();

        if let Some(confirmation_id) = &meta.confirmation_id {
            if let Some(seq) = stream_data.confirmations.get(confirmation_id) {
                return Ok(*seq);
            }
        }

        if stream_data.highest != expected_seq {
            return Err(JournalError::Conflict {
                stream: stream.to_string(),
                expected: expected_seq,
                actual: stream_data.highest,
            });
        }

        let mut appended = Vec::with_capacity(events.len());
        for payload in events {
            stream_data.highest += 1;
            let record = Arc::new(JournalRecord {
                stream: stream.clone(),
                sequence_nr: stream_data.highest,
                tag: tag.to_string(),
                payload,
                timestamp: meta.timestamp,
            });
            stream_data.records.push(record.clone());
            appended.push(record);
        }

        let new_highest = stream_data.highest;
        if let Some(confirmation_id) = meta.confirmation_id {
            stream_data.confirmations.insert(confirmation_id, new_highest);
        }

        data.by_tag
            .entry(tag.to_string())
            .or_default()
            .extend(appended);

        Ok(new_highest)
    }

    async fn read(
        &self,
        stream: &EntityId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<JournalRecord>, JournalError> {
        let data = self.data.read().await;
        let Some(stream_data) = data.streams.get(stream) else {
            return Ok(Vec::new());
        };

        Ok(stream_data
            .records
            .iter()
            .filter(|r| {
                r.sequence_nr >= from_seq
                    && r.sequence_nr <= to_seq
                    && r.sequence_nr > stream_data.deleted_up_to
            })
            .map(|r| (**r).clone())
            .collect())
    }

    async fn highest_sequence(&self, stream: &EntityId) -> Result<u64, JournalError> {
        let data = self.data.read().await;
        Ok(data.streams.get(stream).map_or(0, |s| s.highest))
    }

    async fn delete_up_to(&self, stream: &EntityId, seq: u64) -> Result<(), JournalError> {
        let mut data = self.data.write().await;
        let stream_data = data
            .streams
            .get_mut(stream)
            .ok_or_else(|| JournalError::NotFound(stream.to_string()))?;
        stream_data.deleted_up_to = stream_data.deleted_up_to.max(seq);
        Ok(())
    }

    async fn current_events_by_tag(&self, tag: &str) -> Result<Vec<JournalRecord>, JournalError> {
        let data = self.data.read().await;
        let Some(records) = data.by_tag.get(tag) else {
            return Ok(Vec::new());
        };

        Ok(records
            .iter()
            .filter(|r| {
                data.streams
                    .get(&r.stream)
                    .is_none_or(|s| r.sequence_nr > s.deleted_up_to)
            })
            .map(|r| (**r).clone())
            .collect())
    }
}

/// In-memory snapshot store.
pub struct InMemorySnapshots {
    data: Arc<RwLock<HashMap<EntityId, (u64, Value)>>>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySnapshots {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshots {
    async fn save(&self, stream: &EntityId, seq: u64, snapshot: Value) -> Result<(), JournalError> {
        self.data
            .write()
            .await
            .insert(stream.clone(), (seq, snapshot));
        Ok(())
    }

    async fn load(&self, stream: &EntityId) -> Result<Option<(u64, Value)>, JournalError> {
        Ok(self.data.read().await.get(stream).cloned())
    }

    async fn delete(&self, stream: &EntityId) -> Result<(), JournalError> {
        self.data.write().await.remove(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::AccountId;

    fn stream() -> EntityId {
        EntityId::account(AccountId::new())
    }

    #[tokio::test]
    async fn append_assigns_gap_free_sequences() {
        let journal = InMemoryJournal::new();
        let stream = stream();

        let seq = journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({"n": 1}), json!({"n": 2})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap();
        assert_eq!(seq, 2);

        let seq = journal
            .append(
                &stream,
                2,
                "account",
                vec![json!({"n": 3})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap();
        assert_eq!(seq, 3);

        let records = journal.read(&stream, 1, u64::MAX).await.unwrap();
        let sequences: Vec<_> = records.iter().map(|r| r.sequence_nr).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stale_expected_sequence_conflicts() {
        let journal = InMemoryJournal::new();
        let stream = stream();
        journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap();

        let err = journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Conflict { actual: 1, .. }));
    }

    #[tokio::test]
    async fn confirmed_appends_are_idempotent() {
        let journal = InMemoryJournal::new();
        let stream = stream();
        let confirmation = ConfirmationId::new("delivery:1");

        let first = journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({"n": 1})],
                AppendMeta::confirmed(confirmation.clone()),
            )
            .await
            .unwrap();

        // Redelivery: same confirmation id, stale expected_seq. No error,
        // nothing appended.
        let second = journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({"n": 1})],
                AppendMeta::confirmed(confirmation),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(journal.read(&stream, 1, u64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_hides_events_everywhere() {
        let journal = InMemoryJournal::new();
        let stream = stream();
        journal
            .append(
                &stream,
                0,
                "account",
                vec![json!({"n": 1}), json!({"n": 2})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap();

        journal.delete_up_to(&stream, 1).await.unwrap();

        let records = journal.read(&stream, 1, u64::MAX).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence_nr, 2);

        let tagged = journal.current_events_by_tag("account").await.unwrap();
        assert_eq!(tagged.len(), 1);

        // Sequence numbering continues past the deletion point.
        let seq = journal
            .append(
                &stream,
                2,
                "account",
                vec![json!({"n": 3})],
                AppendMeta::unconfirmed(),
            )
            .await
            .unwrap();
        assert_eq!(seq, 3);
    }
}
