use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AccountId, CorrelationId, EntityId, InitiatorId, OrgId};

/// Opaque identifier that uniquely identifies one delivery of a command.
/// The journal keeps an index of confirmation ids per stream, so an
/// at-least-once redelivery of the same envelope persists nothing new.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationId(String);

impl ConfirmationId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Fresh id for commands originated inside the engine (side effects,
    /// retries, billing fan-out).
    pub fn generated() -> Self {
        Self(format!("gen:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// At-least-once delivery envelope. The entity runtime acknowledges the
/// envelope only after the resulting events are durably journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmable<T> {
    pub payload: T,
    pub confirmation_id: ConfirmationId,
    pub delivery_attempt: u32,
}

impl<T> Confirmable<T> {
    pub fn first(payload: T, confirmation_id: ConfirmationId) -> Self {
        Self {
            payload,
            confirmation_id,
            delivery_attempt: 1,
        }
    }

    /// Envelope for a command synthesized by the engine itself.
    pub fn internal(payload: T) -> Self {
        Self::first(payload, ConfirmationId::generated())
    }
}

/// Fields every command and event carries. Account messages use the
/// default id type; employee messages are `MessageBase<EmployeeId>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBase<Id = AccountId> {
    pub entity_id: Id,
    pub org_id: OrgId,
    pub correlation_id: CorrelationId,
    pub initiated_by: InitiatorId,
    pub timestamp: DateTime<Utc>,
}

impl<Id> MessageBase<Id> {
    pub fn new(entity_id: Id, org_id: OrgId, initiated_by: InitiatorId) -> Self {
        Self {
            entity_id,
            org_id,
            correlation_id: CorrelationId::new(),
            initiated_by,
            timestamp: Utc::now(),
        }
    }

    /// Same correlation chain, new timestamp. Terminal transfer events are
    /// stamped with the base of their pending event through this.
    pub fn follow_up(&self) -> Self
    where
        Id: Clone,
    {
        Self {
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// What the journal hands back: a serialized event with its position in
/// the entity's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub stream: EntityId,
    pub sequence_nr: u64,
    /// Coarse stream classification ("account", "employee", "shard-index")
    /// used by `current_events_by_tag`.
    pub tag: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl JournalRecord {
    pub fn decode<E: serde::de::DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Metadata attached to an append.
#[derive(Debug, Clone)]
pub struct AppendMeta {
    /// When present, the append is idempotent: a second append with the
    /// same confirmation id on the same stream is a no-op.
    pub confirmation_id: Option<ConfirmationId>,
    pub timestamp: DateTime<Utc>,
}

impl AppendMeta {
    pub fn confirmed(confirmation_id: ConfirmationId) -> Self {
        Self {
            confirmation_id: Some(confirmation_id),
            timestamp: Utc::now(),
        }
    }

    pub fn unconfirmed() -> Self {
        Self {
            confirmation_id: None,
            timestamp: Utc::now(),
        }
    }
}
