use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::{AccountEvent, AccountId, AccountState, ValidationError};

/// What goes out on the broadcast bus after each entity interaction:
/// persisted events with the state they produced, validation rejections
/// keyed by account, and service health transitions for front-end
/// widgets.
#[derive(Debug, Clone)]
pub enum AccountObservation {
    Event {
        event: AccountEvent,
        state: AccountState,
    },
    Rejected {
        account_id: AccountId,
        error: ValidationError,
    },
    PersistFailed {
        account_id: AccountId,
        error: crate::domain::JournalError,
    },
    ServiceHealth {
        service: &'static str,
        state: crate::adapter::BreakerState,
    },
}

/// Broadcast bus for read-model writers and real-time subscribers.
/// Consumers that fall behind lose the oldest observations, which is the
/// right trade for a live feed; the journal is the source of truth.
#[derive(Clone)]
pub struct AccountBus {
    sender: Arc<broadcast::Sender<AccountObservation>>,
}

impl AccountBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, observation: AccountObservation) {
        // Zero receivers is fine; the bus is fire and forget.
        let _ = self.sender.send(observation);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccountObservation> {
        self.sender.subscribe()
    }
}

impl Default for AccountBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
