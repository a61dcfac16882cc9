use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{AccountId, CorrelationId, RecipientId};

/// Commands handed to the external persistent scheduler. The scheduler is
/// expected to eventually deliver them back as live `StateChange`
/// commands through the command ingress.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledWork {
    InternalTransferBetweenOrgs {
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        correlation_id: CorrelationId,
        due_at: DateTime<Utc>,
    },
    DomesticTransfer {
        sender: AccountId,
        recipient_id: RecipientId,
        amount: Decimal,
        correlation_id: CorrelationId,
        due_at: DateTime<Utc>,
    },
    BillingCycleFanout {
        cron: String,
    },
    RecurringMaintenanceFee {
        account_id: AccountId,
    },
}

#[async_trait]
pub trait SchedulerProxy: Send + Sync {
    async fn schedule(&self, work: ScheduledWork);

    /// Remove every scheduled obligation of `account_id`; part of account
    /// closure.
    async fn deregister_account(&self, account_id: AccountId);
}
