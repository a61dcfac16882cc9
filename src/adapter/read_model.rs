use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::adapter::{AccountBus, AccountObservation};
use crate::domain::{AccountEvent, AccountId, AccountStatus, BillingPeriod, OrgId};
use crate::port::{AccountReadModel, BillingDue};

/// One row per account, the projection the billing fan-out queries.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub status: AccountStatus,
    pub balance: Decimal,
    pub owner_name: String,
    pub last_billing_cycle: Option<BillingPeriod>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory account read model, kept current by a projector task that
/// consumes the broadcast bus.
pub struct InMemoryAccountReadModel {
    rows: RwLock<HashMap<AccountId, AccountRow>>,
}

impl InMemoryAccountReadModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: RwLock::new(HashMap::new()),
        })
    }

    pub async fn row(&self, account_id: AccountId) -> Option<AccountRow> {
        self.rows.read().await.get(&account_id).cloned()
    }

    pub async fn rows(&self) -> Vec<AccountRow> {
        self.rows.read().await.values().cloned().collect()
    }

    async fn project(&self, event: &AccountEvent, state: &crate::domain::AccountState) {
        let mut rows = self.rows.write().await;
        rows.insert(
            state.account_id,
            AccountRow {
                account_id: state.account_id,
                org_id: state.org_id,
                status: state.status,
                balance: state.balance,
                owner_name: state.owner.full_name.clone(),
                last_billing_cycle: state.last_billing_cycle,
                updated_at: event.base().timestamp,
            },
        );
    }
}

#[async_trait]
impl AccountReadModel for InMemoryAccountReadModel {
    async fn billing_due_accounts(&self, older_than: DateTime<Utc>) -> Vec<BillingDue> {
        let due_period = BillingPeriod::of(older_than);
        self.rows
            .read()
            .await
            .values()
            .filter(|row| row.status == AccountStatus::Active)
            .filter(|row| match row.last_billing_cycle {
                None => true,
                // Last cycle is older than the lookback boundary's period.
                Some(period) => {
                    (period.year, period.month) < (due_period.year, due_period.month)
                }
            })
            .map(|row| BillingDue {
                account_id: row.account_id,
                org_id: row.org_id,
            })
            .collect()
    }
}

/// Consume the bus into the read model until the bus closes. Spawned at
/// boot; lagging is tolerated because every projected row carries the
/// full current state.
pub fn spawn_projector(
    bus: &AccountBus,
    read_model: Arc<InMemoryAccountReadModel>,
) -> tokio::task::JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(AccountObservation::Event { event, state }) => {
                    read_model.project(&event, &state).await;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "read model projector lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
