use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AccountId, BillingStatement, OrgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingDue {
    pub account_id: AccountId,
    pub org_id: OrgId,
}

/// Read model the billing fan-out streams active account ids from: the
/// equivalent of
/// `SELECT id, org_id WHERE status = 'Active' AND
/// (last_billing_cycle_date IS NULL OR last_billing_cycle_date < now() -
/// lookback)`.
#[async_trait]
pub trait AccountReadModel: Send + Sync {
    async fn billing_due_accounts(&self, older_than: DateTime<Utc>) -> Vec<BillingDue>;
}

/// Billing-statement store the account actor appends to when a cycle
/// starts.
#[async_trait]
pub trait BillingStatementStore: Send + Sync {
    async fn append(&self, statement: BillingStatement);
}
