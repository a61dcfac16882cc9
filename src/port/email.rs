use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{AccountId, BillingPeriod, OrgId, PurchaseDeclinedReason};

/// Tagged outbound notification. Actual delivery is an external concern;
/// the engine only hands messages to the proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailMessage {
    AccountOpen {
        account_id: AccountId,
        owner_email: String,
    },
    AccountClose {
        account_id: AccountId,
        owner_email: String,
    },
    BillingStatement {
        account_id: AccountId,
        owner_email: String,
        period: BillingPeriod,
    },
    TransferDeposited {
        account_id: AccountId,
        owner_email: String,
        amount: Decimal,
        sender_name: String,
    },
    PurchaseDeclined {
        org_id: OrgId,
        employee_email: String,
        reason: PurchaseDeclinedReason,
    },
    EmployeeInvite {
        org_id: OrgId,
        employee_email: String,
        token: uuid::Uuid,
    },
}

#[async_trait]
pub trait EmailProxy: Send + Sync {
    /// Fire and forget; delivery failures are the proxy's problem.
    async fn queue(&self, message: EmailMessage);
}
