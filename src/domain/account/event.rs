use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, AccountOwner, AutoTransferRule, BillingPeriod, DomesticRecipient, InternalRef,
    MaintenanceFeeCriteria, MessageBase, RecipientId, TransferRejectionReason, TransferSender,
};

use super::EmployeePurchase;

/// Direction of the balance change an event causes, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyFlow {
    In(Decimal),
    Out(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    Created {
        base: MessageBase,
        owner: AccountOwner,
        currency: String,
        initial_deposit: Decimal,
    },
    Deposited {
        base: MessageBase,
        amount: Decimal,
    },
    Debited {
        base: MessageBase,
        amount: Decimal,
        purchase: EmployeePurchase,
    },
    MaintenanceFeeDebited {
        base: MessageBase,
        amount: Decimal,
    },
    MaintenanceFeeSkipped {
        base: MessageBase,
        criteria: MaintenanceFeeCriteria,
    },
    DailyDebitLimitUpdated {
        base: MessageBase,
        limit: Decimal,
    },
    InternalRecipientRegistered {
        base: MessageBase,
        recipient: crate::domain::TransferRecipient,
    },
    DomesticRecipientRegistered {
        base: MessageBase,
        recipient: DomesticRecipient,
    },
    DomesticRecipientEdited {
        base: MessageBase,
        recipient: DomesticRecipient,
    },

    InternalTransferWithinOrgPending {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    InternalTransferWithinOrgApproved {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    InternalTransferWithinOrgRejected {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
        reason: TransferRejectionReason,
    },
    InternalTransferWithinOrgDeposited {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },

    InternalTransferBetweenOrgsPending {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    InternalTransferBetweenOrgsApproved {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    InternalTransferBetweenOrgsRejected {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
        reason: TransferRejectionReason,
    },
    InternalTransferBetweenOrgsDeposited {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },
    InternalTransferBetweenOrgsScheduled {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
        scheduled_at: DateTime<Utc>,
    },

    DomesticTransferPending {
        base: MessageBase,
        amount: Decimal,
        /// Wire details snapshot so the transfer worker needs no lookup.
        recipient: DomesticRecipient,
    },
    DomesticTransferApproved {
        base: MessageBase,
        amount: Decimal,
        recipient_id: RecipientId,
    },
    DomesticTransferRejected {
        base: MessageBase,
        amount: Decimal,
        recipient_id: RecipientId,
        reason: TransferRejectionReason,
    },
    DomesticTransferProgressUpdated {
        base: MessageBase,
        progress: String,
    },
    DomesticTransferScheduled {
        base: MessageBase,
        amount: Decimal,
        recipient_id: RecipientId,
        scheduled_at: DateTime<Utc>,
    },

    AutomatedTransferPending {
        base: MessageBase,
        amount: Decimal,
        recipient: InternalRef,
        rule_id: uuid::Uuid,
    },
    AutomatedTransferApproved {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    AutomatedTransferRejected {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
        reason: TransferRejectionReason,
    },
    AutomatedTransferDeposited {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },

    AutoTransferRuleConfigured {
        base: MessageBase,
        rule: AutoTransferRule,
    },

    PlatformPaymentPaid {
        base: MessageBase,
        amount: Decimal,
        payee: AccountId,
    },
    PlatformPaymentDeposited {
        base: MessageBase,
        amount: Decimal,
        payer: AccountId,
    },

    BillingCycleStarted {
        base: MessageBase,
        period: BillingPeriod,
        /// Criteria as they stood when the cycle started; `apply` resets
        /// the live snapshot, so the fee decision reads this copy.
        criteria: MaintenanceFeeCriteria,
    },
    AccountClosed {
        base: MessageBase,
        reference: Option<String>,
    },
}

impl AccountEvent {
    pub fn base(&self) -> &MessageBase {
        match self {
            Self::Created { base, .. }
            | Self::Deposited { base, .. }
            | Self::Debited { base, .. }
            | Self::MaintenanceFeeDebited { base, .. }
            | Self::MaintenanceFeeSkipped { base, .. }
            | Self::DailyDebitLimitUpdated { base, .. }
            | Self::InternalRecipientRegistered { base, .. }
            | Self::DomesticRecipientRegistered { base, .. }
            | Self::DomesticRecipientEdited { base, .. }
            | Self::InternalTransferWithinOrgPending { base, .. }
            | Self::InternalTransferWithinOrgApproved { base, .. }
            | Self::InternalTransferWithinOrgRejected { base, .. }
            | Self::InternalTransferWithinOrgDeposited { base, .. }
            | Self::InternalTransferBetweenOrgsPending { base, .. }
            | Self::InternalTransferBetweenOrgsApproved { base, .. }
            | Self::InternalTransferBetweenOrgsRejected { base, .. }
            | Self::InternalTransferBetweenOrgsDeposited { base, .. }
            | Self::InternalTransferBetweenOrgsScheduled { base, .. }
            | Self::DomesticTransferPending { base, .. }
            | Self::DomesticTransferApproved { base, .. }
            | Self::DomesticTransferRejected { base, .. }
            | Self::DomesticTransferProgressUpdated { base, .. }
            | Self::DomesticTransferScheduled { base, .. }
            | Self::AutomatedTransferPending { base, .. }
            | Self::AutomatedTransferApproved { base, .. }
            | Self::AutomatedTransferRejected { base, .. }
            | Self::AutomatedTransferDeposited { base, .. }
            | Self::AutoTransferRuleConfigured { base, .. }
            | Self::PlatformPaymentPaid { base, .. }
            | Self::PlatformPaymentDeposited { base, .. }
            | Self::BillingCycleStarted { base, .. }
            | Self::AccountClosed { base, .. } => base,
        }
    }

    /// Short name for logs and journal tags.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Created",
            Self::Deposited { .. } => "Deposited",
            Self::Debited { .. } => "Debited",
            Self::MaintenanceFeeDebited { .. } => "MaintenanceFeeDebited",
            Self::MaintenanceFeeSkipped { .. } => "MaintenanceFeeSkipped",
            Self::DailyDebitLimitUpdated { .. } => "DailyDebitLimitUpdated",
            Self::InternalRecipientRegistered { .. } => "InternalRecipientRegistered",
            Self::DomesticRecipientRegistered { .. } => "DomesticRecipientRegistered",
            Self::DomesticRecipientEdited { .. } => "DomesticRecipientEdited",
            Self::InternalTransferWithinOrgPending { .. } => "InternalTransferWithinOrgPending",
            Self::InternalTransferWithinOrgApproved { .. } => "InternalTransferWithinOrgApproved",
            Self::InternalTransferWithinOrgRejected { .. } => "InternalTransferWithinOrgRejected",
            Self::InternalTransferWithinOrgDeposited { .. } => "InternalTransferWithinOrgDeposited",
            Self::InternalTransferBetweenOrgsPending { .. } => "InternalTransferBetweenOrgsPending",
            Self::InternalTransferBetweenOrgsApproved { .. } => {
                "InternalTransferBetweenOrgsApproved"
            }
            Self::InternalTransferBetweenOrgsRejected { .. } => {
                "InternalTransferBetweenOrgsRejected"
            }
            Self::InternalTransferBetweenOrgsDeposited { .. } => {
                "InternalTransferBetweenOrgsDeposited"
            }
            Self::InternalTransferBetweenOrgsScheduled { .. } => {
                "InternalTransferBetweenOrgsScheduled"
            }
            Self::DomesticTransferPending { .. } => "DomesticTransferPending",
            Self::DomesticTransferApproved { .. } => "DomesticTransferApproved",
            Self::DomesticTransferRejected { .. } => "DomesticTransferRejected",
            Self::DomesticTransferProgressUpdated { .. } => "DomesticTransferProgressUpdated",
            Self::DomesticTransferScheduled { .. } => "DomesticTransferScheduled",
            Self::AutomatedTransferPending { .. } => "AutomatedTransferPending",
            Self::AutomatedTransferApproved { .. } => "AutomatedTransferApproved",
            Self::AutomatedTransferRejected { .. } => "AutomatedTransferRejected",
            Self::AutomatedTransferDeposited { .. } => "AutomatedTransferDeposited",
            Self::AutoTransferRuleConfigured { .. } => "AutoTransferRuleConfigured",
            Self::PlatformPaymentPaid { .. } => "PlatformPaymentPaid",
            Self::PlatformPaymentDeposited { .. } => "PlatformPaymentDeposited",
            Self::BillingCycleStarted { .. } => "BillingCycleStarted",
            Self::AccountClosed { .. } => "AccountClosed",
        }
    }

    /// Balance movement caused by this event. Pending transfers debit at
    /// pending time; rejections refund; approvals change nothing.
    pub fn money_transaction(&self) -> Option<MoneyFlow> {
        match self {
            Self::Created {
                initial_deposit, ..
            } if *initial_deposit > Decimal::ZERO => Some(MoneyFlow::In(*initial_deposit)),
            Self::Deposited { amount, .. }
            | Self::InternalTransferWithinOrgDeposited { amount, .. }
            | Self::InternalTransferBetweenOrgsDeposited { amount, .. }
            | Self::AutomatedTransferDeposited { amount, .. }
            | Self::PlatformPaymentDeposited { amount, .. }
            | Self::InternalTransferWithinOrgRejected { amount, .. }
            | Self::InternalTransferBetweenOrgsRejected { amount, .. }
            | Self::DomesticTransferRejected { amount, .. }
            | Self::AutomatedTransferRejected { amount, .. } => Some(MoneyFlow::In(*amount)),
            Self::Debited { amount, .. }
            | Self::MaintenanceFeeDebited { amount, .. }
            | Self::InternalTransferWithinOrgPending { amount, .. }
            | Self::InternalTransferBetweenOrgsPending { amount, .. }
            | Self::DomesticTransferPending { amount, .. }
            | Self::AutomatedTransferPending { amount, .. }
            | Self::PlatformPaymentPaid { amount, .. } => Some(MoneyFlow::Out(*amount)),
            _ => None,
        }
    }

    /// Automated transfers never re-trigger per-transaction rules.
    pub fn is_automated_transfer(&self) -> bool {
        matches!(
            self,
            Self::AutomatedTransferPending { .. }
                | Self::AutomatedTransferApproved { .. }
                | Self::AutomatedTransferRejected { .. }
                | Self::AutomatedTransferDeposited { .. }
        )
    }
}
