use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, AccountOwner, AutoTransferRule, BillingPeriod, CardId, DomesticRecipient,
    EmployeeId, InternalRef, MaintenanceFeeCriteria, MessageBase, RecipientId, TransferKind,
    TransferRecipient, TransferRejectionReason, TransferSender,
};

/// Echo of the card purchase a debit command originates from. Carried
/// through so a decline can be routed back to the employee actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePurchase {
    pub employee_id: EmployeeId,
    pub card_id: CardId,
    pub card_last4: String,
    pub merchant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountCommand {
    Create {
        base: MessageBase,
        owner: AccountOwner,
        currency: String,
        initial_deposit: Decimal,
    },
    DepositCash {
        base: MessageBase,
        amount: Decimal,
    },
    /// Card-backed debit issued by an employee actor.
    Debit {
        base: MessageBase,
        amount: Decimal,
        purchase: EmployeePurchase,
    },
    UpdateDailyDebitLimit {
        base: MessageBase,
        limit: Decimal,
    },
    RegisterInternalRecipient {
        base: MessageBase,
        recipient: TransferRecipient,
    },
    RegisterDomesticRecipient {
        base: MessageBase,
        recipient: DomesticRecipient,
    },
    EditDomesticRecipient {
        base: MessageBase,
        recipient: DomesticRecipient,
    },

    InternalTransferWithinOrg {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    InternalTransferBetweenOrgs {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
    },
    ScheduleInternalTransferBetweenOrgs {
        base: MessageBase,
        amount: Decimal,
        recipient_id: AccountId,
        scheduled_at: DateTime<Utc>,
    },
    /// Sender-side automated transfer computed by a rule on the recipient
    /// or on this account.
    InternalAutoTransfer {
        base: MessageBase,
        amount: Decimal,
        recipient: InternalRef,
        rule_id: uuid::Uuid,
    },
    /// Coordinator verdicts against the sender's pending transfer.
    ApproveInternalTransfer {
        base: MessageBase,
        kind: TransferKind,
    },
    RejectInternalTransfer {
        base: MessageBase,
        kind: TransferKind,
        reason: TransferRejectionReason,
    },
    /// Recipient-side deposits, correlation id shared with the sender.
    DepositTransferWithinOrg {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },
    DepositTransferBetweenOrgs {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },
    DepositAutoTransfer {
        base: MessageBase,
        amount: Decimal,
        sender: TransferSender,
    },

    DomesticTransfer {
        base: MessageBase,
        amount: Decimal,
        recipient_id: RecipientId,
    },
    ScheduleDomesticTransfer {
        base: MessageBase,
        amount: Decimal,
        recipient_id: RecipientId,
        scheduled_at: DateTime<Utc>,
    },
    ApproveDomesticTransfer {
        base: MessageBase,
    },
    RejectDomesticTransfer {
        base: MessageBase,
        reason: TransferRejectionReason,
    },
    UpdateDomesticTransferProgress {
        base: MessageBase,
        progress: String,
    },

    ConfigureAutoTransferRule {
        base: MessageBase,
        rule: AutoTransferRule,
    },

    PlatformPayment {
        base: MessageBase,
        amount: Decimal,
        payee: AccountId,
    },
    DepositPlatformPayment {
        base: MessageBase,
        amount: Decimal,
        payer: AccountId,
    },

    StartBillingCycle {
        base: MessageBase,
        period: BillingPeriod,
    },
    MaintenanceFee {
        base: MessageBase,
        amount: Decimal,
    },
    SkipMaintenanceFee {
        base: MessageBase,
        criteria: MaintenanceFeeCriteria,
    },

    CloseAccount {
        base: MessageBase,
        reference: Option<String>,
    },
}

impl AccountCommand {
    pub fn base(&self) -> &MessageBase {
        match self {
            Self::Create { base, .. }
            | Self::DepositCash { base, .. }
            | Self::Debit { base, .. }
            | Self::UpdateDailyDebitLimit { base, .. }
            | Self::RegisterInternalRecipient { base, .. }
            | Self::RegisterDomesticRecipient { base, .. }
            | Self::EditDomesticRecipient { base, .. }
            | Self::InternalTransferWithinOrg { base, .. }
            | Self::InternalTransferBetweenOrgs { base, .. }
            | Self::ScheduleInternalTransferBetweenOrgs { base, .. }
            | Self::InternalAutoTransfer { base, .. }
            | Self::ApproveInternalTransfer { base, .. }
            | Self::RejectInternalTransfer { base, .. }
            | Self::DepositTransferWithinOrg { base, .. }
            | Self::DepositTransferBetweenOrgs { base, .. }
            | Self::DepositAutoTransfer { base, .. }
            | Self::DomesticTransfer { base, .. }
            | Self::ScheduleDomesticTransfer { base, .. }
            | Self::ApproveDomesticTransfer { base, .. }
            | Self::RejectDomesticTransfer { base, .. }
            | Self::UpdateDomesticTransferProgress { base, .. }
            | Self::ConfigureAutoTransferRule { base, .. }
            | Self::PlatformPayment { base, .. }
            | Self::DepositPlatformPayment { base, .. }
            | Self::StartBillingCycle { base, .. }
            | Self::MaintenanceFee { base, .. }
            | Self::SkipMaintenanceFee { base, .. }
            | Self::CloseAccount { base, .. } => base,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.base().entity_id
    }

    /// Commands a closed account still accepts while its in-flight
    /// transfers drain.
    pub fn accepted_while_closed(&self) -> bool {
        matches!(
            self,
            Self::ApproveInternalTransfer { .. }
                | Self::RejectInternalTransfer { .. }
                | Self::ApproveDomesticTransfer { .. }
                | Self::RejectDomesticTransfer { .. }
                | Self::UpdateDomesticTransferProgress { .. }
        )
    }
}
