use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, OrgId};

/// Key a transfer recipient is registered under. Internal recipients are
/// keyed by their account id; domestic recipients by routing + account
/// number, so editing recipient info keeps the key stable.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn internal(account_id: AccountId) -> Self {
        Self(account_id.to_string())
    }

    pub fn domestic(routing_number: &str, account_number: &str) -> Self {
        Self(format!("{routing_number}_{account_number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientStatus {
    Confirmed,
    /// The counterparty reported the account info as invalid; transfers to
    /// this recipient are refused until it is edited.
    InvalidAccount,
    /// The recipient account has since closed.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depository {
    Checking,
    Savings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentNetwork {
    Ach,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomesticRecipient {
    pub name: String,
    pub account_number: String,
    pub routing_number: String,
    pub depository: Depository,
    pub payment_network: PaymentNetwork,
    pub status: RecipientStatus,
}

impl DomesticRecipient {
    pub fn recipient_id(&self) -> RecipientId {
        RecipientId::domestic(&self.routing_number, &self.account_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TransferRecipient {
    InternalWithinOrg {
        account_id: AccountId,
        name: String,
        status: RecipientStatus,
    },
    InternalBetweenOrgs {
        account_id: AccountId,
        org_id: OrgId,
        name: String,
        status: RecipientStatus,
    },
    Domestic(DomesticRecipient),
}

impl TransferRecipient {
    pub fn recipient_id(&self) -> RecipientId {
        match self {
            Self::InternalWithinOrg { account_id, .. }
            | Self::InternalBetweenOrgs { account_id, .. } => RecipientId::internal(*account_id),
            Self::Domestic(recipient) => recipient.recipient_id(),
        }
    }

    pub fn status(&self) -> RecipientStatus {
        match self {
            Self::InternalWithinOrg { status, .. } | Self::InternalBetweenOrgs { status, .. } => {
                *status
            }
            Self::Domestic(recipient) => recipient.status,
        }
    }

    pub fn with_status(mut self, new_status: RecipientStatus) -> Self {
        match &mut self {
            Self::InternalWithinOrg { status, .. } | Self::InternalBetweenOrgs { status, .. } => {
                *status = new_status;
            }
            Self::Domestic(recipient) => recipient.status = new_status,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    WithinOrg,
    BetweenOrgs,
    Domestic,
    Automated,
}

/// Sender info a recipient account records on an inbound transfer deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSender {
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub name: String,
}

/// A transfer the sender has persisted a pending event for and whose
/// terminal event has not yet arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightTransfer {
    pub kind: TransferKind,
    pub amount: Decimal,
    pub recipient_id: RecipientId,
    pub started_at: DateTime<Utc>,
    /// Gateway-reported progress, domestic transfers only.
    pub progress: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferRejectionReason {
    InvalidAccountInfo,
    AccountClosed,
    Unknown,
}

/// Rejected domestic transfer kept on the sender so a later recipient-info
/// edit can trigger a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDomesticTransfer {
    pub amount: Decimal,
    pub recipient_id: RecipientId,
    pub reason: TransferRejectionReason,
    pub failed_at: DateTime<Utc>,
}
