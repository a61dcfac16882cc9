use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business-rule rejection produced by `decide`. Never persisted; reported
/// to the origin via the broadcast bus and, for card-backed debits, via a
/// compensating decline command.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("account is not active")]
    AccountNotActive,
    #[error("card is locked")]
    AccountCardLocked,
    #[error("insufficient balance: have {balance}, requested {requested}")]
    InsufficientBalance { balance: Decimal, requested: Decimal },
    #[error("daily debit limit exceeded: limit {limit}, accrued {accrued}")]
    ExceededDailyDebit { limit: Decimal, accrued: Decimal },
    #[error("monthly debit limit exceeded: limit {limit}, accrued {accrued}")]
    ExceededMonthlyDebit { limit: Decimal, accrued: Decimal },
    #[error("transfer recipient is not registered")]
    RecipientNotRegistered,
    #[error("transfer recipient is deactivated")]
    RecipientDeactivated,
    #[error("transfer already progressed to a terminal state")]
    TransferAlreadyProgressed,
    #[error("transfer progress unchanged")]
    TransferProgressNoChange,
    #[error("account is not ready to activate")]
    AccountNotReadyToActivate,
    #[error("deposit amount is too small")]
    DepositTooSmall,
    #[error("debit amount must be positive")]
    DebitAmountNotPositive,
    #[error("scheduled date must not be the default date")]
    DateNotDefault,
    #[error("sender must be registered before depositing between orgs")]
    SenderRegistrationRequired,
    #[error("validation failed on {field}: {reason}")]
    ValidationFailure { field: String, reason: String },
}

impl ValidationError {
    /// Idempotent redeliveries and stale workflow messages land here; they
    /// are logged at debug and otherwise ignored.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            Self::TransferAlreadyProgressed
                | Self::TransferProgressNoChange
                | Self::AccountNotReadyToActivate
        )
    }
}

/// Journal and snapshot store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalError {
    #[error("sequence conflict on {stream}: expected {expected}, actual {actual}")]
    Conflict {
        stream: String,
        expected: u64,
        actual: u64,
    },
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("stream not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeError {
    #[error("ask timed out after {0} ms")]
    AskTimeout(u64),
    #[error("entity unavailable: {0}")]
    EntityUnavailable(String),
    #[error("replay failed: {0}")]
    ReplayFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
