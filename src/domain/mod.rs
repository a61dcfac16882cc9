pub mod account;
pub mod employee;
mod envelope;
mod error;
mod ids;
mod transfer;

pub use account::{
    AccountCommand, AccountEvent, AccountOwner, AccountState, AccountStatus, AutoTransferRule,
    BillingPeriod, BillingStatement, ComputedTransfer, CriteriaSettings, EmployeePurchase,
    Frequency, InternalRef, MaintenanceFeeCriteria, MoneyFlow, PercentSplit,
};
pub use employee::{
    Card, CardStatus, EmployeeCommand, EmployeeEvent, EmployeeMsgBase, EmployeeRole,
    EmployeeState, EmployeeStatus, PurchaseDeclinedReason,
};
pub use envelope::{AppendMeta, Confirmable, ConfirmationId, JournalRecord, MessageBase};
pub use error::{BankError, JournalError, RuntimeError, ValidationError};
pub use ids::{AccountId, CardId, CorrelationId, EmployeeId, EntityId, InitiatorId, OrgId};
pub use transfer::{
    Depository, DomesticRecipient, FailedDomesticTransfer, InFlightTransfer, PaymentNetwork,
    RecipientId, RecipientStatus, TransferKind, TransferRecipient, TransferRejectionReason,
    TransferSender,
};
