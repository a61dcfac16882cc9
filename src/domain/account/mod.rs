mod apply;
mod auto_transfer;
mod billing;
mod command;
mod decide;
mod event;

pub use apply::apply;
pub use auto_transfer::{
    AutoTransferRule, ComputedTransfer, Frequency, InternalRef, PercentSplit,
    compute_auto_transfers,
};
pub use billing::{BillingPeriod, BillingStatement, CriteriaSettings, maintenance_fee_criteria};
pub use command::{AccountCommand, EmployeePurchase};
pub use decide::{BatchRejection, decide, decide_many};
pub use event::{AccountEvent, MoneyFlow};

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, CorrelationId, FailedDomesticTransfer, InFlightTransfer, OrgId, RecipientId,
    TransferRecipient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    /// Closed accounts refuse new business but keep accepting terminal
    /// events for in-flight transfers until drained.
    Closed,
    /// Terminal. Only journal deletion is accepted.
    ReadyForDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOwner {
    pub full_name: String,
    pub email: String,
}

/// Maintenance-fee skip criteria, maintained incrementally between billing
/// cycles. The fee is skipped iff either criterion holds at cycle time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceFeeCriteria {
    /// Flips true on the first qualifying deposit of the cycle.
    pub qualifying_deposit_found: bool,
    /// Flips false the moment the balance dips below the threshold.
    pub daily_balance_threshold_met: bool,
}

impl MaintenanceFeeCriteria {
    pub fn reset() -> Self {
        Self {
            qualifying_deposit_found: false,
            daily_balance_threshold_met: true,
        }
    }

    pub fn fee_waived(&self) -> bool {
        self.qualifying_deposit_found || self.daily_balance_threshold_met
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub status: AccountStatus,
    pub balance: Decimal,
    pub currency: String,
    pub owner: AccountOwner,

    pub daily_debit_limit: Option<Decimal>,
    pub monthly_debit_limit: Option<Decimal>,
    pub daily_debit_accrued: Decimal,
    pub monthly_debit_accrued: Decimal,
    pub last_debit_date: Option<NaiveDate>,

    pub recipients: HashMap<RecipientId, TransferRecipient>,
    pub in_flight_transfers: HashMap<CorrelationId, InFlightTransfer>,
    pub failed_domestic_transfers: HashMap<CorrelationId, FailedDomesticTransfer>,

    pub maintenance_fee_criteria: MaintenanceFeeCriteria,
    pub auto_transfer_rules: Vec<AutoTransferRule>,
    pub last_billing_cycle: Option<BillingPeriod>,
}

impl AccountState {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// No in-flight transfers left; a closed account in this state is
    /// ready for deletion.
    pub fn drained(&self) -> bool {
        self.in_flight_transfers.is_empty()
    }

    pub fn has_rules_of(&self, frequency: Frequency) -> bool {
        self.auto_transfer_rules
            .iter()
            .any(|rule| rule.frequency() == frequency)
    }

    /// Daily accrual as it would stand on `date`, with reset-if-stale.
    pub fn daily_accrued_on(&self, date: NaiveDate) -> Decimal {
        if self.last_debit_date == Some(date) {
            self.daily_debit_accrued
        } else {
            Decimal::ZERO
        }
    }

    /// Monthly accrual as it would stand in `date`'s month.
    pub fn monthly_accrued_in(&self, date: NaiveDate) -> Decimal {
        match self.last_debit_date {
            Some(last) if same_month(last, date) => self.monthly_debit_accrued,
            _ => Decimal::ZERO,
        }
    }
}

pub(crate) fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    use chrono::Datelike;
    a.year() == b.year() && a.month() == b.month()
}
