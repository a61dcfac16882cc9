use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::AccountId;

use super::{AccountEvent, MaintenanceFeeCriteria, MoneyFlow};

/// Month a billing cycle covers. `BillingCycleStarted` may appear at most
/// once per period per account.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub month: u32,
    pub year: i32,
}

impl BillingPeriod {
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self {
            month: timestamp.month(),
            year: timestamp.year(),
        }
    }
}

/// Monthly statement appended to the billing-statement store when a cycle
/// starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingStatement {
    pub account_id: AccountId,
    pub period: BillingPeriod,
    pub closing_balance: Decimal,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct CriteriaSettings {
    pub qualifying_deposit: Decimal,
    pub daily_balance_threshold: Decimal,
}

impl CriteriaSettings {
    /// Thresholds of the standard account product. Baked into the domain
    /// so `apply` stays pure; the fold below takes settings explicitly
    /// for tests and non-standard products.
    pub const STANDARD: Self = Self {
        qualifying_deposit: rust_decimal_macros::dec!(250),
        daily_balance_threshold: rust_decimal_macros::dec!(1500),
    };
}

/// Fold the maintenance-fee criteria over the events of the lookback
/// window. This is what the account actor runs when a billing cycle
/// starts. `opening_balance` is the balance just before the first event
/// of the window; `None` when the account originates inside the window,
/// in which case the balance criterion judges only balances the account
/// actually held.
///
/// The deposit criterion short-circuits: once a qualifying deposit is
/// seen, later balance movements cannot change the outcome of that
/// criterion, so scanning for it stops. The balance criterion fails the
/// moment any intermediate balance dips below the threshold.
pub fn maintenance_fee_criteria<'a>(
    events: impl IntoIterator<Item = &'a AccountEvent>,
    opening_balance: Option<Decimal>,
    settings: CriteriaSettings,
) -> MaintenanceFeeCriteria {
    let mut balance = opening_balance.unwrap_or(Decimal::ZERO);
    let mut criteria = MaintenanceFeeCriteria {
        qualifying_deposit_found: false,
        daily_balance_threshold_met: opening_balance
            .is_none_or(|opening| opening >= settings.daily_balance_threshold),
    };

    for event in events {
        if !criteria.qualifying_deposit_found {
            if let AccountEvent::Deposited { amount, .. } = event {
                if *amount >= settings.qualifying_deposit {
                    criteria.qualifying_deposit_found = true;
                }
            }
        }

        match event.money_transaction() {
            Some(MoneyFlow::In(amount)) => balance += amount,
            Some(MoneyFlow::Out(amount)) => balance -= amount,
            None => continue,
        }

        if balance < settings.daily_balance_threshold {
            criteria.daily_balance_threshold_met = false;
        }

        if criteria.qualifying_deposit_found {
            // Both criteria settled: deposit found, and the balance
            // criterion can only stay or get worse, which no longer
            // affects the waiver.
            break;
        }
    }

    criteria
}
