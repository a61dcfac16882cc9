use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountId, OrgId};

use super::AccountState;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    PerTransaction,
    Daily,
    TwiceMonthly,
}

/// Within-org account reference an auto-transfer rule points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalRef {
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentSplit {
    pub recipient: InternalRef,
    /// Percent of the balance, 0 < percent <= 100.
    pub percent: Decimal,
}

/// Declarative rule evaluated against current account state to produce
/// internal automated transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule")]
pub enum AutoTransferRule {
    /// Move the full balance to the target after every transaction.
    ZeroBalanceSweep { rule_id: Uuid, target: InternalRef },
    /// Restore this account to a target balance; the managing account is
    /// the sender of the computed transfer.
    TargetBalanceTopUp {
        rule_id: Uuid,
        frequency: Frequency,
        target_balance: Decimal,
        managing_account: InternalRef,
    },
    /// Distribute fixed percentages of the balance across recipients.
    PercentDistribution {
        rule_id: Uuid,
        frequency: Frequency,
        splits: Vec<PercentSplit>,
    },
}

impl AutoTransferRule {
    pub fn rule_id(&self) -> Uuid {
        match self {
            Self::ZeroBalanceSweep { rule_id, .. }
            | Self::TargetBalanceTopUp { rule_id, .. }
            | Self::PercentDistribution { rule_id, .. } => *rule_id,
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Self::ZeroBalanceSweep { .. } => Frequency::PerTransaction,
            Self::TargetBalanceTopUp { frequency, .. }
            | Self::PercentDistribution { frequency, .. } => *frequency,
        }
    }
}

/// One transfer computed from a rule. `sender == state.account_id` means a
/// transfer out; otherwise this account is being restored and the sender
/// is the managing account, which receives an auto-transfer command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedTransfer {
    pub rule_id: Uuid,
    pub sender: AccountId,
    pub recipient: InternalRef,
    pub amount: Decimal,
}

pub fn compute_auto_transfers(state: &AccountState, frequency: Frequency) -> Vec<ComputedTransfer> {
    let hundred = Decimal::ONE_HUNDRED;

    state
        .auto_transfer_rules
        .iter()
        .filter(|rule| rule.frequency() == frequency)
        .flat_map(|rule| match rule {
            AutoTransferRule::ZeroBalanceSweep { rule_id, target } => {
                if state.balance > Decimal::ZERO {
                    vec![ComputedTransfer {
                        rule_id: *rule_id,
                        sender: state.account_id,
                        recipient: target.clone(),
                        amount: state.balance,
                    }]
                } else {
                    vec![]
                }
            }
            AutoTransferRule::TargetBalanceTopUp {
                rule_id,
                target_balance,
                managing_account,
                ..
            } => {
                if state.balance < *target_balance {
                    vec![ComputedTransfer {
                        rule_id: *rule_id,
                        sender: managing_account.account_id,
                        recipient: InternalRef {
                            account_id: state.account_id,
                            org_id: state.org_id,
                            name: state.owner.full_name.clone(),
                        },
                        amount: *target_balance - state.balance,
                    }]
                } else {
                    vec![]
                }
            }
            AutoTransferRule::PercentDistribution {
                rule_id, splits, ..
            } => splits
                .iter()
                .filter_map(|split| {
                    let amount = (state.balance * split.percent / hundred).round_dp(2);
                    (amount > Decimal::ZERO).then(|| ComputedTransfer {
                        rule_id: *rule_id,
                        sender: state.account_id,
                        recipient: split.recipient.clone(),
                        amount,
                    })
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::account::{
        AccountOwner, AccountStatus, BillingPeriod, MaintenanceFeeCriteria,
    };

    fn account_with(balance: Decimal, rules: Vec<AutoTransferRule>) -> AccountState {
        AccountState {
            account_id: AccountId::new(),
            org_id: OrgId::new(),
            status: AccountStatus::Active,
            balance,
            currency: "USD".into(),
            owner: AccountOwner {
                full_name: "Operating".into(),
                email: "ops@example.com".into(),
            },
            daily_debit_limit: None,
            monthly_debit_limit: None,
            daily_debit_accrued: Decimal::ZERO,
            monthly_debit_accrued: Decimal::ZERO,
            last_debit_date: None,
            recipients: Default::default(),
            in_flight_transfers: Default::default(),
            failed_domestic_transfers: Default::default(),
            maintenance_fee_criteria: MaintenanceFeeCriteria::reset(),
            auto_transfer_rules: rules,
            last_billing_cycle: None::<BillingPeriod>,
        }
    }

    fn target() -> InternalRef {
        InternalRef {
            account_id: AccountId::new(),
            org_id: OrgId::new(),
            name: "Savings".into(),
        }
    }

    #[test]
    fn sweep_moves_full_balance() {
        let state = account_with(
            dec!(320),
            vec![AutoTransferRule::ZeroBalanceSweep {
                rule_id: Uuid::new_v4(),
                target: target(),
            }],
        );

        let computed = compute_auto_transfers(&state, Frequency::PerTransaction);
        assert_eq!(computed.len(), 1);
        assert_eq!(computed[0].amount, dec!(320));
        assert_eq!(computed[0].sender, state.account_id);
    }

    #[test]
    fn sweep_is_silent_on_empty_balance() {
        let state = account_with(
            Decimal::ZERO,
            vec![AutoTransferRule::ZeroBalanceSweep {
                rule_id: Uuid::new_v4(),
                target: target(),
            }],
        );

        assert!(compute_auto_transfers(&state, Frequency::PerTransaction).is_empty());
    }

    #[test]
    fn top_up_designates_managing_account_as_sender() {
        let managing = target();
        let state = account_with(
            dec!(40),
            vec![AutoTransferRule::TargetBalanceTopUp {
                rule_id: Uuid::new_v4(),
                frequency: Frequency::Daily,
                target_balance: dec!(100),
                managing_account: managing.clone(),
            }],
        );

        let computed = compute_auto_transfers(&state, Frequency::Daily);
        assert_eq!(computed.len(), 1);
        assert_eq!(computed[0].sender, managing.account_id);
        assert_eq!(computed[0].recipient.account_id, state.account_id);
        assert_eq!(computed[0].amount, dec!(60));
    }

    #[test]
    fn percent_distribution_rounds_to_cents() {
        let state = account_with(
            dec!(100.01),
            vec![AutoTransferRule::PercentDistribution {
                rule_id: Uuid::new_v4(),
                frequency: Frequency::TwiceMonthly,
                splits: vec![
                    PercentSplit {
                        recipient: target(),
                        percent: dec!(50),
                    },
                    PercentSplit {
                        recipient: target(),
                        percent: dec!(25),
                    },
                ],
            }],
        );

        let computed = compute_auto_transfers(&state, Frequency::TwiceMonthly);
        let amounts: Vec<_> = computed.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![dec!(50.00), dec!(25.00)]);
    }

    #[test]
    fn frequency_filter_excludes_other_rules() {
        let state = account_with(
            dec!(500),
            vec![AutoTransferRule::TargetBalanceTopUp {
                rule_id: Uuid::new_v4(),
                frequency: Frequency::Daily,
                target_balance: dec!(1000),
                managing_account: target(),
            }],
        );

        assert!(compute_auto_transfers(&state, Frequency::PerTransaction).is_empty());
        assert_eq!(compute_auto_transfers(&state, Frequency::Daily).len(), 1);
    }
}
