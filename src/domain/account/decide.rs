use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    RecipientId, RecipientStatus, TransferKind, TransferRecipient, ValidationError,
};

use super::{AccountCommand, AccountEvent, AccountState, AccountStatus, apply};

/// Validate a command against current state and produce at most one event.
///
/// Pure: all date logic runs off the command's own timestamp. `state` is
/// `None` until the first `Created` event.
pub fn decide(
    state: Option<&AccountState>,
    command: &AccountCommand,
) -> Result<AccountEvent, ValidationError> {
    let Some(state) = state else {
        return match command {
            AccountCommand::Create {
                base,
                owner,
                currency,
                initial_deposit,
            } => {
                if *initial_deposit < Decimal::ZERO {
                    return Err(ValidationError::DepositTooSmall);
                }
                Ok(AccountEvent::Created {
                    base: base.clone(),
                    owner: owner.clone(),
                    currency: currency.clone(),
                    initial_deposit: *initial_deposit,
                })
            }
            _ => Err(ValidationError::AccountNotActive),
        };
    };

    match command {
        // Idempotent create: the aggregate already exists.
        AccountCommand::Create { .. } => Err(ValidationError::AccountNotReadyToActivate),

        _ if state.status == AccountStatus::ReadyForDelete => {
            Err(ValidationError::AccountNotActive)
        }

        _ if state.status == AccountStatus::Closed && !command.accepted_while_closed() => {
            Err(ValidationError::AccountNotActive)
        }

        AccountCommand::DepositCash { base, amount } => {
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DepositTooSmall);
            }
            Ok(AccountEvent::Deposited {
                base: base.clone(),
                amount: *amount,
            })
        }

        AccountCommand::Debit {
            base,
            amount,
            purchase,
        } => {
            check_debit(state, *amount, base.timestamp)?;
            Ok(AccountEvent::Debited {
                base: base.clone(),
                amount: *amount,
                purchase: purchase.clone(),
            })
        }

        AccountCommand::UpdateDailyDebitLimit { base, limit } => {
            if *limit <= Decimal::ZERO {
                return Err(ValidationError::ValidationFailure {
                    field: "limit".into(),
                    reason: "daily debit limit must be positive".into(),
                });
            }
            Ok(AccountEvent::DailyDebitLimitUpdated {
                base: base.clone(),
                limit: *limit,
            })
        }

        AccountCommand::RegisterInternalRecipient { base, recipient } => {
            if let TransferRecipient::Domestic(_) = recipient {
                return Err(ValidationError::ValidationFailure {
                    field: "recipient".into(),
                    reason: "domestic recipients register through RegisterDomesticRecipient".into(),
                });
            }
            Ok(AccountEvent::InternalRecipientRegistered {
                base: base.clone(),
                recipient: recipient.clone(),
            })
        }

        AccountCommand::RegisterDomesticRecipient { base, recipient } => {
            Ok(AccountEvent::DomesticRecipientRegistered {
                base: base.clone(),
                recipient: recipient.clone(),
            })
        }

        AccountCommand::EditDomesticRecipient { base, recipient } => {
            let id = recipient.recipient_id();
            if !state.recipients.contains_key(&id) {
                return Err(ValidationError::RecipientNotRegistered);
            }
            Ok(AccountEvent::DomesticRecipientEdited {
                base: base.clone(),
                recipient: recipient.clone(),
            })
        }

        AccountCommand::InternalTransferWithinOrg {
            base,
            amount,
            recipient_id,
        } => {
            check_internal_recipient(state, *recipient_id)?;
            check_transfer_out(state, *amount)?;
            Ok(AccountEvent::InternalTransferWithinOrgPending {
                base: base.clone(),
                amount: *amount,
                recipient_id: *recipient_id,
            })
        }

        AccountCommand::InternalTransferBetweenOrgs {
            base,
            amount,
            recipient_id,
        } => {
            check_internal_recipient(state, *recipient_id)?;
            check_transfer_out(state, *amount)?;
            Ok(AccountEvent::InternalTransferBetweenOrgsPending {
                base: base.clone(),
                amount: *amount,
                recipient_id: *recipient_id,
            })
        }

        AccountCommand::ScheduleInternalTransferBetweenOrgs {
            base,
            amount,
            recipient_id,
            scheduled_at,
        } => {
            check_internal_recipient(state, *recipient_id)?;
            check_schedule_date(*scheduled_at)?;
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DebitAmountNotPositive);
            }
            Ok(AccountEvent::InternalTransferBetweenOrgsScheduled {
                base: base.clone(),
                amount: *amount,
                recipient_id: *recipient_id,
                scheduled_at: *scheduled_at,
            })
        }

        AccountCommand::InternalAutoTransfer {
            base,
            amount,
            recipient,
            rule_id,
        } => {
            check_transfer_out(state, *amount)?;
            Ok(AccountEvent::AutomatedTransferPending {
                base: base.clone(),
                amount: *amount,
                recipient: recipient.clone(),
                rule_id: *rule_id,
            })
        }

        AccountCommand::ApproveInternalTransfer { base, kind } => {
            let transfer = state
                .in_flight_transfers
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            let amount = transfer.amount;
            match kind {
                TransferKind::WithinOrg => Ok(AccountEvent::InternalTransferWithinOrgApproved {
                    base: base.clone(),
                    amount,
                    recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                }),
                TransferKind::BetweenOrgs => {
                    Ok(AccountEvent::InternalTransferBetweenOrgsApproved {
                        base: base.clone(),
                        amount,
                        recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                    })
                }
                TransferKind::Automated => Ok(AccountEvent::AutomatedTransferApproved {
                    base: base.clone(),
                    amount,
                    recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                }),
                TransferKind::Domestic => Err(ValidationError::ValidationFailure {
                    field: "kind".into(),
                    reason: "domestic transfers approve through ApproveDomesticTransfer".into(),
                }),
            }
        }

        AccountCommand::RejectInternalTransfer { base, kind, reason } => {
            let transfer = state
                .in_flight_transfers
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            let amount = transfer.amount;
            match kind {
                TransferKind::WithinOrg => Ok(AccountEvent::InternalTransferWithinOrgRejected {
                    base: base.clone(),
                    amount,
                    recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                    reason: *reason,
                }),
                TransferKind::BetweenOrgs => {
                    Ok(AccountEvent::InternalTransferBetweenOrgsRejected {
                        base: base.clone(),
                        amount,
                        recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                        reason: *reason,
                    })
                }
                TransferKind::Automated => Ok(AccountEvent::AutomatedTransferRejected {
                    base: base.clone(),
                    amount,
                    recipient_id: internal_recipient_account(&transfer.recipient_id)?,
                    reason: *reason,
                }),
                TransferKind::Domestic => Err(ValidationError::ValidationFailure {
                    field: "kind".into(),
                    reason: "domestic transfers reject through RejectDomesticTransfer".into(),
                }),
            }
        }

        AccountCommand::DepositTransferWithinOrg {
            base,
            amount,
            sender,
        } => {
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DepositTooSmall);
            }
            Ok(AccountEvent::InternalTransferWithinOrgDeposited {
                base: base.clone(),
                amount: *amount,
                sender: sender.clone(),
            })
        }

        AccountCommand::DepositTransferBetweenOrgs {
            base,
            amount,
            sender,
        } => {
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DepositTooSmall);
            }
            // Between-org money is only accepted from registered senders.
            let sender_key = RecipientId::internal(sender.account_id);
            if !state.recipients.contains_key(&sender_key) {
                return Err(ValidationError::SenderRegistrationRequired);
            }
            Ok(AccountEvent::InternalTransferBetweenOrgsDeposited {
                base: base.clone(),
                amount: *amount,
                sender: sender.clone(),
            })
        }

        AccountCommand::DepositAutoTransfer {
            base,
            amount,
            sender,
        } => {
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DepositTooSmall);
            }
            Ok(AccountEvent::AutomatedTransferDeposited {
                base: base.clone(),
                amount: *amount,
                sender: sender.clone(),
            })
        }

        AccountCommand::DomesticTransfer {
            base,
            amount,
            recipient_id,
        } => {
            let recipient = domestic_recipient(state, recipient_id)?;
            // A retry of a previously failed transfer reuses its
            // correlation id; anything else with a known id is a duplicate.
            let is_retry = state
                .failed_domestic_transfers
                .contains_key(&base.correlation_id);
            if !is_retry && state.in_flight_transfers.contains_key(&base.correlation_id) {
                return Err(ValidationError::TransferAlreadyProgressed);
            }
            check_transfer_out(state, *amount)?;
            Ok(AccountEvent::DomesticTransferPending {
                base: base.clone(),
                amount: *amount,
                recipient,
            })
        }

        AccountCommand::ScheduleDomesticTransfer {
            base,
            amount,
            recipient_id,
            scheduled_at,
        } => {
            domestic_recipient(state, recipient_id)?;
            check_schedule_date(*scheduled_at)?;
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DebitAmountNotPositive);
            }
            Ok(AccountEvent::DomesticTransferScheduled {
                base: base.clone(),
                amount: *amount,
                recipient_id: recipient_id.clone(),
                scheduled_at: *scheduled_at,
            })
        }

        AccountCommand::ApproveDomesticTransfer { base } => {
            let transfer = state
                .in_flight_transfers
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            Ok(AccountEvent::DomesticTransferApproved {
                base: base.clone(),
                amount: transfer.amount,
                recipient_id: transfer.recipient_id.clone(),
            })
        }

        AccountCommand::RejectDomesticTransfer { base, reason } => {
            let transfer = state
                .in_flight_transfers
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            Ok(AccountEvent::DomesticTransferRejected {
                base: base.clone(),
                amount: transfer.amount,
                recipient_id: transfer.recipient_id.clone(),
                reason: *reason,
            })
        }

        AccountCommand::UpdateDomesticTransferProgress { base, progress } => {
            let transfer = state
                .in_flight_transfers
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            if transfer.progress.as_deref() == Some(progress.as_str()) {
                return Err(ValidationError::TransferProgressNoChange);
            }
            Ok(AccountEvent::DomesticTransferProgressUpdated {
                base: base.clone(),
                progress: progress.clone(),
            })
        }

        AccountCommand::ConfigureAutoTransferRule { base, rule } => {
            Ok(AccountEvent::AutoTransferRuleConfigured {
                base: base.clone(),
                rule: rule.clone(),
            })
        }

        AccountCommand::PlatformPayment {
            base,
            amount,
            payee,
        } => {
            check_transfer_out(state, *amount)?;
            Ok(AccountEvent::PlatformPaymentPaid {
                base: base.clone(),
                amount: *amount,
                payee: *payee,
            })
        }

        AccountCommand::DepositPlatformPayment {
            base,
            amount,
            payer,
        } => {
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DepositTooSmall);
            }
            Ok(AccountEvent::PlatformPaymentDeposited {
                base: base.clone(),
                amount: *amount,
                payer: *payer,
            })
        }

        AccountCommand::StartBillingCycle { base, period } => {
            if state.last_billing_cycle == Some(*period) {
                return Err(ValidationError::ValidationFailure {
                    field: "billing_cycle".into(),
                    reason: format!("cycle {}/{} already started", period.month, period.year),
                });
            }
            Ok(AccountEvent::BillingCycleStarted {
                base: base.clone(),
                period: *period,
                criteria: state.maintenance_fee_criteria,
            })
        }

        AccountCommand::MaintenanceFee { base, amount } => {
            if state.balance - *amount < Decimal::ZERO - overdraft(state) {
                return Err(ValidationError::InsufficientBalance {
                    balance: state.balance,
                    requested: *amount,
                });
            }
            Ok(AccountEvent::MaintenanceFeeDebited {
                base: base.clone(),
                amount: *amount,
            })
        }

        AccountCommand::SkipMaintenanceFee { base, criteria } => {
            Ok(AccountEvent::MaintenanceFeeSkipped {
                base: base.clone(),
                criteria: *criteria,
            })
        }

        AccountCommand::CloseAccount { base, reference } => Ok(AccountEvent::AccountClosed {
            base: base.clone(),
            reference: reference.clone(),
        }),
    }
}

/// Rejection of an all-or-nothing command batch: the first offending
/// command with its error.
#[derive(Debug, Clone)]
pub struct BatchRejection {
    pub command: AccountCommand,
    pub error: ValidationError,
}

/// Validate a batch against a threaded shadow state. Either every command
/// produces its event, or the whole batch is rejected.
pub fn decide_many(
    state: Option<&AccountState>,
    commands: &[AccountCommand],
) -> Result<Vec<AccountEvent>, BatchRejection> {
    let mut shadow = state.cloned();
    let mut events = Vec::with_capacity(commands.len());

    for command in commands {
        match decide(shadow.as_ref(), command) {
            Ok(event) => {
                shadow = Some(apply(shadow, &event));
                events.push(event);
            }
            Err(error) => {
                return Err(BatchRejection {
                    command: command.clone(),
                    error,
                });
            }
        }
    }

    Ok(events)
}

fn overdraft(_state: &AccountState) -> Decimal {
    // Per-account overdraft products would hang off the state here; the
    // default allowance is zero.
    Decimal::ZERO
}

fn check_debit(
    state: &AccountState,
    amount: Decimal,
    at: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::DebitAmountNotPositive);
    }
    if state.balance - amount < Decimal::ZERO - overdraft(state) {
        return Err(ValidationError::InsufficientBalance {
            balance: state.balance,
            requested: amount,
        });
    }

    let today = at.date_naive();
    if let Some(limit) = state.daily_debit_limit {
        let accrued = state.daily_accrued_on(today);
        if accrued + amount > limit {
            return Err(ValidationError::ExceededDailyDebit { limit, accrued });
        }
    }
    if let Some(limit) = state.monthly_debit_limit {
        let accrued = state.monthly_accrued_in(today);
        if accrued + amount > limit {
            return Err(ValidationError::ExceededMonthlyDebit { limit, accrued });
        }
    }

    Ok(())
}

fn check_transfer_out(state: &AccountState, amount: Decimal) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::DebitAmountNotPositive);
    }
    if state.balance - amount < Decimal::ZERO - overdraft(state) {
        return Err(ValidationError::InsufficientBalance {
            balance: state.balance,
            requested: amount,
        });
    }
    Ok(())
}

fn check_internal_recipient(
    state: &AccountState,
    recipient_id: crate::domain::AccountId,
) -> Result<(), ValidationError> {
    let key = RecipientId::internal(recipient_id);
    let recipient = state
        .recipients
        .get(&key)
        .ok_or(ValidationError::RecipientNotRegistered)?;
    if recipient.status() != RecipientStatus::Confirmed {
        return Err(ValidationError::RecipientDeactivated);
    }
    Ok(())
}

fn domestic_recipient(
    state: &AccountState,
    recipient_id: &RecipientId,
) -> Result<crate::domain::DomesticRecipient, ValidationError> {
    match state.recipients.get(recipient_id) {
        Some(TransferRecipient::Domestic(recipient)) => {
            if recipient.status == RecipientStatus::Closed {
                return Err(ValidationError::RecipientDeactivated);
            }
            Ok(recipient.clone())
        }
        Some(_) => Err(ValidationError::ValidationFailure {
            field: "recipient".into(),
            reason: "recipient is not a domestic recipient".into(),
        }),
        None => Err(ValidationError::RecipientNotRegistered),
    }
}

fn internal_recipient_account(
    recipient_id: &RecipientId,
) -> Result<crate::domain::AccountId, ValidationError> {
    recipient_id
        .as_str()
        .parse()
        .map_err(|_| ValidationError::ValidationFailure {
            field: "recipient_id".into(),
            reason: "in-flight transfer does not reference an internal account".into(),
        })
}

fn check_schedule_date(scheduled_at: DateTime<Utc>) -> Result<(), ValidationError> {
    if scheduled_at == DateTime::<Utc>::default() {
        return Err(ValidationError::DateNotDefault);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{
        AccountId, AccountOwner, CorrelationId, InitiatorId, MessageBase, OrgId, RecipientId,
        TransferRecipient, TransferRejectionReason,
    };
    use crate::domain::account::{BillingPeriod, EmployeePurchase};

    fn base_for(account_id: AccountId, org_id: OrgId) -> MessageBase {
        MessageBase::new(account_id, org_id, InitiatorId::new())
    }

    fn opened_account(initial: Decimal) -> AccountState {
        let account_id = AccountId::new();
        let org_id = OrgId::new();
        let event = decide(
            None,
            &AccountCommand::Create {
                base: base_for(account_id, org_id),
                owner: AccountOwner {
                    full_name: "Ada Operator".into(),
                    email: "ada@example.com".into(),
                },
                currency: "USD".into(),
                initial_deposit: initial,
            },
        )
        .unwrap();
        apply(None, &event)
    }

    fn run(state: &mut AccountState, command: AccountCommand) -> AccountEvent {
        let event = decide(Some(state), &command).unwrap();
        *state = apply(Some(state.clone()), &event);
        event
    }

    fn purchase() -> EmployeePurchase {
        EmployeePurchase {
            employee_id: crate::domain::EmployeeId::new(),
            card_id: crate::domain::CardId::new(),
            card_last4: "4242".into(),
            merchant: "coffee".into(),
        }
    }

    fn register_within_org(state: &mut AccountState, recipient: AccountId) {
        run(
            state,
            AccountCommand::RegisterInternalRecipient {
                base: base_for(state.account_id, state.org_id),
                recipient: TransferRecipient::InternalWithinOrg {
                    account_id: recipient,
                    name: "Peer".into(),
                    status: crate::domain::RecipientStatus::Confirmed,
                },
            },
        );
    }

    #[test]
    fn commands_against_absent_account_are_refused() {
        let err = decide(
            None,
            &AccountCommand::DepositCash {
                base: base_for(AccountId::new(), OrgId::new()),
                amount: dec!(10),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::AccountNotActive);
    }

    #[test]
    fn duplicate_create_is_an_idempotent_noop_error() {
        let state = opened_account(dec!(100));
        let err = decide(
            Some(&state),
            &AccountCommand::Create {
                base: base_for(state.account_id, state.org_id),
                owner: state.owner.clone(),
                currency: "USD".into(),
                initial_deposit: dec!(0),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::AccountNotReadyToActivate);
        assert!(err.is_noop());
    }

    #[test]
    fn debit_with_insufficient_balance_produces_no_event() {
        let state = opened_account(dec!(10));
        let err = decide(
            Some(&state),
            &AccountCommand::Debit {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(20),
                purchase: purchase(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientBalance {
                balance: dec!(10),
                requested: dec!(20),
            }
        );
    }

    #[test]
    fn debit_accrues_and_resets_daily_counter_by_date() {
        let mut state = opened_account(dec!(1000));
        let debit_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::Debit {
                base: debit_base,
                amount: dec!(30),
                purchase: purchase(),
            },
        );
        assert_eq!(state.balance, dec!(970));
        assert_eq!(state.daily_debit_accrued, dec!(30));

        // Same day accumulates.
        let debit_base2 = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::Debit {
                base: debit_base2,
                amount: dec!(20),
                purchase: purchase(),
            },
        );
        assert_eq!(state.daily_debit_accrued, dec!(50));

        // A stale last-debit date resets the counter to this amount.
        let mut stale = state.clone();
        stale.last_debit_date = Some(
            Utc::now().date_naive().pred_opt().unwrap(),
        );
        let mut next_day = stale.clone();
        run(
            &mut next_day,
            AccountCommand::Debit {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(5),
                purchase: purchase(),
            },
        );
        assert_eq!(next_day.daily_debit_accrued, dec!(5));
    }

    #[test]
    fn daily_limit_is_enforced_against_todays_accrual() {
        let mut state = opened_account(dec!(1000));
        let limit_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::UpdateDailyDebitLimit {
                base: limit_base,
                limit: dec!(100),
            },
        );
        let debit_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::Debit {
                base: debit_base,
                amount: dec!(80),
                purchase: purchase(),
            },
        );

        let err = decide(
            Some(&state),
            &AccountCommand::Debit {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(30),
                purchase: purchase(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ExceededDailyDebit {
                limit: dec!(100),
                accrued: dec!(80),
            }
        );
    }

    #[test]
    fn transfer_to_unregistered_recipient_is_refused() {
        let state = opened_account(dec!(1000));
        let err = decide(
            Some(&state),
            &AccountCommand::InternalTransferWithinOrg {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(100),
                recipient_id: AccountId::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::RecipientNotRegistered);
    }

    #[test]
    fn transfer_lifecycle_keeps_correlation_id_and_refunds_on_rejection() {
        let mut state = opened_account(dec!(1000));
        let recipient = AccountId::new();
        register_within_org(&mut state, recipient);

        let base = base_for(state.account_id, state.org_id);
        let pending = decide(
            Some(&state),
            &AccountCommand::InternalTransferWithinOrg {
                base: base.clone(),
                amount: dec!(200),
                recipient_id: recipient,
            },
        )
        .unwrap();
        state = apply(Some(state), &pending);
        assert_eq!(state.balance, dec!(800));
        assert!(state.in_flight_transfers.contains_key(&base.correlation_id));

        let rejected = decide(
            Some(&state),
            &AccountCommand::RejectInternalTransfer {
                base: base.follow_up(),
                kind: TransferKind::WithinOrg,
                reason: TransferRejectionReason::InvalidAccountInfo,
            },
        )
        .unwrap();
        assert_eq!(rejected.base().correlation_id, base.correlation_id);
        state = apply(Some(state), &rejected);
        assert_eq!(state.balance, dec!(1000));
        assert!(state.in_flight_transfers.is_empty());

        // A second terminal verdict is a stale workflow message.
        let err = decide(
            Some(&state),
            &AccountCommand::ApproveInternalTransfer {
                base: base.follow_up(),
                kind: TransferKind::WithinOrg,
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::TransferAlreadyProgressed);
    }

    #[test]
    fn between_orgs_deposit_requires_registered_sender() {
        let state = opened_account(dec!(0));
        let err = decide(
            Some(&state),
            &AccountCommand::DepositTransferBetweenOrgs {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(50),
                sender: crate::domain::TransferSender {
                    account_id: AccountId::new(),
                    org_id: OrgId::new(),
                    name: "Stranger".into(),
                },
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::SenderRegistrationRequired);
    }

    #[test]
    fn domestic_rejection_with_invalid_info_is_kept_for_retry() {
        let mut state = opened_account(dec!(1000));
        let recipient = crate::domain::DomesticRecipient {
            name: "Util Co".into(),
            account_number: "000111222".into(),
            routing_number: "123456789".into(),
            depository: crate::domain::Depository::Checking,
            payment_network: crate::domain::PaymentNetwork::Ach,
            status: crate::domain::RecipientStatus::Confirmed,
        };
        let recipient_id = recipient.recipient_id();
        let register_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::RegisterDomesticRecipient {
                base: register_base,
                recipient: recipient.clone(),
            },
        );

        let base = base_for(state.account_id, state.org_id);
        run_with_base(&mut state, |b| AccountCommand::DomesticTransfer {
            base: b,
            amount: dec!(75),
            recipient_id: recipient_id.clone(),
        }, base.clone());

        run_with_base(&mut state, |b| AccountCommand::RejectDomesticTransfer {
            base: b,
            reason: TransferRejectionReason::InvalidAccountInfo,
        }, base.follow_up());

        assert_eq!(state.balance, dec!(1000));
        let failed = &state.failed_domestic_transfers[&base.correlation_id];
        assert_eq!(failed.amount, dec!(75));
        assert_eq!(
            state.recipients[&recipient_id].status(),
            crate::domain::RecipientStatus::InvalidAccount
        );

        // Editing the recipient re-confirms it; the retry reuses the
        // failed transfer's correlation id and clears the failure record.
        let edit_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::EditDomesticRecipient {
                base: edit_base,
                recipient: crate::domain::DomesticRecipient {
                    status: crate::domain::RecipientStatus::InvalidAccount,
                    ..recipient.clone()
                },
            },
        );
        assert_eq!(
            state.recipients[&recipient_id].status(),
            crate::domain::RecipientStatus::Confirmed
        );

        run_with_base(&mut state, |b| AccountCommand::DomesticTransfer {
            base: b,
            amount: dec!(75),
            recipient_id: recipient_id.clone(),
        }, base.follow_up());
        assert!(state.failed_domestic_transfers.is_empty());
        assert!(state.in_flight_transfers.contains_key(&base.correlation_id));
        assert_eq!(state.balance, dec!(925));
    }

    fn run_with_base(
        state: &mut AccountState,
        make: impl FnOnce(MessageBase) -> AccountCommand,
        base: MessageBase,
    ) {
        let event = decide(Some(state), &make(base)).unwrap();
        *state = apply(Some(state.clone()), &event);
    }

    #[test]
    fn progress_update_with_no_change_is_refused() {
        let mut state = opened_account(dec!(1000));
        let recipient = crate::domain::DomesticRecipient {
            name: "Util Co".into(),
            account_number: "000111222".into(),
            routing_number: "123456789".into(),
            depository: crate::domain::Depository::Checking,
            payment_network: crate::domain::PaymentNetwork::Ach,
            status: crate::domain::RecipientStatus::Confirmed,
        };
        let register_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::RegisterDomesticRecipient {
                base: register_base,
                recipient: recipient.clone(),
            },
        );
        let base = base_for(state.account_id, state.org_id);
        run_with_base(&mut state, |b| AccountCommand::DomesticTransfer {
            base: b,
            amount: dec!(10),
            recipient_id: recipient.recipient_id(),
        }, base.clone());

        run_with_base(&mut state, |b| AccountCommand::UpdateDomesticTransferProgress {
            base: b,
            progress: "processing".into(),
        }, base.follow_up());

        let err = decide(
            Some(&state),
            &AccountCommand::UpdateDomesticTransferProgress {
                base: base.follow_up(),
                progress: "processing".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::TransferProgressNoChange);
        assert!(err.is_noop());
    }

    #[test]
    fn billing_cycle_starts_at_most_once_per_period() {
        let mut state = opened_account(dec!(2000));
        let period = BillingPeriod { month: 3, year: 2024 };
        let start_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::StartBillingCycle {
                base: start_base,
                period,
            },
        );
        assert_eq!(state.last_billing_cycle, Some(period));

        let err = decide(
            Some(&state),
            &AccountCommand::StartBillingCycle {
                base: base_for(state.account_id, state.org_id),
                period,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ValidationFailure { .. }));
    }

    #[test]
    fn billing_cycle_event_snapshots_criteria_before_reset() {
        let mut state = opened_account(dec!(100));
        let deposit_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::DepositCash {
                base: deposit_base,
                amount: dec!(300),
            },
        );
        assert!(state.maintenance_fee_criteria.qualifying_deposit_found);

        let start_base = base_for(state.account_id, state.org_id);
        let event = run(
            &mut state,
            AccountCommand::StartBillingCycle {
                base: start_base,
                period: BillingPeriod { month: 1, year: 2025 },
            },
        );
        let AccountEvent::BillingCycleStarted { criteria, .. } = event else {
            panic!("expected BillingCycleStarted");
        };
        assert!(criteria.qualifying_deposit_found);
        // The live snapshot starts a fresh cycle.
        assert!(!state.maintenance_fee_criteria.qualifying_deposit_found);
    }

    #[test]
    fn closed_account_refuses_new_business_but_drains_in_flight() {
        let mut state = opened_account(dec!(1000));
        let recipient = AccountId::new();
        register_within_org(&mut state, recipient);

        let transfer_base = base_for(state.account_id, state.org_id);
        run_with_base(&mut state, |b| AccountCommand::InternalTransferWithinOrg {
            base: b,
            amount: dec!(100),
            recipient_id: recipient,
        }, transfer_base.clone());

        let close_base = base_for(state.account_id, state.org_id);
        run(
            &mut state,
            AccountCommand::CloseAccount {
                base: close_base,
                reference: Some("customer request".into()),
            },
        );
        assert_eq!(state.status, AccountStatus::Closed);

        let err = decide(
            Some(&state),
            &AccountCommand::DepositCash {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(10),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::AccountNotActive);

        // The in-flight rejection still applies and drains the account
        // into ReadyForDelete.
        run_with_base(&mut state, |b| AccountCommand::RejectInternalTransfer {
            base: b,
            kind: TransferKind::WithinOrg,
            reason: TransferRejectionReason::Unknown,
        }, transfer_base.follow_up());
        assert_eq!(state.status, AccountStatus::ReadyForDelete);

        let err = decide(
            Some(&state),
            &AccountCommand::DepositCash {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(10),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::AccountNotActive);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut state = opened_account(dec!(100));
        let recipient = AccountId::new();
        register_within_org(&mut state, recipient);

        let sender_ref = crate::domain::InternalRef {
            account_id: recipient,
            org_id: state.org_id,
            name: "Peer".into(),
        };
        let make_transfer = |amount| AccountCommand::InternalAutoTransfer {
            base: base_for(state.account_id, state.org_id),
            amount,
            recipient: sender_ref.clone(),
            rule_id: uuid::Uuid::new_v4(),
        };

        // 60 + 60 overdraws a 100 balance: the first command alone would
        // pass, the batch must not.
        let rejection =
            decide_many(Some(&state), &[make_transfer(dec!(60)), make_transfer(dec!(60))])
                .unwrap_err();
        assert_eq!(
            rejection.error,
            ValidationError::InsufficientBalance {
                balance: dec!(40),
                requested: dec!(60),
            }
        );

        // Within balance, every command yields its event.
        let events =
            decide_many(Some(&state), &[make_transfer(dec!(60)), make_transfer(dec!(30))])
                .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn decide_then_apply_matches_replay() {
        let mut live = opened_account(dec!(500));
        let recipient = AccountId::new();
        let mut events = Vec::new();

        let mut record = |state: &mut AccountState, command: AccountCommand| {
            let event = decide(Some(state), &command).unwrap();
            *state = apply(Some(state.clone()), &event);
            events.push(event);
        };

        let register_base = base_for(live.account_id, live.org_id);
        record(
            &mut live,
            AccountCommand::RegisterInternalRecipient {
                base: register_base,
                recipient: TransferRecipient::InternalWithinOrg {
                    account_id: recipient,
                    name: "Peer".into(),
                    status: crate::domain::RecipientStatus::Confirmed,
                },
            },
        );
        let deposit_base = base_for(live.account_id, live.org_id);
        record(
            &mut live,
            AccountCommand::DepositCash {
                base: deposit_base,
                amount: dec!(250),
            },
        );
        let transfer_base = base_for(live.account_id, live.org_id);
        record(
            &mut live,
            AccountCommand::InternalTransferWithinOrg {
                base: transfer_base,
                amount: dec!(300),
                recipient_id: recipient,
            },
        );

        // Replay law: folding apply over the journal reproduces the
        // live state, including the genesis event.
        let genesis = AccountEvent::Created {
            base: MessageBase {
                entity_id: live.account_id,
                org_id: live.org_id,
                correlation_id: CorrelationId::new(),
                initiated_by: InitiatorId::new(),
                timestamp: Utc::now(),
            },
            owner: live.owner.clone(),
            currency: "USD".into(),
            initial_deposit: dec!(500),
        };
        let replayed = std::iter::once(&genesis)
            .chain(events.iter())
            .fold(None, |state, event| Some(apply(state, event)))
            .unwrap();

        assert_eq!(replayed.balance, live.balance);
        assert_eq!(replayed.in_flight_transfers, live.in_flight_transfers);
        assert_eq!(replayed.recipients, live.recipients);
    }

    #[test]
    fn events_round_trip_through_serde() {
        let mut state = opened_account(dec!(1000));
        let deposit_base = base_for(state.account_id, state.org_id);
        let event = run(
            &mut state,
            AccountCommand::DepositCash {
                base: deposit_base,
                amount: dec!(42.42),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: AccountEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn money_transaction_excludes_approvals_and_flags_automated() {
        let mut state = opened_account(dec!(1000));
        let recipient = AccountId::new();
        register_within_org(&mut state, recipient);

        let base = base_for(state.account_id, state.org_id);
        let pending = decide(
            Some(&state),
            &AccountCommand::InternalTransferWithinOrg {
                base: base.clone(),
                amount: dec!(10),
                recipient_id: recipient,
            },
        )
        .unwrap();
        assert!(pending.money_transaction().is_some());
        state = apply(Some(state), &pending);

        let approved = decide(
            Some(&state),
            &AccountCommand::ApproveInternalTransfer {
                base: base.follow_up(),
                kind: TransferKind::WithinOrg,
            },
        )
        .unwrap();
        assert!(approved.money_transaction().is_none());

        let auto_pending = AccountEvent::AutomatedTransferPending {
            base: base_for(state.account_id, state.org_id),
            amount: dec!(5),
            recipient: crate::domain::InternalRef {
                account_id: recipient,
                org_id: state.org_id,
                name: "Peer".into(),
            },
            rule_id: uuid::Uuid::new_v4(),
        };
        assert!(auto_pending.money_transaction().is_some());
        assert!(auto_pending.is_automated_transfer());
    }

    #[test]
    fn scheduled_transfer_refuses_default_date() {
        let mut state = opened_account(dec!(1000));
        let recipient = AccountId::new();
        register_within_org(&mut state, recipient);

        let err = decide(
            Some(&state),
            &AccountCommand::ScheduleInternalTransferBetweenOrgs {
                base: base_for(state.account_id, state.org_id),
                amount: dec!(100),
                recipient_id: recipient,
                scheduled_at: chrono::DateTime::<Utc>::default(),
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::DateNotDefault);

        let schedule_base = base_for(state.account_id, state.org_id);
        let event = run(
            &mut state,
            AccountCommand::ScheduleInternalTransferBetweenOrgs {
                base: schedule_base,
                amount: dec!(100),
                recipient_id: recipient,
                scheduled_at: Utc::now() + chrono::Duration::days(3),
            },
        );
        assert!(matches!(
            event,
            AccountEvent::InternalTransferBetweenOrgsScheduled { .. }
        ));
        // Scheduling reserves nothing; the scheduler delivers the live
        // command later.
        assert_eq!(state.balance, dec!(1000));
    }
}
