use rust_decimal::Decimal;

use crate::domain::{
    FailedDomesticTransfer, InFlightTransfer, RecipientId, RecipientStatus, TransferKind,
    TransferRecipient, TransferRejectionReason,
};

use super::{
    AccountEvent, AccountState, AccountStatus, CriteriaSettings, MaintenanceFeeCriteria,
};

/// Apply an event to state. Total and side-effect free; used for both live
/// transitions and journal replay.
///
/// The only event accepted against `None` is `Created`; replaying any
/// other event against an absent aggregate is an infrastructure bug, and
/// the runtime treats it as a replay failure before calling here.
pub fn apply(state: Option<AccountState>, event: &AccountEvent) -> AccountState {
    let Some(mut state) = state else {
        return originate(event);
    };

    match event {
        AccountEvent::Created { .. } => {
            // Duplicate genesis; decide() refuses this, replay keeps the
            // existing state.
        }

        AccountEvent::Deposited { amount, .. } => {
            state.balance += *amount;
            if *amount >= CriteriaSettings::STANDARD.qualifying_deposit {
                state.maintenance_fee_criteria.qualifying_deposit_found = true;
            }
            observe_balance(&mut state);
        }

        AccountEvent::Debited { base, amount, .. } => {
            state.balance -= *amount;
            let today = base.timestamp.date_naive();
            state.daily_debit_accrued = state.daily_accrued_on(today) + *amount;
            state.monthly_debit_accrued = state.monthly_accrued_in(today) + *amount;
            state.last_debit_date = Some(today);
            observe_balance(&mut state);
        }

        AccountEvent::MaintenanceFeeDebited { amount, .. } => {
            state.balance -= *amount;
            observe_balance(&mut state);
        }

        AccountEvent::MaintenanceFeeSkipped { .. } => {}

        AccountEvent::DailyDebitLimitUpdated { limit, .. } => {
            state.daily_debit_limit = Some(*limit);
        }

        AccountEvent::InternalRecipientRegistered { recipient, .. } => {
            state
                .recipients
                .insert(recipient.recipient_id(), recipient.clone());
        }

        AccountEvent::DomesticRecipientRegistered { recipient, .. } => {
            state.recipients.insert(
                recipient.recipient_id(),
                TransferRecipient::Domestic(recipient.clone()),
            );
        }

        AccountEvent::DomesticRecipientEdited { recipient, .. } => {
            // An edit re-confirms a recipient previously marked invalid.
            let mut edited = recipient.clone();
            edited.status = RecipientStatus::Confirmed;
            state
                .recipients
                .insert(edited.recipient_id(), TransferRecipient::Domestic(edited));
        }

        AccountEvent::InternalTransferWithinOrgPending {
            base,
            amount,
            recipient_id,
        } => {
            transfer_out(
                &mut state,
                base,
                *amount,
                TransferKind::WithinOrg,
                RecipientId::internal(*recipient_id),
            );
        }

        AccountEvent::InternalTransferBetweenOrgsPending {
            base,
            amount,
            recipient_id,
        } => {
            transfer_out(
                &mut state,
                base,
                *amount,
                TransferKind::BetweenOrgs,
                RecipientId::internal(*recipient_id),
            );
        }

        AccountEvent::AutomatedTransferPending {
            base,
            amount,
            recipient,
            ..
        } => {
            transfer_out(
                &mut state,
                base,
                *amount,
                TransferKind::Automated,
                RecipientId::internal(recipient.account_id),
            );
        }

        AccountEvent::DomesticTransferPending {
            base,
            amount,
            recipient,
        } => {
            // A retry of a failed transfer reuses its correlation id.
            state.failed_domestic_transfers.remove(&base.correlation_id);
            transfer_out(
                &mut state,
                base,
                *amount,
                TransferKind::Domestic,
                recipient.recipient_id(),
            );
        }

        AccountEvent::InternalTransferWithinOrgApproved { base, .. }
        | AccountEvent::InternalTransferBetweenOrgsApproved { base, .. }
        | AccountEvent::AutomatedTransferApproved { base, .. }
        | AccountEvent::DomesticTransferApproved { base, .. } => {
            state.in_flight_transfers.remove(&base.correlation_id);
            settle_closure(&mut state);
        }

        AccountEvent::InternalTransferWithinOrgRejected { base, amount, .. }
        | AccountEvent::InternalTransferBetweenOrgsRejected { base, amount, .. }
        | AccountEvent::AutomatedTransferRejected { base, amount, .. } => {
            state.balance += *amount;
            state.in_flight_transfers.remove(&base.correlation_id);
            settle_closure(&mut state);
        }

        AccountEvent::DomesticTransferRejected {
            base,
            amount,
            recipient_id,
            reason,
        } => {
            state.balance += *amount;
            state.in_flight_transfers.remove(&base.correlation_id);
            if *reason == TransferRejectionReason::InvalidAccountInfo {
                state.failed_domestic_transfers.insert(
                    base.correlation_id,
                    FailedDomesticTransfer {
                        amount: *amount,
                        recipient_id: recipient_id.clone(),
                        reason: *reason,
                        failed_at: base.timestamp,
                    },
                );
                if let Some(recipient) = state.recipients.remove(recipient_id) {
                    state.recipients.insert(
                        recipient_id.clone(),
                        recipient.with_status(RecipientStatus::InvalidAccount),
                    );
                }
            }
            settle_closure(&mut state);
        }

        AccountEvent::DomesticTransferProgressUpdated { base, progress } => {
            if let Some(transfer) = state.in_flight_transfers.get_mut(&base.correlation_id) {
                transfer.progress = Some(progress.clone());
            }
        }

        // Scheduled transfers live with the scheduler until it delivers
        // them back as live commands.
        AccountEvent::InternalTransferBetweenOrgsScheduled { .. }
        | AccountEvent::DomesticTransferScheduled { .. } => {}

        AccountEvent::InternalTransferWithinOrgDeposited { amount, .. }
        | AccountEvent::InternalTransferBetweenOrgsDeposited { amount, .. }
        | AccountEvent::AutomatedTransferDeposited { amount, .. }
        | AccountEvent::PlatformPaymentDeposited { amount, .. } => {
            state.balance += *amount;
            observe_balance(&mut state);
        }

        AccountEvent::AutoTransferRuleConfigured { rule, .. } => {
            state
                .auto_transfer_rules
                .retain(|existing| existing.rule_id() != rule.rule_id());
            state.auto_transfer_rules.push(rule.clone());
        }

        AccountEvent::PlatformPaymentPaid { amount, .. } => {
            state.balance -= *amount;
            observe_balance(&mut state);
        }

        AccountEvent::BillingCycleStarted { period, .. } => {
            state.last_billing_cycle = Some(*period);
            state.maintenance_fee_criteria = MaintenanceFeeCriteria {
                qualifying_deposit_found: false,
                daily_balance_threshold_met: state.balance
                    >= CriteriaSettings::STANDARD.daily_balance_threshold,
            };
        }

        AccountEvent::AccountClosed { .. } => {
            state.status = if state.drained() {
                AccountStatus::ReadyForDelete
            } else {
                AccountStatus::Closed
            };
        }
    }

    state
}

fn originate(event: &AccountEvent) -> AccountState {
    let base = event.base();
    let (owner, currency, initial_deposit) = match event {
        AccountEvent::Created {
            owner,
            currency,
            initial_deposit,
            ..
        } => (owner.clone(), currency.clone(), *initial_deposit),
        // Replay of a non-genesis event against nothing: the runtime
        // refuses this path, but apply stays total.
        _ => (
            super::AccountOwner {
                full_name: String::new(),
                email: String::new(),
            },
            String::new(),
            Decimal::ZERO,
        ),
    };

    let mut state = AccountState {
        account_id: base.entity_id,
        org_id: base.org_id,
        status: AccountStatus::Active,
        balance: initial_deposit,
        currency,
        owner,
        daily_debit_limit: None,
        monthly_debit_limit: None,
        daily_debit_accrued: Decimal::ZERO,
        monthly_debit_accrued: Decimal::ZERO,
        last_debit_date: None,
        recipients: Default::default(),
        in_flight_transfers: Default::default(),
        failed_domestic_transfers: Default::default(),
        maintenance_fee_criteria: MaintenanceFeeCriteria::reset(),
        auto_transfer_rules: Vec::new(),
        last_billing_cycle: None,
    };
    observe_balance(&mut state);
    state
}

/// The balance criterion fails the moment any observed balance dips below
/// the threshold.
fn observe_balance(state: &mut AccountState) {
    if state.balance < CriteriaSettings::STANDARD.daily_balance_threshold {
        state.maintenance_fee_criteria.daily_balance_threshold_met = false;
    }
}

fn transfer_out(
    state: &mut AccountState,
    base: &crate::domain::MessageBase,
    amount: Decimal,
    kind: TransferKind,
    recipient_id: RecipientId,
) {
    state.balance -= amount;
    state.in_flight_transfers.insert(
        base.correlation_id,
        InFlightTransfer {
            kind,
            amount,
            recipient_id,
            started_at: base.timestamp,
            progress: None,
        },
    );
    observe_balance(state);
}

/// A closed account becomes deletable once its last in-flight transfer
/// reaches a terminal event.
fn settle_closure(state: &mut AccountState) {
    if state.status == AccountStatus::Closed && state.drained() {
        state.status = AccountStatus::ReadyForDelete;
    }
}
