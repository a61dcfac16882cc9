use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, error, info, warn};

use crate::adapter::AccountObservation;
use crate::domain::account::{apply, decide, decide_many, maintenance_fee_criteria};
use crate::domain::{
    AccountCommand, AccountEvent, AccountId, AccountState, AccountStatus, AppendMeta, BankError,
    BillingStatement, Confirmable, CriteriaSettings, EmployeeCommand, EntityId, Frequency,
    JournalError, MaintenanceFeeCriteria, MessageBase, MoneyFlow, PurchaseDeclinedReason,
    TransferSender, ValidationError,
};
use crate::port::{ScheduledWork, decode_event, encode_events};
use crate::service::closure::ClosureMessage;
use crate::service::domestic::{DomesticInstruction, DomesticWorkerMessage};
use crate::service::transfer::{
    InternalTransferRequest, TransferCoordinator, TransferCoordinatorArgs,
    TransferCoordinatorMessage,
};

use super::{RuntimeDeps, roles};

const ACCOUNT_TAG: &str = "account";

pub enum AccountMessage {
    /// Command in a confirmable envelope. The reply (when present) is the
    /// envelope acknowledgment and fires only after durable persistence.
    StateChange {
        envelope: Confirmable<AccountCommand>,
        reply: Option<RpcReplyPort<Result<u64, BankError>>>,
    },
    GetAccount(RpcReplyPort<Option<AccountState>>),
    /// Evaluate auto-transfer rules of one frequency against current
    /// state.
    AutoTransferCompute(Frequency),
    /// Journal deletion request from the closure finalizer.
    Delete,
    /// Persist failure surfaced back onto the entity's own mailbox.
    PersistFailed(JournalError),
    PassivateTick,
}

impl ractor::Message for AccountMessage {}

pub struct AccountActorArgs {
    pub account_id: AccountId,
    pub deps: Arc<RuntimeDeps>,
}

pub struct AccountActorState {
    account_id: AccountId,
    stream: EntityId,
    state: Option<AccountState>,
    seq: u64,
    last_activity: Instant,
    deps: Arc<RuntimeDeps>,
    coordinator: Option<ActorRef<TransferCoordinatorMessage>>,
    passivation_timer: Option<tokio::task::JoinHandle<()>>,
}

/// One actor per account aggregate. The mailbox is the serialization
/// point: one command at a time, events persisted before anything else
/// observes them.
pub struct AccountActor;

#[async_trait]
impl Actor for AccountActor {
    type Msg = AccountMessage;
    type State = AccountActorState;
    type Arguments = AccountActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: AccountActorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let stream = EntityId::account(args.account_id);

        // Recovery: snapshot first, then replay the journal tail. Only
        // `apply` runs here; side effects never fire during replay.
        let mut state: Option<AccountState> = None;
        let mut snapshot_seq = 0;
        if let Some((seq, value)) = args.deps.snapshots.load(&stream).await? {
            state = Some(serde_json::from_value(value).map_err(|e| {
                error!(account_id = %args.account_id, %e, "snapshot corrupt, refusing to start");
                Box::new(JournalError::Serialization(e.to_string())) as ActorProcessingErr
            })?);
            snapshot_seq = seq;
        }

        let records = args
            .deps
            .journal
            .read(&stream, snapshot_seq + 1, u64::MAX)
            .await?;
        for record in records {
            let event: AccountEvent = decode_event(&record).map_err(|e| {
                error!(account_id = %args.account_id, %e, "replay failed, refusing to start");
                Box::new(e) as ActorProcessingErr
            })?;
            state = Some(apply(state, &event));
        }

        // Soft-deleted prefixes leave the sequence counter where it was.
        let seq = args.deps.journal.highest_sequence(&stream).await?;

        let passivation_timer = Some(myself.send_interval(
            args.deps.config.passivation_timeout / 2,
            || AccountMessage::PassivateTick,
        ));

        debug!(account_id = %args.account_id, seq, recovered = state.is_some(), "account entity started");

        Ok(AccountActorState {
            account_id: args.account_id,
            stream,
            state,
            seq,
            last_activity: Instant::now(),
            deps: args.deps,
            coordinator: None,
            passivation_timer,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AccountMessage::StateChange { envelope, reply } => {
                state.last_activity = Instant::now();
                let result = handle_state_change(&myself, state, envelope).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }

            AccountMessage::GetAccount(reply) => {
                state.last_activity = Instant::now();
                let _ = reply.send(state.state.clone());
            }

            AccountMessage::AutoTransferCompute(frequency) => {
                state.last_activity = Instant::now();
                handle_auto_transfer_compute(&myself, state, frequency).await;
            }

            AccountMessage::Delete => {
                handle_delete(&myself, state).await;
            }

            AccountMessage::PersistFailed(error) => {
                warn!(account_id = %state.account_id, %error, "persist failed");
                state.deps.bus.publish(AccountObservation::PersistFailed {
                    account_id: state.account_id,
                    error,
                });
            }

            AccountMessage::PassivateTick => {
                if state.last_activity.elapsed() >= state.deps.config.passivation_timeout {
                    passivate(&myself, state).await;
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.passivation_timer.take() {
            timer.abort();
        }
        if let Some(coordinator) = state.coordinator.take() {
            coordinator.stop(None);
        }
        Ok(())
    }
}

async fn handle_state_change(
    myself: &ActorRef<AccountMessage>,
    actor: &mut AccountActorState,
    envelope: Confirmable<AccountCommand>,
) -> Result<u64, BankError> {
    let command = envelope.payload;

    let event = match decide(actor.state.as_ref(), &command) {
        Ok(event) => event,
        Err(error) => {
            handle_validation_error(actor, &command, &error).await;
            return Err(BankError::Validation(error));
        }
    };

    let payload = encode_events(std::slice::from_ref(&event))?;
    let new_seq = match actor
        .deps
        .journal
        .append(
            &actor.stream,
            actor.seq,
            ACCOUNT_TAG,
            payload,
            AppendMeta::confirmed(envelope.confirmation_id),
        )
        .await
    {
        Ok(seq) => seq,
        Err(error) => {
            // Surface on our own mailbox, broadcast, leave state alone.
            // The supervisor restarts us from the last snapshot.
            let _ = myself.cast(AccountMessage::PersistFailed(error.clone()));
            return Err(BankError::Journal(error));
        }
    };

    // An idempotent redelivery appends nothing; skip apply and effects.
    if new_seq <= actor.seq {
        debug!(account_id = %actor.account_id, seq = new_seq, "duplicate envelope confirmed");
        return Ok(new_seq);
    }

    actor.seq = new_seq;
    actor.state = Some(apply(actor.state.take(), &event));
    publish_event(actor, &event);
    dispatch_side_effects(myself, actor, &event).await;

    Ok(new_seq)
}

async fn handle_auto_transfer_compute(
    myself: &ActorRef<AccountMessage>,
    actor: &mut AccountActorState,
    frequency: Frequency,
) {
    let Some(account) = actor.state.clone() else {
        return;
    };

    let computed = crate::domain::account::compute_auto_transfers(&account, frequency);
    if computed.is_empty() {
        return;
    }

    let initiator = crate::domain::InitiatorId::new();
    let (outgoing, restoring): (Vec<_>, Vec<_>) = computed
        .into_iter()
        .partition(|transfer| transfer.sender == account.account_id);

    // Transfers-in: this account is below target; the managing account is
    // the sender, so it gets one auto-transfer command per rule.
    for transfer in restoring {
        let command = AccountCommand::InternalAutoTransfer {
            base: MessageBase::new(transfer.sender, account.org_id, initiator),
            amount: transfer.amount,
            recipient: transfer.recipient.clone(),
            rule_id: transfer.rule_id,
        };
        if let Err(error) = actor.deps.router().tell_account(command).await {
            warn!(account_id = %actor.account_id, %error, "auto transfer-in dispatch failed");
        }
    }

    if outgoing.is_empty() {
        return;
    }

    // Transfers-out are validated as one batch against a shadow state and
    // persisted atomically: interleaving them with unrelated debits could
    // produce spurious insufficient-balance failures.
    let commands: Vec<AccountCommand> = outgoing
        .iter()
        .map(|transfer| AccountCommand::InternalAutoTransfer {
            base: MessageBase::new(account.account_id, account.org_id, initiator),
            amount: transfer.amount,
            recipient: transfer.recipient.clone(),
            rule_id: transfer.rule_id,
        })
        .collect();

    let events = match decide_many(actor.state.as_ref(), &commands) {
        Ok(events) => events,
        Err(rejection) => {
            handle_validation_error(actor, &rejection.command, &rejection.error).await;
            return;
        }
    };

    let payload = match encode_events(&events) {
        Ok(payload) => payload,
        Err(error) => {
            let _ = myself.cast(AccountMessage::PersistFailed(error));
            return;
        }
    };

    match actor
        .deps
        .journal
        .append(
            &actor.stream,
            actor.seq,
            ACCOUNT_TAG,
            payload,
            AppendMeta::unconfirmed(),
        )
        .await
    {
        Ok(new_seq) => {
            actor.seq = new_seq;
            for event in &events {
                actor.state = Some(apply(actor.state.take(), event));
                publish_event(actor, event);
                dispatch_side_effects(myself, actor, event).await;
            }
        }
        Err(error) => {
            let _ = myself.cast(AccountMessage::PersistFailed(error));
        }
    }
}

async fn handle_delete(myself: &ActorRef<AccountMessage>, actor: &mut AccountActorState) {
    let ready = match &actor.state {
        None => true,
        Some(state) => state.status == AccountStatus::ReadyForDelete,
    };

    if !ready {
        // Still draining in-flight transfers; try again shortly.
        debug!(account_id = %actor.account_id, "delete deferred, account not drained");
        let _ = myself.send_after(std::time::Duration::from_secs(1), || AccountMessage::Delete);
        return;
    }

    if let Err(error) = actor.deps.journal.delete_up_to(&actor.stream, actor.seq).await {
        warn!(account_id = %actor.account_id, %error, "journal deletion failed");
        return;
    }
    if let Err(error) = actor.deps.snapshots.delete(&actor.stream).await {
        warn!(account_id = %actor.account_id, %error, "snapshot deletion failed");
    }
    actor
        .deps
        .router()
        .forget(super::RememberedEntity::Account(actor.account_id))
        .await;

    info!(account_id = %actor.account_id, "account deleted, passivating");
    myself.stop(Some("deleted".into()));
}

async fn passivate(myself: &ActorRef<AccountMessage>, actor: &mut AccountActorState) {
    if let Some(state) = &actor.state {
        match serde_json::to_value(state) {
            Ok(snapshot) => {
                if let Err(error) = actor
                    .deps
                    .snapshots
                    .save(&actor.stream, actor.seq, snapshot)
                    .await
                {
                    warn!(account_id = %actor.account_id, %error, "passivation snapshot failed");
                    return;
                }
            }
            Err(error) => {
                warn!(account_id = %actor.account_id, %error, "snapshot serialization failed");
                return;
            }
        }
    }
    debug!(account_id = %actor.account_id, "idle, passivating");
    myself.stop(Some("passivated".into()));
}

fn publish_event(actor: &AccountActorState, event: &AccountEvent) {
    if let Some(state) = &actor.state {
        actor.deps.bus.publish(AccountObservation::Event {
            event: event.clone(),
            state: state.clone(),
        });
    }
}

/// Validation rejections: no-op errors are redeliveries or stale workflow
/// messages and only get a debug line; everything else is broadcast, and
/// an insufficient-balance card debit synthesizes the decline back to the
/// employee.
async fn handle_validation_error(
    actor: &AccountActorState,
    command: &AccountCommand,
    error: &ValidationError,
) {
    if error.is_noop() {
        debug!(account_id = %actor.account_id, %error, "command ignored");
        return;
    }

    warn!(account_id = %actor.account_id, %error, "command rejected");
    actor.deps.bus.publish(AccountObservation::Rejected {
        account_id: actor.account_id,
        error: error.clone(),
    });

    if let (
        ValidationError::InsufficientBalance { balance, .. },
        AccountCommand::Debit { base, purchase, .. },
    ) = (error, command)
    {
        let owner_name = actor
            .state
            .as_ref()
            .map(|s| s.owner.full_name.clone())
            .unwrap_or_default();
        let decline = EmployeeCommand::DeclineDebit {
            base: MessageBase {
                entity_id: purchase.employee_id,
                org_id: base.org_id,
                correlation_id: base.correlation_id,
                initiated_by: base.initiated_by,
                timestamp: chrono::Utc::now(),
            },
            reason: PurchaseDeclinedReason::InsufficientAccountFunds {
                balance: *balance,
                owner_name,
            },
        };
        if let Err(error) = actor.deps.router().tell_employee(decline).await {
            warn!(account_id = %actor.account_id, %error, "decline dispatch failed");
        }
    }
}

/// Post-persist side effects. These run only after the event is durable,
/// never during replay.
async fn dispatch_side_effects(
    myself: &ActorRef<AccountMessage>,
    actor: &mut AccountActorState,
    event: &AccountEvent,
) {
    let Some(account) = actor.state.clone() else {
        return;
    };
    let deps = actor.deps.clone();

    match event {
        AccountEvent::Created { .. } => {
            deps.email
                .queue(crate::port::EmailMessage::AccountOpen {
                    account_id: account.account_id,
                    owner_email: account.owner.email.clone(),
                })
                .await;
            // Recurring obligation the closure finalizer deregisters.
            deps.scheduler
                .schedule(ScheduledWork::RecurringMaintenanceFee {
                    account_id: account.account_id,
                })
                .await;
        }

        AccountEvent::Debited { base, purchase, .. } => {
            let approve = EmployeeCommand::ApproveDebit {
                base: MessageBase {
                    entity_id: purchase.employee_id,
                    org_id: base.org_id,
                    correlation_id: base.correlation_id,
                    initiated_by: base.initiated_by,
                    timestamp: chrono::Utc::now(),
                },
            };
            if let Err(error) = deps.router().tell_employee(approve).await {
                warn!(account_id = %account.account_id, %error, "approve debit dispatch failed");
            }
        }

        AccountEvent::DomesticRecipientEdited { recipient, .. } => {
            retry_failed_domestic_transfers(myself, &account, recipient).await;
        }

        AccountEvent::InternalTransferWithinOrgPending {
            base,
            amount,
            recipient_id,
        } => {
            send_to_coordinator(
                myself,
                actor,
                InternalTransferRequest {
                    kind: crate::domain::TransferKind::WithinOrg,
                    correlation_id: base.correlation_id,
                    amount: *amount,
                    recipient_account: *recipient_id,
                    sender: sender_info(&account),
                    attempt: 1,
                },
            )
            .await;
        }

        AccountEvent::InternalTransferBetweenOrgsPending {
            base,
            amount,
            recipient_id,
        } => {
            send_to_coordinator(
                myself,
                actor,
                InternalTransferRequest {
                    kind: crate::domain::TransferKind::BetweenOrgs,
                    correlation_id: base.correlation_id,
                    amount: *amount,
                    recipient_account: *recipient_id,
                    sender: sender_info(&account),
                    attempt: 1,
                },
            )
            .await;
        }

        AccountEvent::AutomatedTransferPending {
            base,
            amount,
            recipient,
            ..
        } => {
            send_to_coordinator(
                myself,
                actor,
                InternalTransferRequest {
                    kind: crate::domain::TransferKind::Automated,
                    correlation_id: base.correlation_id,
                    amount: *amount,
                    recipient_account: recipient.account_id,
                    sender: sender_info(&account),
                    attempt: 1,
                },
            )
            .await;
        }

        AccountEvent::InternalTransferBetweenOrgsScheduled {
            base,
            amount,
            recipient_id,
            scheduled_at,
        } => {
            deps.scheduler
                .schedule(ScheduledWork::InternalTransferBetweenOrgs {
                    sender: account.account_id,
                    recipient: *recipient_id,
                    amount: *amount,
                    correlation_id: base.correlation_id,
                    due_at: *scheduled_at,
                })
                .await;
        }

        AccountEvent::DomesticTransferScheduled {
            base,
            amount,
            recipient_id,
            scheduled_at,
        } => {
            deps.scheduler
                .schedule(ScheduledWork::DomesticTransfer {
                    sender: account.account_id,
                    recipient_id: recipient_id.clone(),
                    amount: *amount,
                    correlation_id: base.correlation_id,
                    due_at: *scheduled_at,
                })
                .await;
        }

        AccountEvent::DomesticTransferPending {
            base,
            amount,
            recipient,
        } => {
            let name = deps.singleton_name(roles::DOMESTIC_WORKER);
            match ActorRef::<DomesticWorkerMessage>::where_is(name) {
                Some(worker) => {
                    let _ = worker.cast(DomesticWorkerMessage::TransferRequest(
                        DomesticInstruction {
                            sender: account.account_id,
                            org_id: account.org_id,
                            correlation_id: base.correlation_id,
                            amount: *amount,
                            recipient: recipient.clone(),
                        },
                    ));
                }
                None => {
                    warn!(account_id = %account.account_id, "domestic worker unavailable");
                }
            }
        }

        AccountEvent::InternalTransferBetweenOrgsDeposited { amount, sender, .. } => {
            deps.email
                .queue(crate::port::EmailMessage::TransferDeposited {
                    account_id: account.account_id,
                    owner_email: account.owner.email.clone(),
                    amount: *amount,
                    sender_name: sender.name.clone(),
                })
                .await;
        }

        AccountEvent::BillingCycleStarted {
            base,
            period,
            criteria,
        } => {
            deps.statements
                .append(BillingStatement {
                    account_id: account.account_id,
                    period: *period,
                    closing_balance: account.balance,
                    generated_at: base.timestamp,
                })
                .await;

            // The fee decision folds the criteria over the journal's
            // lookback window; the event's incremental snapshot is the
            // fallback when the journal cannot be read.
            let criteria = lookback_criteria(&deps, &actor.stream, &account, *criteria).await;
            let follow_up = if criteria.fee_waived() {
                AccountCommand::SkipMaintenanceFee {
                    base: base.follow_up(),
                    criteria,
                }
            } else {
                AccountCommand::MaintenanceFee {
                    base: base.follow_up(),
                    amount: deps.config.maintenance_fee,
                }
            };
            let _ = myself.cast(AccountMessage::StateChange {
                envelope: Confirmable::internal(follow_up),
                reply: None,
            });

            deps.email
                .queue(crate::port::EmailMessage::BillingStatement {
                    account_id: account.account_id,
                    owner_email: account.owner.email.clone(),
                    period: *period,
                })
                .await;
        }

        AccountEvent::PlatformPaymentPaid {
            base,
            amount,
            payee,
        } => {
            let deposit = AccountCommand::DepositPlatformPayment {
                base: MessageBase {
                    entity_id: *payee,
                    org_id: base.org_id,
                    correlation_id: base.correlation_id,
                    initiated_by: base.initiated_by,
                    timestamp: chrono::Utc::now(),
                },
                amount: *amount,
                payer: account.account_id,
            };
            if let Err(error) = deps.router().tell_account(deposit).await {
                warn!(account_id = %account.account_id, %error, "platform payment dispatch failed");
            }
        }

        AccountEvent::AccountClosed { .. } => {
            deps.email
                .queue(crate::port::EmailMessage::AccountClose {
                    account_id: account.account_id,
                    owner_email: account.owner.email.clone(),
                })
                .await;

            let name = deps.singleton_name(roles::ACCOUNT_CLOSURE);
            match ActorRef::<ClosureMessage>::where_is(name) {
                Some(finalizer) => {
                    let _ = finalizer.cast(ClosureMessage::Register {
                        account_id: account.account_id,
                        org_id: account.org_id,
                    });
                }
                None => {
                    warn!(account_id = %account.account_id, "closure finalizer unavailable");
                }
            }
        }

        _ => {}
    }

    // Any money movement (except automated transfers themselves) may
    // trigger per-transaction auto-transfer rules.
    if event.money_transaction().is_some()
        && !event.is_automated_transfer()
        && account.has_rules_of(Frequency::PerTransaction)
    {
        let _ = myself.cast(AccountMessage::AutoTransferCompute(
            Frequency::PerTransaction,
        ));
    }
}

/// Maintenance-fee criteria for the billing cycle: a pure fold over the
/// events of the preceding lookback window, short-circuiting once the
/// deposit criterion flips true. The opening balance is recovered by
/// rewinding the window's net movement from the current balance; an
/// account created inside the window has no opening balance.
async fn lookback_criteria(
    deps: &Arc<RuntimeDeps>,
    stream: &EntityId,
    account: &AccountState,
    fallback: MaintenanceFeeCriteria,
) -> MaintenanceFeeCriteria {
    let records = match deps.journal.read(stream, 1, u64::MAX).await {
        Ok(records) => records,
        Err(error) => {
            warn!(account_id = %account.account_id, %error, "criteria fold unavailable, using live snapshot");
            return fallback;
        }
    };

    let since = chrono::Utc::now() - deps.config.billing_lookback;
    let mut window = Vec::new();
    let mut originates_in_window = false;
    for record in &records {
        if record.timestamp < since {
            continue;
        }
        match decode_event::<AccountEvent>(record) {
            Ok(event) => {
                if matches!(event, AccountEvent::Created { .. }) {
                    originates_in_window = true;
                }
                window.push(event);
            }
            Err(error) => {
                warn!(account_id = %account.account_id, %error, "criteria fold unavailable, using live snapshot");
                return fallback;
            }
        }
    }

    let opening = if originates_in_window {
        None
    } else {
        let net: rust_decimal::Decimal = window
            .iter()
            .filter_map(AccountEvent::money_transaction)
            .map(|flow| match flow {
                MoneyFlow::In(amount) => amount,
                MoneyFlow::Out(amount) => -amount,
            })
            .sum();
        Some(account.balance - net)
    };

    maintenance_fee_criteria(window.iter(), opening, CriteriaSettings::STANDARD)
}

fn sender_info(account: &AccountState) -> TransferSender {
    TransferSender {
        account_id: account.account_id,
        org_id: account.org_id,
        name: account.owner.full_name.clone(),
    }
}

/// One coordinator child per sender, spawned on demand.
async fn send_to_coordinator(
    myself: &ActorRef<AccountMessage>,
    actor: &mut AccountActorState,
    request: InternalTransferRequest,
) {
    if actor.coordinator.is_none() {
        let args = TransferCoordinatorArgs {
            deps: actor.deps.clone(),
        };
        match Actor::spawn_linked(None, TransferCoordinator, args, myself.get_cell()).await {
            Ok((coordinator, _handle)) => actor.coordinator = Some(coordinator),
            Err(error) => {
                warn!(account_id = %actor.account_id, %error, "coordinator spawn failed");
                return;
            }
        }
    }

    if let Some(coordinator) = &actor.coordinator {
        let _ = coordinator.cast(TransferCoordinatorMessage::Request(request));
    }
}

/// A recipient-info edit re-issues every failed domestic transfer that
/// matches the edited recipient.
async fn retry_failed_domestic_transfers(
    myself: &ActorRef<AccountMessage>,
    account: &AccountState,
    recipient: &crate::domain::DomesticRecipient,
) {
    let recipient_id = recipient.recipient_id();
    let initiator = crate::domain::InitiatorId::new();

    for (correlation_id, failed) in &account.failed_domestic_transfers {
        if failed.recipient_id != recipient_id
            || failed.reason != crate::domain::TransferRejectionReason::InvalidAccountInfo
        {
            continue;
        }
        info!(account_id = %account.account_id, %correlation_id, "retrying failed domestic transfer");
        let retry = AccountCommand::DomesticTransfer {
            base: MessageBase {
                entity_id: account.account_id,
                org_id: account.org_id,
                correlation_id: *correlation_id,
                initiated_by: initiator,
                timestamp: chrono::Utc::now(),
            },
            amount: failed.amount,
            recipient_id: recipient_id.clone(),
        };
        let _ = myself.cast(AccountMessage::StateChange {
            envelope: Confirmable::internal(retry),
            reply: None,
        });
    }
}
