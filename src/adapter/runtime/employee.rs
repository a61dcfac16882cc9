use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, warn};

use crate::domain::employee::{apply, decide};
use crate::domain::{
    AccountCommand, AppendMeta, BankError, Confirmable, EmployeeCommand, EmployeeEvent,
    EmployeeId, EmployeeState, EntityId, JournalError, MessageBase,
};
use crate::port::{decode_event, encode_events};

use super::RuntimeDeps;

const EMPLOYEE_TAG: &str = "employee";

pub enum EmployeeMessage {
    StateChange {
        envelope: Confirmable<EmployeeCommand>,
        reply: Option<RpcReplyPort<Result<u64, BankError>>>,
    },
    GetEmployee(RpcReplyPort<Option<EmployeeState>>),
    PassivateTick,
}

impl ractor::Message for EmployeeMessage {}

pub struct EmployeeActorArgs {
    pub employee_id: EmployeeId,
    pub deps: Arc<RuntimeDeps>,
}

pub struct EmployeeActorState {
    employee_id: EmployeeId,
    stream: EntityId,
    state: Option<EmployeeState>,
    seq: u64,
    last_activity: Instant,
    deps: Arc<RuntimeDeps>,
    passivation_timer: Option<tokio::task::JoinHandle<()>>,
}

/// Employee aggregate actor: same recovery/persist/passivate skeleton as
/// the account actor, with the card-purchase coupling as its only side
/// effects.
pub struct EmployeeActor;

#[async_trait]
impl Actor for EmployeeActor {
    type Msg = EmployeeMessage;
    type State = EmployeeActorState;
    type Arguments = EmployeeActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: EmployeeActorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let stream = EntityId::employee(args.employee_id);

        let mut state: Option<EmployeeState> = None;
        let mut snapshot_seq = 0;
        if let Some((seq, value)) = args.deps.snapshots.load(&stream).await? {
            state = Some(
                serde_json::from_value(value)
                    .map_err(|e| JournalError::Serialization(e.to_string()))?,
            );
            snapshot_seq = seq;
        }

        let records = args
            .deps
            .journal
            .read(&stream, snapshot_seq + 1, u64::MAX)
            .await?;
        for record in records {
            let event: EmployeeEvent = decode_event(&record)?;
            state = Some(apply(state, &event));
        }
        let seq = args.deps.journal.highest_sequence(&stream).await?;

        let passivation_timer = Some(myself.send_interval(
            args.deps.config.passivation_timeout / 2,
            || EmployeeMessage::PassivateTick,
        ));

        Ok(EmployeeActorState {
            employee_id: args.employee_id,
            stream,
            state,
            seq,
            last_activity: Instant::now(),
            deps: args.deps,
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
            EmployeeMessage::StateChange { envelope, reply } => {
                state.last_activity = Instant::now();
                let result = handle_state_change(state, envelope).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }

            EmployeeMessage::GetEmployee(reply) => {
                state.last_activity = Instant::now();
                let _ = reply.send(state.state.clone());
            }

            EmployeeMessage::PassivateTick => {
                if state.last_activity.elapsed() >= state.deps.config.passivation_timeout {
                    if let Some(employee) = &state.state {
                        if let Ok(snapshot) = serde_json::to_value(employee) {
                            let _ = state
                                .deps
                                .snapshots
                                .save(&state.stream, state.seq, snapshot)
                                .await;
                        }
                    }
                    myself.stop(Some("passivated".into()));
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
        Ok(())
    }
}

async fn handle_state_change(
    actor: &mut EmployeeActorState,
    envelope: Confirmable<EmployeeCommand>,
) -> Result<u64, BankError> {
    let command = envelope.payload;

    let event = match decide(actor.state.as_ref(), &command) {
        Ok(event) => event,
        Err(error) => {
            if error.is_noop() {
                debug!(employee_id = %actor.employee_id, %error, "command ignored");
            } else {
                warn!(employee_id = %actor.employee_id, %error, "command rejected");
            }
            return Err(BankError::Validation(error));
        }
    };

    let payload = encode_events(std::slice::from_ref(&event))?;
    let new_seq = actor
        .deps
        .journal
        .append(
            &actor.stream,
            actor.seq,
            EMPLOYEE_TAG,
            payload,
            AppendMeta::confirmed(envelope.confirmation_id),
        )
        .await?;

    if new_seq <= actor.seq {
        debug!(employee_id = %actor.employee_id, seq = new_seq, "duplicate envelope confirmed");
        return Ok(new_seq);
    }

    actor.seq = new_seq;
    actor.state = Some(apply(actor.state.take(), &event));
    dispatch_side_effects(actor, &event).await;

    Ok(new_seq)
}

async fn dispatch_side_effects(actor: &EmployeeActorState, event: &EmployeeEvent) {
    let Some(employee) = &actor.state else {
        return;
    };
    let deps = &actor.deps;

    match event {
        EmployeeEvent::Created { invite_token, .. } => {
            deps.email
                .queue(crate::port::EmailMessage::EmployeeInvite {
                    org_id: employee.org_id,
                    employee_email: employee.email.clone(),
                    token: *invite_token,
                })
                .await;
        }

        // The card purchase becomes a debit command on the org account,
        // correlated so the verdict can find the pending purchase.
        EmployeeEvent::DebitRequested {
            base,
            card_id,
            card_last4,
            amount,
            merchant,
            account_id,
        } => {
            let debit = AccountCommand::Debit {
                base: MessageBase {
                    entity_id: *account_id,
                    org_id: base.org_id,
                    correlation_id: base.correlation_id,
                    initiated_by: base.initiated_by,
                    timestamp: chrono::Utc::now(),
                },
                amount: *amount,
                purchase: crate::domain::EmployeePurchase {
                    employee_id: employee.employee_id,
                    card_id: *card_id,
                    card_last4: card_last4.clone(),
                    merchant: merchant.clone(),
                },
            };
            if let Err(error) = deps.router().tell_account(debit).await {
                warn!(employee_id = %employee.employee_id, %error, "debit dispatch failed");
            }
        }

        EmployeeEvent::DebitDeclined { reason, .. } => {
            deps.email
                .queue(crate::port::EmailMessage::PurchaseDeclined {
                    org_id: employee.org_id,
                    employee_email: employee.email.clone(),
                    reason: reason.clone(),
                })
                .await;
        }

        _ => {}
    }
}
