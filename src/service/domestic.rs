//! Domestic transfer worker: cluster singleton wrapping the external
//! transfer gateway behind a circuit breaker. Obtains a ticket per
//! transfer, polls progress until terminal, and feeds verdicts back to
//! the sender aggregate as commands.

use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::adapter::runtime::RuntimeDeps;
use crate::adapter::{BreakerConfig, BreakerError, CircuitBreaker};
use crate::domain::{
    AccountCommand, AccountId, CorrelationId, DomesticRecipient, InitiatorId, MessageBase, OrgId,
    TransferRejectionReason,
};
use crate::port::{
    DomesticGateway, GatewayTransferRequest, GatewayTransferResponse, GatewayTransferStatus,
};

/// Progress polls per transfer before giving up with Unknown.
const MAX_PROGRESS_CHECKS: u32 = 20;

#[derive(Debug, Clone)]
pub struct DomesticInstruction {
    pub sender: AccountId,
    pub org_id: OrgId,
    pub correlation_id: CorrelationId,
    pub amount: Decimal,
    pub recipient: DomesticRecipient,
}

pub enum DomesticWorkerMessage {
    TransferRequest(DomesticInstruction),
    ProgressCheck {
        instruction: DomesticInstruction,
        transaction_id: String,
        checks_done: u32,
    },
}

impl ractor::Message for DomesticWorkerMessage {}

pub struct DomesticWorkerArgs {
    pub deps: Arc<RuntimeDeps>,
    pub gateway: Arc<dyn DomesticGateway>,
}

pub struct DomesticWorkerState {
    deps: Arc<RuntimeDeps>,
    gateway: Arc<dyn DomesticGateway>,
    breaker: CircuitBreaker,
}

pub struct DomesticTransferWorker;

#[async_trait]
impl Actor for DomesticTransferWorker {
    type Msg = DomesticWorkerMessage;
    type State = DomesticWorkerState;
    type Arguments = DomesticWorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: DomesticWorkerArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let breaker = CircuitBreaker::new(
            "domestic-transfer-gateway",
            BreakerConfig {
                failure_threshold: args.deps.config.breaker_failure_threshold,
                cooldown: args.deps.config.breaker_cooldown,
            },
            args.deps.bus.clone(),
        );
        Ok(DomesticWorkerState {
            deps: args.deps,
            gateway: args.gateway,
            breaker,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DomesticWorkerMessage::TransferRequest(instruction) => {
                handle_transfer_request(&myself, state, instruction).await;
            }
            DomesticWorkerMessage::ProgressCheck {
                instruction,
                transaction_id,
                checks_done,
            } => {
                handle_progress_check(&myself, state, instruction, transaction_id, checks_done)
                    .await;
            }
        }
        Ok(())
    }
}

async fn handle_transfer_request(
    myself: &ActorRef<DomesticWorkerMessage>,
    state: &DomesticWorkerState,
    instruction: DomesticInstruction,
) {
    let request = GatewayTransferRequest {
        account_number: instruction.recipient.account_number.clone(),
        routing_number: instruction.recipient.routing_number.clone(),
        amount: instruction.amount,
        reference: instruction.correlation_id,
    };

    let outcome = state
        .breaker
        .call(|| state.gateway.initiate(request))
        .await;

    match outcome {
        Ok(response) => {
            dispatch_response(myself, state, instruction, response, 0).await;
        }
        Err(BreakerError::Open) => {
            debug!(correlation_id = %instruction.correlation_id, "breaker open, rejecting fast");
            reject(state, &instruction, TransferRejectionReason::Unknown).await;
        }
        Err(BreakerError::Inner(error)) => {
            warn!(correlation_id = %instruction.correlation_id, %error, "gateway call failed");
            reject(state, &instruction, TransferRejectionReason::Unknown).await;
        }
    }
}

async fn handle_progress_check(
    myself: &ActorRef<DomesticWorkerMessage>,
    state: &DomesticWorkerState,
    instruction: DomesticInstruction,
    transaction_id: String,
    checks_done: u32,
) {
    if checks_done >= MAX_PROGRESS_CHECKS {
        warn!(correlation_id = %instruction.correlation_id, "transfer stuck, giving up");
        reject(state, &instruction, TransferRejectionReason::Unknown).await;
        return;
    }

    let outcome = state
        .breaker
        .call(|| state.gateway.check_progress(&transaction_id))
        .await;

    match outcome {
        Ok(response) => {
            dispatch_response(myself, state, instruction, response, checks_done).await;
        }
        Err(_) => {
            // Gateway trouble during polling is transient; the pending
            // transfer stays in flight and the next check retries.
            schedule_check(myself, state, instruction, transaction_id, checks_done + 1);
        }
    }
}

async fn dispatch_response(
    myself: &ActorRef<DomesticWorkerMessage>,
    state: &DomesticWorkerState,
    instruction: DomesticInstruction,
    response: GatewayTransferResponse,
    checks_done: u32,
) {
    if !response.ok {
        let reason = match response.reason.as_deref() {
            Some("invalid_account_info") => TransferRejectionReason::InvalidAccountInfo,
            _ => TransferRejectionReason::Unknown,
        };
        reject(state, &instruction, reason).await;
        return;
    }

    match response.status {
        GatewayTransferStatus::Complete => {
            let approve = AccountCommand::ApproveDomesticTransfer {
                base: sender_base(&instruction),
            };
            if let Err(error) = state.deps.router().tell_account(approve).await {
                warn!(correlation_id = %instruction.correlation_id, %error, "approve dispatch failed");
            }
        }
        GatewayTransferStatus::Received | GatewayTransferStatus::Processing => {
            let progress = AccountCommand::UpdateDomesticTransferProgress {
                base: sender_base(&instruction),
                progress: format!("{:?}", response.status),
            };
            // A no-change progress update is refused by the aggregate and
            // ignored here.
            let _ = state.deps.router().tell_account(progress).await;

            match response.transaction_id {
                Some(transaction_id) => {
                    schedule_check(myself, state, instruction, transaction_id, checks_done + 1);
                }
                None => {
                    warn!(correlation_id = %instruction.correlation_id, "gateway lost the ticket");
                    reject(state, &instruction, TransferRejectionReason::Unknown).await;
                }
            }
        }
        GatewayTransferStatus::Failed => {
            reject(state, &instruction, TransferRejectionReason::Unknown).await;
        }
    }
}

fn schedule_check(
    myself: &ActorRef<DomesticWorkerMessage>,
    state: &DomesticWorkerState,
    instruction: DomesticInstruction,
    transaction_id: String,
    checks_done: u32,
) {
    let _ = myself.send_after(state.deps.config.progress_check_interval, move || {
        DomesticWorkerMessage::ProgressCheck {
            instruction,
            transaction_id,
            checks_done,
        }
    });
}

async fn reject(
    state: &DomesticWorkerState,
    instruction: &DomesticInstruction,
    reason: TransferRejectionReason,
) {
    let command = AccountCommand::RejectDomesticTransfer {
        base: sender_base(instruction),
        reason,
    };
    if let Err(error) = state.deps.router().tell_account(command).await {
        warn!(correlation_id = %instruction.correlation_id, %error, "reject dispatch failed");
    }
}

fn sender_base(instruction: &DomesticInstruction) -> MessageBase {
    MessageBase {
        entity_id: instruction.sender,
        org_id: instruction.org_id,
        correlation_id: instruction.correlation_id,
        initiated_by: InitiatorId::new(),
        timestamp: chrono::Utc::now(),
    }
}
