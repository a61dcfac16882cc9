//! Internal transfer coordinator: child task of the sender account actor,
//! one per sender. Validates the recipient side of a pending internal
//! transfer and issues the terminal verdicts on both aggregates, tied by
//! the pending event's correlation id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::adapter::runtime::RuntimeDeps;
use crate::domain::{
    AccountCommand, AccountId, AccountStatus, CorrelationId, InitiatorId, MessageBase,
    TransferKind, TransferRejectionReason, TransferSender,
};

/// Attempts 1 through 3 may retry on recipient unavailability (1 s, 2 s,
/// 4 s backoff); the fourth attempt gives up with an Unknown rejection.
const MAX_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone)]
pub struct InternalTransferRequest {
    pub kind: TransferKind,
    pub correlation_id: CorrelationId,
    pub amount: Decimal,
    pub recipient_account: AccountId,
    pub sender: TransferSender,
    pub attempt: u32,
}

pub enum TransferCoordinatorMessage {
    Request(InternalTransferRequest),
}

impl ractor::Message for TransferCoordinatorMessage {}

pub struct TransferCoordinatorArgs {
    pub deps: Arc<RuntimeDeps>,
}

pub struct TransferCoordinator;

#[async_trait]
impl Actor for TransferCoordinator {
    type Msg = TransferCoordinatorMessage;
    type State = Arc<RuntimeDeps>;
    type Arguments = TransferCoordinatorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: TransferCoordinatorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(args.deps)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        deps: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let TransferCoordinatorMessage::Request(request) = message;
        handle_request(&myself, deps, request).await;
        Ok(())
    }
}

async fn handle_request(
    myself: &ActorRef<TransferCoordinatorMessage>,
    deps: &Arc<RuntimeDeps>,
    request: InternalTransferRequest,
) {
    let recipient = match deps.router().get_account(request.recipient_account).await {
        Ok(recipient) => recipient,
        Err(error) => {
            // Recipient unavailable: retry with exponential backoff, then
            // give up with an Unknown rejection.
            if request.attempt >= MAX_ATTEMPTS {
                warn!(
                    correlation_id = %request.correlation_id,
                    %error,
                    "recipient unavailable after retries"
                );
                reject(deps, &request, TransferRejectionReason::Unknown).await;
                return;
            }
            // Exponent is bounded by the give-up check above, keeping the
            // backoff inside the 1-8s window.
            let backoff = Duration::from_secs(1 << (request.attempt - 1));
            debug!(
                correlation_id = %request.correlation_id,
                attempt = request.attempt,
                ?backoff,
                "recipient ask failed, retrying"
            );
            let retry = InternalTransferRequest {
                attempt: request.attempt + 1,
                ..request
            };
            let _ = myself.send_after(backoff, move || {
                TransferCoordinatorMessage::Request(retry)
            });
            return;
        }
    };

    match recipient {
        None => {
            reject(deps, &request, TransferRejectionReason::InvalidAccountInfo).await;
        }
        Some(recipient) if recipient.status != AccountStatus::Active => {
            reject(deps, &request, TransferRejectionReason::AccountClosed).await;
        }
        Some(recipient) => {
            let initiator = InitiatorId::new();
            let approve = AccountCommand::ApproveInternalTransfer {
                base: command_base(request.sender.account_id, &request, initiator),
                kind: request.kind,
            };
            if let Err(error) = deps.router().tell_account(approve).await {
                warn!(correlation_id = %request.correlation_id, %error, "approve dispatch failed");
            }

            let deposit_base = MessageBase {
                entity_id: recipient.account_id,
                org_id: recipient.org_id,
                correlation_id: request.correlation_id,
                initiated_by: initiator,
                timestamp: chrono::Utc::now(),
            };
            let deposit = match request.kind {
                TransferKind::WithinOrg => AccountCommand::DepositTransferWithinOrg {
                    base: deposit_base,
                    amount: request.amount,
                    sender: request.sender.clone(),
                },
                TransferKind::BetweenOrgs => AccountCommand::DepositTransferBetweenOrgs {
                    base: deposit_base,
                    amount: request.amount,
                    sender: request.sender.clone(),
                },
                TransferKind::Automated => AccountCommand::DepositAutoTransfer {
                    base: deposit_base,
                    amount: request.amount,
                    sender: request.sender.clone(),
                },
                // Domestic transfers never reach this coordinator.
                TransferKind::Domestic => return,
            };
            if let Err(error) = deps.router().tell_account(deposit).await {
                warn!(correlation_id = %request.correlation_id, %error, "deposit dispatch failed");
            }
        }
    }
}

async fn reject(
    deps: &Arc<RuntimeDeps>,
    request: &InternalTransferRequest,
    reason: TransferRejectionReason,
) {
    let command = AccountCommand::RejectInternalTransfer {
        base: command_base(request.sender.account_id, request, InitiatorId::new()),
        kind: request.kind,
        reason,
    };
    if let Err(error) = deps.router().tell_account(command).await {
        warn!(correlation_id = %request.correlation_id, %error, "reject dispatch failed");
    }
}

fn command_base(
    entity_id: AccountId,
    request: &InternalTransferRequest,
    initiator: InitiatorId,
) -> MessageBase {
    MessageBase {
        entity_id,
        org_id: request.sender.org_id,
        correlation_id: request.correlation_id,
        initiated_by: initiator,
        timestamp: chrono::Utc::now(),
    }
}
