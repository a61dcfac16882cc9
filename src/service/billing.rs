//! Billing-cycle fan-out: a singleton that streams billing-due account
//! ids from the read model and emits one `StartBillingCycle` per account
//! under a token-bucket pace.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{info, warn};

use crate::adapter::runtime::RuntimeDeps;
use crate::adapter::{ThrottleConfig, TokenBucket};
use crate::domain::{AccountCommand, BillingPeriod, InitiatorId, MessageBase};
use crate::port::AccountReadModel;

pub enum BillingMessage {
    /// Externally scheduled, monthly.
    BillingCycleFanout,
    BillingCycleFinished { issued: usize },
}

impl ractor::Message for BillingMessage {}

pub struct BillingArgs {
    pub deps: Arc<RuntimeDeps>,
    pub read_model: Arc<dyn AccountReadModel>,
}

pub struct BillingState {
    deps: Arc<RuntimeDeps>,
    read_model: Arc<dyn AccountReadModel>,
    throttle: TokenBucket,
}

pub struct BillingCycleFanout;

#[async_trait]
impl Actor for BillingCycleFanout {
    type Msg = BillingMessage;
    type State = BillingState;
    type Arguments = BillingArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: BillingArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let throttle = TokenBucket::new(ThrottleConfig {
            burst: args.deps.config.billing_burst,
            refill_per_sec: args.deps.config.billing_refill_per_sec,
        });
        Ok(BillingState {
            deps: args.deps,
            read_model: args.read_model,
            throttle,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BillingMessage::BillingCycleFanout => {
                let now = Utc::now();
                let boundary = now - state.deps.config.billing_lookback;
                let due = state.read_model.billing_due_accounts(boundary).await;
                info!(accounts = due.len(), "billing cycle fan-out starting");

                let period = BillingPeriod::of(now);
                let initiator = InitiatorId::new();
                let mut issued = 0;
                for account in due {
                    state.throttle.acquire().await;
                    let command = AccountCommand::StartBillingCycle {
                        base: MessageBase::new(account.account_id, account.org_id, initiator),
                        period,
                    };
                    match state.deps.router().tell_account(command).await {
                        Ok(()) => issued += 1,
                        Err(error) => {
                            warn!(account_id = %account.account_id, %error, "billing command dispatch failed");
                        }
                    }
                }
                let _ = myself.cast(BillingMessage::BillingCycleFinished { issued });
            }

            BillingMessage::BillingCycleFinished { issued } => {
                info!(issued, "billing cycle fan-out finished");
            }
        }
        Ok(())
    }
}
