//! Account closure finalizer. Registered on `AccountClosed`, it persists
//! a short-lived record, deregisters the account's scheduled obligations,
//! and drives journal deletion so the aggregate can passivate into
//! `ReadyForDelete`. Its own records are event-sourced, so closures that
//! were registered but never finalized are re-driven after a restart.

use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapter::runtime::RuntimeDeps;
use crate::domain::{AccountId, AppendMeta, ConfirmationId, EntityId, OrgId};
use crate::port::encode_events;

const CLOSURE_TAG: &str = "closure";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ClosureRecord {
    Registered { account_id: AccountId, org_id: OrgId },
    Finalized { account_id: AccountId },
}

pub enum ClosureMessage {
    Register { account_id: AccountId, org_id: OrgId },
    /// Re-drive closures left unfinished by a previous incarnation.
    Reconcile,
}

impl ractor::Message for ClosureMessage {}

pub struct ClosureArgs {
    pub deps: Arc<RuntimeDeps>,
}

pub struct ClosureState {
    deps: Arc<RuntimeDeps>,
    stream: EntityId,
    seq: u64,
}

pub struct AccountClosureFinalizer;

#[async_trait]
impl Actor for AccountClosureFinalizer {
    type Msg = ClosureMessage;
    type State = ClosureState;
    type Arguments = ClosureArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: ClosureArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let stream = EntityId::singleton(&format!("{}-closure", args.deps.namespace));
        let seq = args.deps.journal.highest_sequence(&stream).await?;
        let _ = myself.cast(ClosureMessage::Reconcile);
        Ok(ClosureState {
            deps: args.deps,
            stream,
            seq,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ClosureMessage::Register { account_id, org_id } => {
                info!(%account_id, "account closure registered");
                persist(
                    state,
                    ClosureRecord::Registered { account_id, org_id },
                    &format!("registered:{account_id}"),
                )
                .await;
                finalize(state, account_id).await;
            }

            ClosureMessage::Reconcile => {
                let pending = unfinished_closures(state).await;
                for account_id in pending {
                    info!(%account_id, "re-driving unfinished closure");
                    finalize(state, account_id).await;
                }
            }
        }
        Ok(())
    }
}

/// Deregister scheduled obligations, then hand the aggregate its delete
/// intent. The aggregate defers deletion until it has drained.
async fn finalize(state: &mut ClosureState, account_id: AccountId) {
    state.deps.scheduler.deregister_account(account_id).await;

    if let Err(error) = state.deps.router().delete_account(account_id).await {
        warn!(%account_id, %error, "delete dispatch failed, will retry on reconcile");
        return;
    }

    persist(
        state,
        ClosureRecord::Finalized { account_id },
        &format!("finalized:{account_id}"),
    )
    .await;
}

async fn persist(state: &mut ClosureState, record: ClosureRecord, confirmation: &str) {
    let Ok(payload) = encode_events(std::slice::from_ref(&record)) else {
        warn!("closure record encoding failed");
        return;
    };
    match state
        .deps
        .journal
        .append(
            &state.stream,
            state.seq,
            CLOSURE_TAG,
            payload,
            AppendMeta::confirmed(ConfirmationId::new(confirmation)),
        )
        .await
    {
        Ok(seq) => state.seq = seq,
        Err(error) => warn!(%error, "closure record append failed"),
    }
}

async fn unfinished_closures(state: &ClosureState) -> Vec<AccountId> {
    let Ok(records) = state
        .deps
        .journal
        .current_events_by_tag(CLOSURE_TAG)
        .await
    else {
        return Vec::new();
    };

    let mut pending = Vec::new();
    for record in records {
        if record.stream != state.stream {
            continue;
        }
        match crate::port::decode_event::<ClosureRecord>(&record) {
            Ok(ClosureRecord::Registered { account_id, .. }) => pending.push(account_id),
            Ok(ClosureRecord::Finalized { account_id }) => {
                pending.retain(|id| *id != account_id);
            }
            Err(error) => warn!(%error, "undecodable closure record"),
        }
    }
    pending
}
