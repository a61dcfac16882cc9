use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    AccountCommand, AccountId, AccountState, AppendMeta, BankError, Confirmable, ConfirmationId,
    EmployeeCommand, EmployeeId, EmployeeState, EntityId, RuntimeError,
};
use crate::port::{decode_event, encode_events};

use super::account::{AccountActor, AccountActorArgs, AccountMessage};
use super::employee::{EmployeeActor, EmployeeActorArgs, EmployeeMessage};
use super::RuntimeDeps;

const SHARD_INDEX_TAG: &str = "shard-index";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum RememberedEntity {
    Account(AccountId),
    Employee(EmployeeId),
}

/// Shard index events. Each shard's index is itself event-sourced so
/// entities known to the shard are reactivated after a restart
/// (remember-entities).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShardIndexEvent {
    EntityActivated { entity: RememberedEntity },
    EntityForgotten { entity: RememberedEntity },
}

/// Partitions the entity id space across shards by consistent hash and
/// owns the get-or-spawn path for entity actors. Spawn races are settled
/// by the ractor named-actor registry: the name is a singleton, whoever
/// loses the race looks the winner up.
#[derive(Clone)]
pub struct ShardRouter {
    deps: Arc<RuntimeDeps>,
}

impl ShardRouter {
    pub fn new(deps: Arc<RuntimeDeps>) -> Self {
        let router = Self { deps: deps.clone() };
        deps.install_router(router.clone());
        router
    }

    pub fn shard_of(&self, entity: &RememberedEntity) -> u32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        entity.hash(&mut hasher);
        (hasher.finish() % u64::from(self.deps.config.shard_count)) as u32
    }

    fn account_actor_name(&self, account_id: AccountId) -> String {
        let shard = self.shard_of(&RememberedEntity::Account(account_id));
        format!("{}-shard-{shard}-account-{account_id}", self.deps.namespace)
    }

    fn employee_actor_name(&self, employee_id: EmployeeId) -> String {
        let shard = self.shard_of(&RememberedEntity::Employee(employee_id));
        format!(
            "{}-shard-{shard}-employee-{employee_id}",
            self.deps.namespace
        )
    }

    pub async fn get_or_spawn_account(
        &self,
        account_id: AccountId,
    ) -> Result<ActorRef<AccountMessage>, RuntimeError> {
        let name = self.account_actor_name(account_id);
        if let Some(actor) = ActorRef::<AccountMessage>::where_is(name.clone()) {
            return Ok(actor);
        }

        let args = AccountActorArgs {
            account_id,
            deps: self.deps.clone(),
        };
        match Actor::spawn(Some(name.clone()), AccountActor, args).await {
            Ok((actor, _handle)) => {
                self.remember(RememberedEntity::Account(account_id)).await;
                Ok(actor)
            }
            Err(spawn_err) => {
                // Lost a spawn race; the registered winner serves us.
                ActorRef::<AccountMessage>::where_is(name.clone()).ok_or_else(|| {
                    RuntimeError::EntityUnavailable(format!("{name}: {spawn_err}"))
                })
            }
        }
    }

    pub async fn get_or_spawn_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<ActorRef<EmployeeMessage>, RuntimeError> {
        let name = self.employee_actor_name(employee_id);
        if let Some(actor) = ActorRef::<EmployeeMessage>::where_is(name.clone()) {
            return Ok(actor);
        }

        let args = EmployeeActorArgs {
            employee_id,
            deps: self.deps.clone(),
        };
        match Actor::spawn(Some(name.clone()), EmployeeActor, args).await {
            Ok((actor, _handle)) => {
                self.remember(RememberedEntity::Employee(employee_id)).await;
                Ok(actor)
            }
            Err(spawn_err) => ActorRef::<EmployeeMessage>::where_is(name.clone())
                .ok_or_else(|| RuntimeError::EntityUnavailable(format!("{name}: {spawn_err}"))),
        }
    }

    /// Route a confirmable command and wait for the persist
    /// acknowledgment.
    pub async fn send_account_command(
        &self,
        envelope: Confirmable<AccountCommand>,
    ) -> Result<u64, BankError> {
        let actor = self
            .get_or_spawn_account(envelope.payload.account_id())
            .await
            .map_err(BankError::Runtime)?;

        let timeout = self.deps.config.ask_timeout;
        match actor
            .call(
                |reply| AccountMessage::StateChange {
                    envelope,
                    reply: Some(reply),
                },
                Some(timeout),
            )
            .await
        {
            Ok(CallResult::Success(result)) => result,
            Ok(CallResult::Timeout) => Err(BankError::Runtime(RuntimeError::AskTimeout(
                timeout.as_millis() as u64,
            ))),
            Ok(CallResult::SenderError) | Err(_) => Err(BankError::Runtime(
                RuntimeError::EntityUnavailable("account actor dropped the reply".into()),
            )),
        }
    }

    /// Fire-and-forget command synthesized inside the engine.
    pub async fn tell_account(&self, command: AccountCommand) -> Result<(), RuntimeError> {
        let actor = self.get_or_spawn_account(command.account_id()).await?;
        actor
            .cast(AccountMessage::StateChange {
                envelope: Confirmable::internal(command),
                reply: None,
            })
            .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))
    }

    pub async fn send_employee_command(
        &self,
        envelope: Confirmable<EmployeeCommand>,
    ) -> Result<u64, BankError> {
        let actor = self
            .get_or_spawn_employee(envelope.payload.base().entity_id)
            .await
            .map_err(BankError::Runtime)?;

        let timeout = self.deps.config.ask_timeout;
        match actor
            .call(
                |reply| EmployeeMessage::StateChange {
                    envelope,
                    reply: Some(reply),
                },
                Some(timeout),
            )
            .await
        {
            Ok(CallResult::Success(result)) => result,
            Ok(CallResult::Timeout) => Err(BankError::Runtime(RuntimeError::AskTimeout(
                timeout.as_millis() as u64,
            ))),
            Ok(CallResult::SenderError) | Err(_) => Err(BankError::Runtime(
                RuntimeError::EntityUnavailable("employee actor dropped the reply".into()),
            )),
        }
    }

    pub async fn tell_employee(&self, command: EmployeeCommand) -> Result<(), RuntimeError> {
        let actor = self
            .get_or_spawn_employee(command.base().entity_id)
            .await?;
        actor
            .cast(EmployeeMessage::StateChange {
                envelope: Confirmable::internal(command),
                reply: None,
            })
            .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))
    }

    /// Snapshot ask against an account entity, activating it if needed.
    pub async fn get_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountState>, RuntimeError> {
        let actor = self.get_or_spawn_account(account_id).await?;
        let timeout = self.deps.config.ask_timeout;
        match actor.call(AccountMessage::GetAccount, Some(timeout)).await {
            Ok(CallResult::Success(state)) => Ok(state),
            Ok(CallResult::Timeout) => {
                Err(RuntimeError::AskTimeout(timeout.as_millis() as u64))
            }
            Ok(CallResult::SenderError) | Err(_) => Err(RuntimeError::EntityUnavailable(
                "account actor dropped the reply".into(),
            )),
        }
    }

    pub async fn get_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<EmployeeState>, RuntimeError> {
        let actor = self.get_or_spawn_employee(employee_id).await?;
        let timeout = self.deps.config.ask_timeout;
        match actor
            .call(EmployeeMessage::GetEmployee, Some(timeout))
            .await
        {
            Ok(CallResult::Success(state)) => Ok(state),
            Ok(CallResult::Timeout) => {
                Err(RuntimeError::AskTimeout(timeout.as_millis() as u64))
            }
            Ok(CallResult::SenderError) | Err(_) => Err(RuntimeError::EntityUnavailable(
                "employee actor dropped the reply".into(),
            )),
        }
    }

    /// Start journal deletion and passivation of a closed account.
    pub async fn delete_account(&self, account_id: AccountId) -> Result<(), RuntimeError> {
        let actor = self.get_or_spawn_account(account_id).await?;
        actor
            .cast(AccountMessage::Delete)
            .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))
    }

    /// Record an activation in the shard's event-sourced index.
    async fn remember(&self, entity: RememberedEntity) {
        self.record_index_event(
            entity,
            ShardIndexEvent::EntityActivated { entity },
            "activated",
        )
        .await;
    }

    /// Record that an entity was deleted so recovery stops reviving it.
    pub(crate) async fn forget(&self, entity: RememberedEntity) {
        self.record_index_event(
            entity,
            ShardIndexEvent::EntityForgotten { entity },
            "forgotten",
        )
        .await;
    }

    async fn record_index_event(
        &self,
        entity: RememberedEntity,
        event: ShardIndexEvent,
        kind: &str,
    ) {
        let shard = self.shard_of(&entity);
        let stream = EntityId::shard(shard);
        let confirmation = ConfirmationId::new(format!("{kind}:{entity:?}"));
        let Ok(payload) = encode_events(&[event]) else {
            warn!(shard, "failed to encode shard index event");
            return;
        };

        // Concurrent activations on one shard race on the expected
        // sequence; a short re-read loop settles it. The confirmation id
        // keeps the record unique regardless.
        for _ in 0..5 {
            let Ok(current) = self.deps.journal.highest_sequence(&stream).await else {
                return;
            };
            match self
                .deps
                .journal
                .append(
                    &stream,
                    current,
                    SHARD_INDEX_TAG,
                    payload.clone(),
                    AppendMeta::confirmed(confirmation.clone()),
                )
                .await
            {
                Ok(_) => return,
                Err(crate::domain::JournalError::Conflict { .. }) => continue,
                Err(error) => {
                    warn!(shard, %error, "shard index append failed");
                    return;
                }
            }
        }
        warn!(shard, "shard index append kept conflicting, giving up");
    }

    /// Reactivate every entity the shard indexes remember. Called at node
    /// start so aggregates with scheduled obligations come back without
    /// waiting for traffic.
    pub async fn recover_remembered(&self) -> Result<usize, RuntimeError> {
        let mut remembered: HashSet<RememberedEntity> = HashSet::new();

        for shard in 0..self.deps.config.shard_count {
            let stream = EntityId::shard(shard);
            let records = self
                .deps
                .journal
                .read(&stream, 1, u64::MAX)
                .await
                .map_err(|e| RuntimeError::ReplayFailed(e.to_string()))?;
            for record in records {
                match decode_event::<ShardIndexEvent>(&record) {
                    Ok(ShardIndexEvent::EntityActivated { entity }) => {
                        remembered.insert(entity);
                    }
                    Ok(ShardIndexEvent::EntityForgotten { entity }) => {
                        remembered.remove(&entity);
                    }
                    Err(error) => {
                        warn!(shard, %error, "undecodable shard index record");
                    }
                }
            }
        }

        let count = remembered.len();
        for entity in remembered {
            debug!(?entity, "reactivating remembered entity");
            match entity {
                RememberedEntity::Account(id) => {
                    self.get_or_spawn_account(id).await?;
                }
                RememberedEntity::Employee(id) => {
                    self.get_or_spawn_employee(id).await?;
                }
            }
        }
        Ok(count)
    }
}
