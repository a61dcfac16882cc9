//! Node wiring: in-memory infrastructure, the sharded entity router, and
//! the node-wide singletons (domestic transfer worker, billing fan-out,
//! closure finalizer). Every adapter sits behind a port, so swapping the
//! in-memory journal for a durable one is a boot-time change.

use std::sync::Arc;

use ractor::{Actor, ActorRef};
use tracing::info;

use crate::adapter::runtime::{RuntimeDeps, ShardRouter, roles};
use crate::adapter::{
    AccountBus, InMemoryAccountReadModel, InMemoryJournal, InMemorySnapshots,
    InMemoryStatementStore, MockDomesticGateway, RecordingEmailProxy, RecordingScheduler,
    spawn_projector,
};
use crate::config::Config;
use crate::domain::{
    AccountCommand, AccountId, AccountState, BankError, Confirmable, ConfirmationId,
    EmployeeCommand, EmployeeId, EmployeeState, RuntimeError,
};
use crate::service::billing::{BillingArgs, BillingCycleFanout, BillingMessage};
use crate::service::closure::{AccountClosureFinalizer, ClosureArgs, ClosureMessage};
use crate::service::domestic::{DomesticTransferWorker, DomesticWorkerArgs, DomesticWorkerMessage};

/// A running node. Owns the router, the broadcast bus, and handles to the
/// in-memory adapters so callers (demo, tests) can assert on what crossed
/// the ports.
pub struct Bank {
    pub config: Config,
    pub router: ShardRouter,
    pub bus: AccountBus,
    pub email: Arc<RecordingEmailProxy>,
    pub scheduler: Arc<RecordingScheduler>,
    pub statements: Arc<InMemoryStatementStore>,
    pub read_model: Arc<InMemoryAccountReadModel>,
    pub gateway: Arc<MockDomesticGateway>,
    deps: Arc<RuntimeDeps>,
    domestic_worker: ActorRef<DomesticWorkerMessage>,
    billing: ActorRef<BillingMessage>,
    closure: ActorRef<ClosureMessage>,
    projector: tokio::task::JoinHandle<()>,
}

impl Bank {
    pub async fn boot(config: Config) -> Result<Self, RuntimeError> {
        // The ractor registry is process-global; a unique namespace keeps
        // concurrently booted nodes (tests) from colliding.
        let namespace = format!("bank-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        let bus = AccountBus::default();
        let journal = Arc::new(InMemoryJournal::new());
        let snapshots = Arc::new(InMemorySnapshots::new());
        let email = RecordingEmailProxy::new();
        let scheduler = RecordingScheduler::new();
        let statements = InMemoryStatementStore::new();
        let read_model = InMemoryAccountReadModel::new();
        let gateway = MockDomesticGateway::new();

        let deps = RuntimeDeps::new(
            config.clone(),
            namespace,
            journal,
            snapshots,
            bus.clone(),
            email.clone(),
            scheduler.clone(),
            statements.clone(),
        );
        let router = ShardRouter::new(deps.clone());

        let projector = spawn_projector(&bus, read_model.clone());

        let (domestic_worker, _) = Actor::spawn(
            Some(deps.singleton_name(roles::DOMESTIC_WORKER)),
            DomesticTransferWorker,
            DomesticWorkerArgs {
                deps: deps.clone(),
                gateway: gateway.clone(),
            },
        )
        .await
        .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))?;

        let (billing, _) = Actor::spawn(
            Some(deps.singleton_name(roles::BILLING_CYCLE)),
            BillingCycleFanout,
            BillingArgs {
                deps: deps.clone(),
                read_model: read_model.clone(),
            },
        )
        .await
        .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))?;

        let (closure, _) = Actor::spawn(
            Some(deps.singleton_name(roles::ACCOUNT_CLOSURE)),
            AccountClosureFinalizer,
            ClosureArgs { deps: deps.clone() },
        )
        .await
        .map_err(|e| RuntimeError::EntityUnavailable(e.to_string()))?;

        // The external scheduler owns the monthly cadence; it delivers
        // BillingCycleFanout back to the billing singleton.
        deps.scheduler
            .schedule(crate::port::ScheduledWork::BillingCycleFanout {
                cron: "0 0 1 * *".into(),
            })
            .await;

        info!("bank node initialized");

        Ok(Self {
            config,
            router,
            bus,
            email,
            scheduler,
            statements,
            read_model,
            gateway,
            deps,
            domestic_worker,
            billing,
            closure,
            projector,
        })
    }

    /// Command ingress: wrap in a confirmable envelope and wait for the
    /// persist acknowledgment.
    pub async fn send(&self, command: AccountCommand) -> Result<u64, BankError> {
        let confirmation = ConfirmationId::new(format!("api:{}", uuid::Uuid::new_v4()));
        self.router
            .send_account_command(Confirmable::first(command, confirmation))
            .await
    }

    pub async fn send_envelope(
        &self,
        envelope: Confirmable<AccountCommand>,
    ) -> Result<u64, BankError> {
        self.router.send_account_command(envelope).await
    }

    pub async fn send_employee(&self, command: EmployeeCommand) -> Result<u64, BankError> {
        let confirmation = ConfirmationId::new(format!("api:{}", uuid::Uuid::new_v4()));
        self.router
            .send_employee_command(Confirmable::first(command, confirmation))
            .await
    }

    pub async fn get_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountState>, RuntimeError> {
        self.router.get_account(account_id).await
    }

    pub async fn get_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<EmployeeState>, RuntimeError> {
        self.router.get_employee(employee_id).await
    }

    /// Kick the monthly fan-out, normally driven by the external
    /// scheduler.
    pub fn trigger_billing_fanout(&self) {
        let _ = self.billing.cast(BillingMessage::BillingCycleFanout);
    }

    /// Reactivate remembered entities after a node restart.
    pub async fn recover(&self) -> Result<usize, RuntimeError> {
        self.router.recover_remembered().await
    }

    pub fn deps(&self) -> &Arc<RuntimeDeps> {
        &self.deps
    }

    pub async fn shutdown(self) {
        self.domestic_worker.stop(None);
        self.billing.stop(None);
        self.closure.stop(None);
        self.projector.abort();
    }
}
