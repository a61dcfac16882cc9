mod account;
mod employee;
mod shard;

pub use account::{AccountActor, AccountMessage};
pub use employee::{EmployeeActor, EmployeeMessage};
pub use shard::{RememberedEntity, ShardIndexEvent, ShardRouter};

use std::sync::{Arc, OnceLock};

use crate::adapter::AccountBus;
use crate::config::Config;
use crate::port::{BillingStatementStore, EmailProxy, Journal, SchedulerProxy, SnapshotStore};

/// Shared dependencies handed to every entity actor. Components hold only
/// entity ids and reach each other through the router and the named
/// singleton registry, which breaks the sender/recipient/coordinator
/// reference cycles.
pub struct RuntimeDeps {
    pub config: Config,
    /// Prefix for every actor name this node registers. The ractor
    /// registry is process-global, so parallel test banks need disjoint
    /// namespaces.
    pub namespace: String,
    pub journal: Arc<dyn Journal>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub bus: AccountBus,
    pub email: Arc<dyn EmailProxy>,
    pub scheduler: Arc<dyn SchedulerProxy>,
    pub statements: Arc<dyn BillingStatementStore>,
    router: OnceLock<ShardRouter>,
}

impl RuntimeDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        namespace: String,
        journal: Arc<dyn Journal>,
        snapshots: Arc<dyn SnapshotStore>,
        bus: AccountBus,
        email: Arc<dyn EmailProxy>,
        scheduler: Arc<dyn SchedulerProxy>,
        statements: Arc<dyn BillingStatementStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            namespace,
            journal,
            snapshots,
            bus,
            email,
            scheduler,
            statements,
            router: OnceLock::new(),
        })
    }

    pub(crate) fn install_router(&self, router: ShardRouter) {
        let _ = self.router.set(router);
    }

    /// The sharded entity router. Installed right after construction at
    /// boot; entity code can rely on it.
    pub fn router(&self) -> &ShardRouter {
        self.router.get().expect("router installed at boot")
    }

    /// Namespaced actor name for a node-wide singleton.
    pub fn singleton_name(&self, role: &str) -> String {
        format!("{}-{role}", self.namespace)
    }
}

/// Singleton role names used with the named-actor registry.
pub mod roles {
    pub const DOMESTIC_WORKER: &str = "domestic-transfer-worker";
    pub const BILLING_CYCLE: &str = "billing-cycle";
    pub const ACCOUNT_CLOSURE: &str = "account-closure";
}
