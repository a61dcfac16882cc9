//! Recording adapters for the outbound proxies. The real deployments sit
//! behind these ports; in-process they record what was handed to them so
//! tests and the demo can assert on it, and log at info.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{AccountId, BillingStatement};
use crate::port::{
    BillingStatementStore, EmailMessage, EmailProxy, ScheduledWork, SchedulerProxy,
};

pub struct RecordingEmailProxy {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailProxy for RecordingEmailProxy {
    async fn queue(&self, message: EmailMessage) {
        info!(?message, "email queued");
        self.sent.lock().await.push(message);
    }
}

pub struct RecordingScheduler {
    scheduled: Mutex<Vec<ScheduledWork>>,
    deregistered: Mutex<Vec<AccountId>>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scheduled: Mutex::new(Vec::new()),
            deregistered: Mutex::new(Vec::new()),
        })
    }

    pub async fn scheduled(&self) -> Vec<ScheduledWork> {
        self.scheduled.lock().await.clone()
    }

    pub async fn deregistered(&self) -> Vec<AccountId> {
        self.deregistered.lock().await.clone()
    }
}

#[async_trait]
impl SchedulerProxy for RecordingScheduler {
    async fn schedule(&self, work: ScheduledWork) {
        info!(?work, "work scheduled");
        self.scheduled.lock().await.push(work);
    }

    async fn deregister_account(&self, account_id: AccountId) {
        info!(%account_id, "scheduled obligations deregistered");
        let mut scheduled = self.scheduled.lock().await;
        scheduled.retain(|work| !belongs_to(work, account_id));
        self.deregistered.lock().await.push(account_id);
    }
}

fn belongs_to(work: &ScheduledWork, account_id: AccountId) -> bool {
    match work {
        ScheduledWork::InternalTransferBetweenOrgs { sender, .. }
        | ScheduledWork::DomesticTransfer { sender, .. } => *sender == account_id,
        ScheduledWork::RecurringMaintenanceFee { account_id: id } => *id == account_id,
        ScheduledWork::BillingCycleFanout { .. } => false,
    }
}

pub struct InMemoryStatementStore {
    statements: Mutex<Vec<BillingStatement>>,
}

impl InMemoryStatementStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            statements: Mutex::new(Vec::new()),
        })
    }

    pub async fn statements(&self) -> Vec<BillingStatement> {
        self.statements.lock().await.clone()
    }
}

#[async_trait]
impl BillingStatementStore for InMemoryStatementStore {
    async fn append(&self, statement: BillingStatement) {
        self.statements.lock().await.push(statement);
    }
}
