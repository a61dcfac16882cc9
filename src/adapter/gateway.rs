use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::port::{
    DomesticGateway, GatewayError, GatewayTransferRequest, GatewayTransferResponse,
    GatewayTransferStatus,
};

/// Scripted behavior of the mock gateway, settable per test and from the
/// demo scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayBehavior {
    /// Accept; progress checks complete after `checks_until_complete`
    /// polls.
    Accept { checks_until_complete: u32 },
    /// Decline every request as invalid account info.
    InvalidAccountInfo,
    /// Connection-level failure, feeds the circuit breaker.
    Unavailable,
}

struct Ticket {
    checks_remaining: u32,
}

/// In-memory stand-in for the domestic transfer network.
pub struct MockDomesticGateway {
    behavior: Mutex<GatewayBehavior>,
    tickets: Mutex<HashMap<String, Ticket>>,
    counter: Mutex<u64>,
}

impl MockDomesticGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(GatewayBehavior::Accept {
                checks_until_complete: 1,
            }),
            tickets: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
        })
    }

    pub async fn set_behavior(&self, behavior: GatewayBehavior) {
        *self.behavior.lock().await = behavior;
    }
}

#[async_trait]
impl DomesticGateway for MockDomesticGateway {
    async fn initiate(
        &self,
        request: GatewayTransferRequest,
    ) -> Result<GatewayTransferResponse, GatewayError> {
        match *self.behavior.lock().await {
            GatewayBehavior::Unavailable => {
                Err(GatewayError::Unavailable("connection refused".into()))
            }
            GatewayBehavior::InvalidAccountInfo => Ok(GatewayTransferResponse {
                ok: false,
                status: GatewayTransferStatus::Failed,
                reason: Some("invalid_account_info".into()),
                transaction_id: None,
            }),
            GatewayBehavior::Accept {
                checks_until_complete,
            } => {
                let mut counter = self.counter.lock().await;
                *counter += 1;
                let transaction_id = format!("txn-{:06}-{}", *counter, request.reference);
                self.tickets.lock().await.insert(
                    transaction_id.clone(),
                    Ticket {
                        checks_remaining: checks_until_complete,
                    },
                );
                Ok(GatewayTransferResponse {
                    ok: true,
                    status: GatewayTransferStatus::Received,
                    reason: None,
                    transaction_id: Some(transaction_id),
                })
            }
        }
    }

    async fn check_progress(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransferResponse, GatewayError> {
        if matches!(*self.behavior.lock().await, GatewayBehavior::Unavailable) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }

        let mut tickets = self.tickets.lock().await;
        let Some(ticket) = tickets.get_mut(transaction_id) else {
            return Ok(GatewayTransferResponse {
                ok: false,
                status: GatewayTransferStatus::Failed,
                reason: Some("unknown_transaction".into()),
                transaction_id: Some(transaction_id.to_string()),
            });
        };

        if ticket.checks_remaining > 0 {
            ticket.checks_remaining -= 1;
        }
        let status = if ticket.checks_remaining == 0 {
            GatewayTransferStatus::Complete
        } else {
            GatewayTransferStatus::Processing
        };

        Ok(GatewayTransferResponse {
            ok: true,
            status,
            reason: None,
            transaction_id: Some(transaction_id.to_string()),
        })
    }
}
