use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::CorrelationId;

/// Wire request to the external domestic transfer network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayTransferRequest {
    pub account_number: String,
    pub routing_number: String,
    pub amount: Decimal,
    /// Caller reference; the sender-side correlation id.
    pub reference: CorrelationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayTransferStatus {
    Received,
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayTransferResponse {
    pub ok: bool,
    pub status: GatewayTransferStatus,
    /// Failure classification when `ok` is false
    /// (e.g. "invalid_account_info").
    pub reason: Option<String>,
    /// Gateway ticket used for progress checks.
    pub transaction_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway request timed out")]
    Timeout,
}

/// External domestic-transfer gateway. Calls are wrapped by the domestic
/// transfer worker's circuit breaker; implementations do not retry.
#[async_trait]
pub trait DomesticGateway: Send + Sync {
    async fn initiate(
        &self,
        request: GatewayTransferRequest,
    ) -> Result<GatewayTransferResponse, GatewayError>;

    async fn check_progress(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransferResponse, GatewayError>;
}
