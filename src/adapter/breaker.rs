//! Circuit breaker around the domestic transfer gateway.
//!
//! States: **Closed** (requests pass, failures counted), **Open** (fail
//! fast for the cooldown window), **HalfOpen** (one probe allowed; success
//! closes the circuit, failure reopens it). Transitions are broadcast so
//! health widgets can show gateway state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::adapter::{AccountBus, AccountObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before Closed -> Open.
    pub failure_threshold: u32,
    /// Time spent Open before the next request probes HalfOpen.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

pub struct CircuitBreaker {
    service: &'static str,
    config: BreakerConfig,
    inner: Arc<RwLock<BreakerInner>>,
    bus: AccountBus,
}

impl CircuitBreaker {
    pub fn new(service: &'static str, config: BreakerConfig, bus: AccountBus) -> Self {
        Self {
            service,
            config,
            inner: Arc::new(RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            })),
            bus,
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.read().await.state
    }

    /// Run `operation` under the breaker. In Open state the call is
    /// rejected without touching the gateway; the first caller after the
    /// cooldown becomes the HalfOpen probe and traffic is gated to it.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.write().await;
            match inner.state {
                BreakerState::Closed => {}
                BreakerState::Open => {
                    let cooled_down = inner
                        .opened_at
                        .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                    if !cooled_down {
                        return Err(BreakerError::Open);
                    }
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                }
                BreakerState::HalfOpen => {
                    if inner.probe_in_flight {
                        return Err(BreakerError::Open);
                    }
                    inner.probe_in_flight = true;
                }
            }
        }

        let result = operation().await;

        let mut inner = self.inner.write().await;
        inner.probe_in_flight = false;
        match result {
            Ok(value) => {
                inner.consecutive_failures = 0;
                if inner.state != BreakerState::Closed {
                    self.transition(&mut inner, BreakerState::Closed);
                }
                Ok(value)
            }
            Err(error) => {
                inner.consecutive_failures += 1;
                match inner.state {
                    BreakerState::HalfOpen => {
                        inner.opened_at = Some(Instant::now());
                        self.transition(&mut inner, BreakerState::Open);
                    }
                    BreakerState::Closed
                        if inner.consecutive_failures >= self.config.failure_threshold =>
                    {
                        inner.opened_at = Some(Instant::now());
                        self.transition(&mut inner, BreakerState::Open);
                    }
                    _ => {}
                }
                Err(BreakerError::Inner(error))
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        if to == BreakerState::Open {
            warn!(service = self.service, ?to, "circuit breaker opened");
        } else {
            info!(service = self.service, ?to, "circuit breaker transition");
        }
        inner.state = to;
        self.bus.publish(AccountObservation::ServiceHealth {
            service: self.service,
            state: to,
        });
    }
}
