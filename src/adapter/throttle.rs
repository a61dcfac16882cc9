//! Token-bucket pacing for the billing fan-out: a burst of tokens that
//! refills at a constant rate. Unlike a rejecting rate limiter, `acquire`
//! waits until a token is available, so the fan-out slows down instead of
//! dropping accounts.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Maximum tokens (burst capacity).
    pub burst: u32,
    /// Tokens refilled per second.
    pub refill_per_sec: f64,
}

struct ThrottleState {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    config: ThrottleConfig,
    state: Mutex<ThrottleState>,
}

impl TokenBucket {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ThrottleState {
                tokens: f64::from(config.burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.config.refill_per_sec)
                    .min(f64::from(self.config.burst));
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Sleep outside the lock for exactly the deficit.
                Duration::from_secs_f64((1.0 - state.tokens) / self.config.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn available(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.config.refill_per_sec).min(f64::from(self.config.burst))
    }
}
