//! Runtime configuration.
//!
//! Loaded from environment variables; every knob has a default so the demo
//! and the test suite run with no environment at all.

use std::env;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of shards the account id space is partitioned into.
    pub shard_count: u32,

    /// Idle time after which an entity snapshots and passivates.
    pub passivation_timeout: Duration,

    /// Timeout for asks against other entities (recipient lookups etc).
    pub ask_timeout: Duration,

    /// How far below zero an account balance may go.
    pub overdraft_allowance: Decimal,

    /// Monthly maintenance fee debited when no skip criterion holds.
    pub maintenance_fee: Decimal,

    /// Consecutive gateway failures before the domestic breaker opens.
    pub breaker_failure_threshold: u32,

    /// How long the domestic breaker stays open before probing.
    pub breaker_cooldown: Duration,

    /// Interval between domestic transfer progress checks.
    pub progress_check_interval: Duration,

    /// Billing fan-out token bucket: burst size and refill per second.
    pub billing_burst: u32,
    pub billing_refill_per_sec: f64,

    /// Accounts whose last billing cycle is older than this are due.
    pub billing_lookback: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: 8,
            passivation_timeout: Duration::from_secs(120),
            ask_timeout: Duration::from_secs(5),
            overdraft_allowance: Decimal::ZERO,
            maintenance_fee: dec!(5),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            progress_check_interval: Duration::from_secs(15),
            billing_burst: 50,
            billing_refill_per_sec: 25.0,
            billing_lookback: chrono::Duration::days(27),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shard_count: env_parse("COREBANK_SHARD_COUNT", defaults.shard_count),
            passivation_timeout: env_secs(
                "COREBANK_PASSIVATION_TIMEOUT_SECS",
                defaults.passivation_timeout,
            ),
            ask_timeout: env_secs("COREBANK_ASK_TIMEOUT_SECS", defaults.ask_timeout),
            overdraft_allowance: env_parse(
                "COREBANK_OVERDRAFT_ALLOWANCE",
                defaults.overdraft_allowance,
            ),
            maintenance_fee: env_parse("COREBANK_MAINTENANCE_FEE", defaults.maintenance_fee),
            breaker_failure_threshold: env_parse(
                "COREBANK_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_cooldown: env_secs("COREBANK_BREAKER_COOLDOWN_SECS", defaults.breaker_cooldown),
            progress_check_interval: env_secs(
                "COREBANK_PROGRESS_CHECK_SECS",
                defaults.progress_check_interval,
            ),
            billing_burst: env_parse("COREBANK_BILLING_BURST", defaults.billing_burst),
            billing_refill_per_sec: env_parse(
                "COREBANK_BILLING_REFILL_PER_SEC",
                defaults.billing_refill_per_sec,
            ),
            billing_lookback: defaults.billing_lookback,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
