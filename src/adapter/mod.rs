mod breaker;
mod bus;
mod gateway;
mod journal;
mod proxies;
mod read_model;
pub mod runtime;
mod throttle;

pub use breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use bus::{AccountBus, AccountObservation};
pub use gateway::{GatewayBehavior, MockDomesticGateway};
pub use journal::{InMemoryJournal, InMemorySnapshots};
pub use proxies::{InMemoryStatementStore, RecordingEmailProxy, RecordingScheduler};
pub use read_model::{AccountRow, InMemoryAccountReadModel, spawn_projector};
pub use throttle::{ThrottleConfig, TokenBucket};
