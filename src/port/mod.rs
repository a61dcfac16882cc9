mod email;
mod gateway;
mod journal;
mod read_model;
mod scheduler;
mod snapshot;

pub use email::*;
pub use gateway::*;
pub use journal::*;
pub use read_model::*;
pub use scheduler::*;
pub use snapshot::*;
