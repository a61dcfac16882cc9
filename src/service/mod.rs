pub mod billing;
pub mod boot;
pub mod closure;
pub mod domestic;
pub mod transfer;

pub use boot::Bank;
