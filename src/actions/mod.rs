pub mod base;
pub mod executor;

pub use base::{ActionKind, ActionOutcome, ActionReport, Mechanism, MechanismAttempt};
pub use executor::ResilientExecutor;
