pub mod actions;
pub mod browser;
pub mod captcha;
pub mod cli;
pub mod core;
pub mod dom;
pub mod errors;
pub mod files;
pub mod logging;
pub mod status;
pub mod store;
pub mod testing;
pub mod utils;
pub mod workflow;

pub use crate::browser::DriverSession;
pub use crate::core::{BrowserTrait, Config};
pub use crate::errors::{DriverError, Result};
pub use crate::workflow::{Orchestrator, TerminalOutcome, WorkflowState};
