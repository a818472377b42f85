use crate::errors::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with a located element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Click,
    /// Replace the current value with the given text.
    Type(String),
    Clear,
    /// Pick the `<select>` option whose value or visible text matches.
    Select(String),
}

/// How an action reaches the page, from most to least faithful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    /// Real input events delivered through the browser.
    Native,
    /// The DOM API invoked from injected script.
    Script,
    /// Mouse moved to the element's midpoint and pressed there.
    Pointer,
}

impl Mechanism {
    pub const ESCALATION: [Mechanism; 3] = [Mechanism::Native, Mechanism::Script, Mechanism::Pointer];
    pub const SCRIPT_FIRST: [Mechanism; 3] = [Mechanism::Script, Mechanism::Native, Mechanism::Pointer];
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Click => write!(f, "click"),
            ActionKind::Type(_) => write!(f, "type"),
            ActionKind::Clear => write!(f, "clear"),
            ActionKind::Select(option) => write!(f, "select '{}'", option),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mechanism::Native => "native",
            Mechanism::Script => "script",
            Mechanism::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Success { mechanism: Mechanism },
    NotFound,
    Blocked(String),
}

/// One mechanism tried during an executor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismAttempt {
    pub mechanism: Mechanism,
    pub error: Option<String>,
}

/// Result of an executor call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub target: String,
    pub outcome: ActionOutcome,
    pub attempts: Vec<MechanismAttempt>,
    pub relocations: u32,
    pub execution_time_ms: u64,
}

impl ActionReport {
    pub fn new(target: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            target: target.into(),
            outcome,
            attempts: Vec::new(),
            relocations: 0,
            execution_time_ms: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<MechanismAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_relocations(mut self, relocations: u32) -> Self {
        self.relocations = relocations;
        self
    }

    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = time_ms;
        self
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Success { .. })
    }

    /// Converts a failed outcome into the matching recoverable error.
    pub fn into_result(self) -> Result<Mechanism> {
        match self.outcome {
            ActionOutcome::Success { mechanism } => Ok(mechanism),
            ActionOutcome::NotFound => Err(DriverError::ElementNotFound(self.target)),
            ActionOutcome::Blocked(reason) => Err(DriverError::ActionBlocked {
                target: self.target,
                reason,
            }),
        }
    }
}
