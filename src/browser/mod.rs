pub mod alerts;
pub mod chrome;
pub mod locator;
pub mod readiness;
pub mod session;
pub mod transition;

pub use alerts::{AlertClassifier, AlertHandler, AlertRecord, Severity};
pub use chrome::ChromeBrowser;
pub use locator::{ElementLocator, Located};
pub use readiness::{ReadinessGate, ReadinessReport};
pub use session::DriverSession;
pub use transition::{TransitionReport, TransitionVerifier, Trigger};
