use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Tab creation failed: {0}")]
    TabCreationFailed(String),

    #[error("No active tab")]
    NoActiveTab,

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element: {0}")]
    StaleElement(String),

    #[error("Action blocked on {target}: {reason}")]
    ActionBlocked { target: String, reason: String },

    #[error("Transition '{step}' not confirmed after {attempts} attempts")]
    TransitionTimeout { step: String, attempts: u32 },

    #[error("Critical alert: {0}")]
    CriticalAlert(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Dialog interaction failed: {0}")]
    DialogFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Captcha error: {0}")]
    Captcha(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

impl From<anyhow::Error> for DriverError {
    fn from(err: anyhow::Error) -> Self {
        DriverError::AnyhowError(err.to_string())
    }
}

impl From<toml::de::Error> for DriverError {
    fn from(err: toml::de::Error) -> Self {
        DriverError::ConfigurationError(err.to_string())
    }
}

impl DriverError {
    /// Failures a call site may absorb with a fallback selector, another
    /// mechanism or a step retry. Everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DriverError::ElementNotFound(_)
                | DriverError::StaleElement(_)
                | DriverError::ActionBlocked { .. }
                | DriverError::TransitionTimeout { .. }
                | DriverError::JavaScriptFailed(_)
        )
    }

    pub fn is_external(&self) -> bool {
        matches!(
            self,
            DriverError::Database(_)
                | DriverError::RecordNotFound(_)
                | DriverError::Filesystem(_)
                | DriverError::Captcha(_)
                | DriverError::Http(_)
        )
    }

    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        DriverError::AnyhowError(err.to_string())
    }
}
