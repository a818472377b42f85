use super::DriverSession;
use crate::core::BrowserTrait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const ACCEPT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Benign,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub present: bool,
    pub message: Option<String>,
    pub severity: Severity,
}

impl AlertRecord {
    pub fn none() -> Self {
        Self {
            present: false,
            message: None,
            severity: Severity::Benign,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Case-insensitive substring match against a keyword list.
#[derive(Debug, Clone)]
pub struct AlertClassifier {
    keywords: Vec<String>,
}

impl AlertClassifier {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, message: &str) -> Severity {
        let message = message.to_lowercase();
        if self.keywords.iter().any(|k| message.contains(k.as_str())) {
            Severity::Critical
        } else {
            Severity::Benign
        }
    }
}

/// Watches for native dialogs, dismisses them and reports what they said.
/// It never decides what the workflow does next.
#[derive(Debug, Clone)]
pub struct AlertHandler {
    classifier: AlertClassifier,
    poll_window: Duration,
    poll_interval: Duration,
}

impl AlertHandler {
    pub fn new(classifier: AlertClassifier, poll_window: Duration, poll_interval: Duration) -> Self {
        Self {
            classifier,
            poll_window,
            poll_interval,
        }
    }

    pub async fn check<B: BrowserTrait>(&self, session: &DriverSession<B>) -> AlertRecord {
        self.check_within(session, self.poll_window).await
    }

    /// Polls up to `attempts` times, widening the window on each pass.
    pub async fn check_with_retry<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        attempts: u32,
    ) -> AlertRecord {
        for attempt in 1..=attempts.max(1) {
            debug!(attempt, attempts, "checking for dialogs");
            let record = self.check_within(session, self.poll_window * attempt).await;
            if record.present {
                return record;
            }
        }
        AlertRecord::none()
    }

    async fn check_within<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        window: Duration,
    ) -> AlertRecord {
        let start = tokio::time::Instant::now();
        loop {
            match session.pending_dialog().await {
                Ok(Some(message)) => return self.dismiss(session, message).await,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "dialog inspection failed, treating as critical");
                    return AlertRecord {
                        present: true,
                        message: Some(e.to_string()),
                        severity: Severity::Critical,
                    };
                }
            }
            if start.elapsed() >= window {
                return AlertRecord::none();
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn dismiss<B: BrowserTrait>(&self, session: &DriverSession<B>, message: String) -> AlertRecord {
        let mut severity = self.classifier.classify(&message);
        if severity == Severity::Critical {
            error!(%message, "critical dialog");
        } else {
            warn!(%message, "dialog");
        }

        let mut accepted = false;
        for retry in 1..=ACCEPT_RETRIES {
            match session.handle_dialog(true).await {
                Ok(()) => {
                    accepted = true;
                    break;
                }
                Err(e) => {
                    warn!(retry, error = %e, "accepting dialog failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        if !accepted {
            severity = Severity::Critical;
        }

        AlertRecord {
            present: true,
            message: Some(message),
            severity,
        }
    }
}
