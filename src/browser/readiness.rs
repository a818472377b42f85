use super::DriverSession;
use crate::core::config::TimeoutConfig;
use crate::core::BrowserTrait;
use crate::errors::Result;
use crate::utils::JavaScriptRunner;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const DOCUMENT_READY: &str = "document.readyState === 'complete'";
const ASYNC_IDLE: &str = "(typeof jQuery === 'undefined') ? null : jQuery.active === 0";

/// What the gate observed; callers decide whether it is good enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub document_ready: bool,
    /// `None` when the page carries no async runtime to ask.
    pub async_idle: Option<bool>,
    pub missing_symbols: Vec<String>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.document_ready && self.missing_symbols.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    document_timeout: Duration,
    async_timeout: Duration,
    symbol_timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessGate {
    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self {
            document_timeout: Duration::from_millis(timeouts.document_ready_timeout_ms),
            async_timeout: Duration::from_millis(timeouts.async_idle_timeout_ms),
            symbol_timeout: Duration::from_millis(timeouts.symbol_timeout_ms),
            poll_interval: timeouts.poll_interval(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Document ready, then async idle, then the given page functions.
    /// None of the three checks raises on timeout.
    pub async fn wait<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        symbols: &[String],
    ) -> Result<ReadinessReport> {
        let document_ready = JavaScriptRunner::wait_for_condition(
            session,
            DOCUMENT_READY,
            self.document_timeout,
            self.poll_interval,
        )
        .await?;
        if !document_ready {
            warn!(
                timeout_ms = self.document_timeout.as_millis() as u64,
                "document never reached readyState complete"
            );
        }

        let async_idle = self.wait_async_idle(session).await;
        let missing_symbols = self.wait_symbols(session, symbols).await;
        if !missing_symbols.is_empty() {
            warn!(missing = ?missing_symbols, "page functions not available");
        }

        let report = ReadinessReport {
            document_ready,
            async_idle,
            missing_symbols,
        };
        debug!(?report, "readiness checked");
        Ok(report)
    }

    async fn wait_async_idle<B: BrowserTrait>(&self, session: &DriverSession<B>) -> Option<bool> {
        let start = tokio::time::Instant::now();
        loop {
            match session.execute_script(ASYNC_IDLE).await {
                Ok(Value::Null) => return None,
                Ok(Value::Bool(true)) => return Some(true),
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "async runtime probe failed, treating as absent");
                    return None;
                }
            }
            if start.elapsed() >= self.async_timeout {
                debug!("async requests still pending, continuing");
                return Some(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn wait_symbols<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        symbols: &[String],
    ) -> Vec<String> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let script = JavaScriptRunner::missing_symbols_script(symbols);
        let start = tokio::time::Instant::now();
        let mut missing = symbols.to_vec();

        loop {
            if let Ok(Value::Array(names)) = session.execute_script(&script).await {
                missing = names
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if missing.is_empty() {
                    return missing;
                }
            }
            if start.elapsed() >= self.symbol_timeout {
                return missing;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::testing::ScriptedBrowser;
    use serde_json::json;

    fn symbols() -> Vec<String> {
        vec!["fnMovePage".to_string(), "__doPostBack".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_page_reports_ready() {
        let browser = ScriptedBrowser::new().ready_page();
        let config = Config::default();
        let session = DriverSession::new(browser, config.clone()).await.unwrap();

        let report = ReadinessGate::from_config(&config.timeouts)
            .wait(&session, &symbols())
            .await
            .unwrap();
        assert!(report.is_ready());
        assert_eq!(report.async_idle, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_symbol_is_reported_not_raised() {
        let browser = ScriptedBrowser::new()
            .ready_page()
            .script_returns("missingSymbols", json!(["fnMovePage"]))
            .script_returns("jQuery.active", json!(false));
        let config = Config::default();
        let session = DriverSession::new(browser, config.clone()).await.unwrap();

        let report = ReadinessGate::from_config(&config.timeouts)
            .wait(&session, &symbols())
            .await
            .unwrap();
        assert!(report.document_ready);
        assert_eq!(report.async_idle, Some(false));
        assert_eq!(report.missing_symbols, vec!["fnMovePage".to_string()]);
        assert!(!report.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_never_ready() {
        let browser = ScriptedBrowser::new().script_returns("readyState", json!(false));
        let config = Config::default();
        let session = DriverSession::new(browser, config.clone()).await.unwrap();

        let report = ReadinessGate::from_config(&config.timeouts)
            .wait(&session, &[])
            .await
            .unwrap();
        assert!(!report.document_ready);
        assert!(report.missing_symbols.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_runtime_probe_counts_as_absent() {
        let browser = ScriptedBrowser::new()
            .ready_page()
            .script_fails("jQuery.active", "Execution context was destroyed");
        let config = Config::default();
        let session = DriverSession::new(browser, config.clone()).await.unwrap();

        let report = ReadinessGate::from_config(&config.timeouts)
            .wait(&session, &[])
            .await
            .unwrap();
        assert!(report.is_ready());
        assert_eq!(report.async_idle, None);
    }
}
