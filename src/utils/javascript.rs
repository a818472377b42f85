use crate::browser::DriverSession;
use crate::core::BrowserTrait;
use crate::errors::{DriverError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    /// Polls `condition` until it evaluates to `true`. Evaluation errors
    /// count as `false`: the page may be mid-navigation.
    pub async fn wait_for_condition<B: BrowserTrait>(
        session: &DriverSession<B>,
        condition: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        let start_time = tokio::time::Instant::now();

        loop {
            match session.execute_script(condition).await {
                Ok(Value::Bool(true)) => return Ok(true),
                Ok(_) => {}
                Err(DriverError::NoActiveTab) => return Err(DriverError::NoActiveTab),
                Err(e) => trace!(error = %e, "condition evaluation failed"),
            }

            if start_time.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Script returning the names in `symbols` that are not functions on `window`.
    pub fn missing_symbols_script(symbols: &[String]) -> String {
        let list = symbols
            .iter()
            .map(|s| format!("'{}'", crate::dom::selector::js_quote(s)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "(function() {{ const missingSymbols = [{}].filter(name => typeof window[name] !== 'function'); return missingSymbols; }})()",
            list
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_symbols_script_lists_names() {
        let script = JavaScriptRunner::missing_symbols_script(&[
            "fnMovePage".to_string(),
            "__doPostBack".to_string(),
        ]);
        assert!(script.contains("['fnMovePage', '__doPostBack']"));
        assert!(script.contains("missingSymbols"));
    }
}
