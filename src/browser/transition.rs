use super::{DriverSession, ElementLocator, ReadinessGate};
use crate::actions::{ActionKind, ResilientExecutor};
use crate::core::config::TransitionPolicy;
use crate::core::BrowserTrait;
use crate::dom::TargetDescriptor;
use crate::errors::{DriverError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whatever is expected to move the page to its next state.
#[derive(Debug, Clone)]
pub enum Trigger {
    Action {
        target: TargetDescriptor,
        action: ActionKind,
    },
    Script(String),
}

impl Trigger {
    pub fn click(target: TargetDescriptor) -> Self {
        Trigger::Action {
            target,
            action: ActionKind::Click,
        }
    }

    pub fn script(script: impl Into<String>) -> Self {
        Trigger::Script(script.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub attempts: u32,
    pub indicator: String,
    pub used_fallback: bool,
}

/// Confirms navigations by what appears on the destination page.
#[derive(Debug, Clone)]
pub struct TransitionVerifier {
    executor: ResilientExecutor,
    gate: ReadinessGate,
    settle_delay: Duration,
    symbols: Vec<String>,
}

impl TransitionVerifier {
    pub fn new(executor: ResilientExecutor, gate: ReadinessGate, settle_delay: Duration) -> Self {
        Self {
            executor,
            gate,
            settle_delay,
            symbols: Vec::new(),
        }
    }

    /// Page functions the readiness gate should wait for after each trigger.
    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    fn locator(&self) -> &ElementLocator {
        self.executor.locator()
    }

    /// Fires `trigger` up to `policy.max_attempts` times until one of the
    /// indicators shows up. Silence is a failed attempt, never a success.
    pub async fn verify<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        step: &str,
        trigger: &Trigger,
        indicators: &[TargetDescriptor],
        policy: &TransitionPolicy,
    ) -> Result<TransitionReport> {
        for attempt in 1..=policy.max_attempts {
            info!(step, attempt, max = policy.max_attempts, "triggering transition");
            match self
                .attempt(session, trigger, indicators, policy.indicator_timeout())
                .await
            {
                Ok(Some(indicator)) => {
                    info!(step, attempt, %indicator, "transition confirmed");
                    return Ok(TransitionReport {
                        attempts: attempt,
                        indicator,
                        used_fallback: false,
                    });
                }
                Ok(None) => warn!(step, attempt, "no destination indicator observed"),
                Err(e) if e.is_recoverable() => warn!(step, attempt, error = %e, "trigger failed"),
                Err(e) => return Err(e),
            }

            if attempt < policy.max_attempts {
                let delay = policy.delay_before(attempt);
                debug!(step, delay_ms = delay.as_millis() as u64, "waiting before next attempt");
                tokio::time::sleep(delay).await;
            }
        }

        Err(DriverError::TransitionTimeout {
            step: step.to_string(),
            attempts: policy.max_attempts,
        })
    }

    /// As [`verify`](Self::verify), then one try of `fallback` under the
    /// same indicator check when the regular trigger is exhausted.
    pub async fn verify_with_fallback<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        step: &str,
        trigger: &Trigger,
        fallback: &Trigger,
        indicators: &[TargetDescriptor],
        policy: &TransitionPolicy,
    ) -> Result<TransitionReport> {
        match self.verify(session, step, trigger, indicators, policy).await {
            Err(DriverError::TransitionTimeout { attempts, .. }) => {
                warn!(step, "regular trigger exhausted, trying fallback");
                match self
                    .attempt(session, fallback, indicators, policy.indicator_timeout())
                    .await?
                {
                    Some(indicator) => Ok(TransitionReport {
                        attempts: attempts + 1,
                        indicator,
                        used_fallback: true,
                    }),
                    None => Err(DriverError::TransitionTimeout {
                        step: step.to_string(),
                        attempts: attempts + 1,
                    }),
                }
            }
            other => other,
        }
    }

    async fn attempt<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        trigger: &Trigger,
        indicators: &[TargetDescriptor],
        indicator_timeout: Duration,
    ) -> Result<Option<String>> {
        self.fire(session, trigger).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.gate.wait(session, &self.symbols).await?;
        self.await_indicator(session, indicators, indicator_timeout).await
    }

    async fn fire<B: BrowserTrait>(&self, session: &DriverSession<B>, trigger: &Trigger) -> Result<()> {
        match trigger {
            Trigger::Action { target, action } => self
                .executor
                .perform(session, target, action)
                .await
                .into_result()
                .map(|_| ()),
            Trigger::Script(script) => session.execute_script(script).await.map(|_| ()),
        }
    }

    /// Label of the first indicator seen within `timeout`.
    pub async fn await_indicator<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        indicators: &[TargetDescriptor],
        timeout: Duration,
    ) -> Result<Option<String>> {
        let start = tokio::time::Instant::now();
        loop {
            for indicator in indicators {
                if self.locator().find_now(session, indicator).await?.is_some() {
                    return Ok(Some(indicator.label().to_string()));
                }
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(self.gate.poll_interval()).await;
        }
    }
}
