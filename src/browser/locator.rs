use super::DriverSession;
use crate::core::config::TimeoutConfig;
use crate::core::BrowserTrait;
use crate::dom::{ElementState, Selector, TargetDescriptor};
use crate::errors::{DriverError, Result};
use std::time::Duration;
use tracing::{debug, trace};

/// A resolved target: the strategy that matched and what it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub selector: Selector,
    pub strategy_index: usize,
    pub state: ElementState,
}

#[derive(Debug, Clone)]
pub struct ElementLocator {
    min_strategy_timeout: Duration,
    poll_interval: Duration,
}

impl ElementLocator {
    pub fn new(min_strategy_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            min_strategy_timeout,
            poll_interval,
        }
    }

    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self::new(
            Duration::from_millis(timeouts.min_strategy_timeout_ms),
            timeouts.poll_interval(),
        )
    }

    /// Tries each strategy in declared order, giving each an equal share of
    /// `timeout` (never below the configured floor), and returns the first
    /// that satisfies the target's requirement.
    pub async fn locate<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<Located> {
        if target.is_empty() {
            return Err(DriverError::ElementNotFound(format!(
                "{} (no strategies declared)",
                target.label()
            )));
        }

        let share = (timeout / target.len() as u32).max(self.min_strategy_timeout);

        for (index, selector) in target.selectors().enumerate() {
            if let Some(state) = self.poll_strategy(session, target, &selector, share).await? {
                debug!(target = target.label(), strategy = %selector, index, "element located");
                return Ok(Located {
                    selector,
                    strategy_index: index,
                    state,
                });
            }
            trace!(target = target.label(), strategy = %selector, "strategy exhausted");
        }

        Err(DriverError::ElementNotFound(format!(
            "{} ({} strategies tried)",
            target.label(),
            target.len()
        )))
    }

    /// One pass over all strategies without waiting.
    pub async fn find_now<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
    ) -> Result<Option<Located>> {
        for (index, selector) in target.selectors().enumerate() {
            if let Some(state) = self.probe_once(session, target, &selector).await? {
                return Ok(Some(Located {
                    selector,
                    strategy_index: index,
                    state,
                }));
            }
        }
        Ok(None)
    }

    async fn poll_strategy<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        selector: &Selector,
        share: Duration,
    ) -> Result<Option<ElementState>> {
        let start = tokio::time::Instant::now();
        loop {
            if let Some(state) = self.probe_once(session, target, selector).await? {
                return Ok(Some(state));
            }
            if start.elapsed() >= share {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn probe_once<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        selector: &Selector,
    ) -> Result<Option<ElementState>> {
        match session.probe(selector).await {
            Ok(Some(state)) if target.requirement().satisfied_by(&state) => Ok(Some(state)),
            Ok(_) => Ok(None),
            Err(DriverError::NoActiveTab) => Err(DriverError::NoActiveTab),
            Err(e) => {
                trace!(strategy = %selector, error = %e, "probe failed");
                Ok(None)
            }
        }
    }
}
