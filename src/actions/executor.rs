use super::base::{ActionKind, ActionOutcome, ActionReport, Mechanism, MechanismAttempt};
use crate::browser::{DriverSession, ElementLocator};
use crate::core::BrowserTrait;
use crate::dom::{Selector, TargetDescriptor};
use crate::errors::{DriverError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs one action against one target, escalating through interaction
/// mechanisms until one goes through.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    locator: ElementLocator,
    timeout: Duration,
    mechanisms: Vec<Mechanism>,
}

impl ResilientExecutor {
    pub fn new(locator: ElementLocator, timeout: Duration) -> Self {
        Self {
            locator,
            timeout,
            mechanisms: Mechanism::ESCALATION.to_vec(),
        }
    }

    pub fn with_mechanisms(mut self, mechanisms: &[Mechanism]) -> Self {
        self.mechanisms = mechanisms.to_vec();
        self
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn perform<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        action: &ActionKind,
    ) -> ActionReport {
        self.perform_with(session, target, action, &self.mechanisms, self.timeout)
            .await
    }

    /// Locates `target`, then tries `mechanisms` in order. A mechanism is
    /// left behind only when it errors. A stale or vanished match is
    /// re-located once and the same mechanism retried.
    pub async fn perform_with<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        action: &ActionKind,
        mechanisms: &[Mechanism],
        timeout: Duration,
    ) -> ActionReport {
        let start = tokio::time::Instant::now();
        let elapsed_ms = |start: tokio::time::Instant| start.elapsed().as_millis() as u64;

        let mut selector = match self.locator.locate(session, target, timeout).await {
            Ok(located) => located.selector,
            Err(e) => {
                debug!(target = target.label(), error = %e, "nothing to act on");
                return ActionReport::new(target.label(), ActionOutcome::NotFound)
                    .with_execution_time(elapsed_ms(start));
            }
        };

        if matches!(action, ActionKind::Click) {
            self.scroll_into_view(session, &selector).await;
        }

        let mut attempts = Vec::new();
        let mut relocations = 0;
        let mut last_error = String::from("no interaction mechanism configured");

        for &mechanism in mechanisms {
            loop {
                match session.interact(&selector, action, mechanism).await {
                    Ok(()) => {
                        attempts.push(MechanismAttempt {
                            mechanism,
                            error: None,
                        });
                        info!(target = target.label(), %action, %mechanism, "action succeeded");
                        return ActionReport::new(target.label(), ActionOutcome::Success { mechanism })
                            .with_attempts(attempts)
                            .with_relocations(relocations)
                            .with_execution_time(elapsed_ms(start));
                    }
                    Err(e @ (DriverError::StaleElement(_) | DriverError::ElementNotFound(_)))
                        if relocations == 0 =>
                    {
                        relocations += 1;
                        attempts.push(MechanismAttempt {
                            mechanism,
                            error: Some(e.to_string()),
                        });
                        debug!(target = target.label(), error = %e, "match went stale, locating again");
                        match self.locator.locate(session, target, timeout).await {
                            Ok(located) => selector = located.selector,
                            Err(_) => {
                                return ActionReport::new(target.label(), ActionOutcome::NotFound)
                                    .with_attempts(attempts)
                                    .with_relocations(relocations)
                                    .with_execution_time(elapsed_ms(start));
                            }
                        }
                    }
                    Err(e) => {
                        debug!(target = target.label(), %mechanism, error = %e, "mechanism failed, escalating");
                        last_error = e.to_string();
                        attempts.push(MechanismAttempt {
                            mechanism,
                            error: Some(last_error.clone()),
                        });
                        break;
                    }
                }
            }
        }

        warn!(target = target.label(), %action, error = %last_error, "every mechanism failed");
        ActionReport::new(target.label(), ActionOutcome::Blocked(last_error))
            .with_attempts(attempts)
            .with_relocations(relocations)
            .with_execution_time(elapsed_ms(start))
    }

    pub async fn click<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
    ) -> Result<Mechanism> {
        self.perform(session, target, &ActionKind::Click)
            .await
            .into_result()
    }

    /// Replaces the field's value with `text`. Typing overwrites whatever
    /// the field held, so a failed fill leaves the old value in place.
    pub async fn fill<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        text: &str,
    ) -> Result<Mechanism> {
        self.perform(session, target, &ActionKind::Type(text.to_string()))
            .await
            .into_result()
    }

    pub async fn select<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        target: &TargetDescriptor,
        option: &str,
    ) -> Result<Mechanism> {
        self.perform(session, target, &ActionKind::Select(option.to_string()))
            .await
            .into_result()
    }

    /// Clicks the first target in `candidates` that can be clicked.
    pub async fn click_any<B: BrowserTrait>(
        &self,
        session: &DriverSession<B>,
        candidates: &[TargetDescriptor],
        timeout: Duration,
    ) -> Result<Mechanism> {
        let mut last = DriverError::ElementNotFound("no candidates".to_string());
        for target in candidates {
            let report = self
                .perform_with(session, target, &ActionKind::Click, &self.mechanisms, timeout)
                .await;
            match report.into_result() {
                Ok(mechanism) => return Ok(mechanism),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    async fn scroll_into_view<B: BrowserTrait>(&self, session: &DriverSession<B>, selector: &Selector) {
        let script = format!(
            "(function() {{ const el = {}; if (el) el.scrollIntoView({{ block: 'center' }}); return !!el; }})()",
            selector.resolve_js()
        );
        if let Err(e) = session.execute_script(&script).await {
            debug!(strategy = %selector, error = %e, "scroll into view failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::testing::{Interaction, ScriptedBrowser};

    fn executor() -> ResilientExecutor {
        ResilientExecutor::new(
            ElementLocator::new(Duration::from_millis(200), Duration::from_millis(50)),
            Duration::from_secs(1),
        )
    }

    fn mechanisms_tried(log: &[Interaction]) -> Vec<Mechanism> {
        log.iter().map(|i| i.mechanism).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_success_stops_escalation() {
        let browser = ScriptedBrowser::new().element(Selector::id("login-submit"));
        let probe = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let report = executor()
            .perform(&session, &TargetDescriptor::by_id("login-submit"), &ActionKind::Click)
            .await;
        assert_eq!(
            report.outcome,
            ActionOutcome::Success {
                mechanism: Mechanism::Native
            }
        );
        assert_eq!(mechanisms_tried(&probe.interactions()), vec![Mechanism::Native]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_in_declared_order() {
        let button = Selector::id("ctl00_btnNext");
        let browser = ScriptedBrowser::new()
            .element(button.clone())
            .fail(button.clone(), Mechanism::Native, "element click intercepted");
        let probe = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let report = executor()
            .perform(&session, &TargetDescriptor::by_id("ctl00_btnNext"), &ActionKind::Click)
            .await;
        assert_eq!(
            report.outcome,
            ActionOutcome::Success {
                mechanism: Mechanism::Script
            }
        );
        assert_eq!(
            mechanisms_tried(&probe.interactions()),
            vec![Mechanism::Native, Mechanism::Script]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_mechanisms_fail_keeps_last_error() {
        let button = Selector::id("btnSearchByCode");
        let browser = ScriptedBrowser::new()
            .element(button.clone())
            .fail(button.clone(), Mechanism::Native, "intercepted")
            .fail(button.clone(), Mechanism::Script, "detached")
            .fail(button.clone(), Mechanism::Pointer, "no layout box");
        let probe = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let report = executor()
            .perform(&session, &TargetDescriptor::by_id("btnSearchByCode"), &ActionKind::Click)
            .await;
        match &report.outcome {
            ActionOutcome::Blocked(reason) => assert!(reason.contains("no layout box")),
            other => panic!("expected blocked, got {:?}", other),
        }
        assert_eq!(
            mechanisms_tried(&probe.interactions()),
            vec![Mechanism::Native, Mechanism::Script, Mechanism::Pointer]
        );
        assert!(probe.value_of(&button).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_order_is_respected() {
        let button = Selector::xpath("//button[contains(., 'Firmar sin Clave Única')]");
        let browser = ScriptedBrowser::new().element(button.clone());
        let probe = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let report = executor()
            .with_mechanisms(&Mechanism::SCRIPT_FIRST)
            .perform(
                &session,
                &TargetDescriptor::new("sign").xpath("//button[contains(., 'Firmar sin Clave Única')]"),
                &ActionKind::Click,
            )
            .await;
        assert!(report.succeeded());
        assert_eq!(mechanisms_tried(&probe.interactions()), vec![Mechanism::Script]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_match_relocates_and_retries_same_mechanism() {
        let field = Selector::id("uname");
        let browser = ScriptedBrowser::new()
            .element(field.clone())
            .stale_once(field.clone());
        let probe = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let report = executor()
            .perform(
                &session,
                &TargetDescriptor::by_id("uname"),
                &ActionKind::Type("usuario".into()),
            )
            .await;
        assert_eq!(report.relocations, 1);
        assert_eq!(
            mechanisms_tried(&probe.interactions()),
            vec![Mechanism::Native, Mechanism::Native]
        );
        assert_eq!(probe.value_of(&field).as_deref(), Some("usuario"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_replaces_existing_value() {
        let price = Selector::id("rptBids_ctl00__TxtUnitNetPriceN");
        let browser = ScriptedBrowser::new()
            .element(price.clone())
            .value(price.clone(), "1000")
            .fail(price.clone(), Mechanism::Native, "not interactable");
        let view = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let mechanism = executor()
            .fill(&session, &TargetDescriptor::by_id("rptBids_ctl00__TxtUnitNetPriceN"), "1500")
            .await
            .unwrap();
        assert_eq!(mechanism, Mechanism::Script);
        assert_eq!(view.value_of(&price).as_deref(), Some("1500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fill_keeps_previous_value() {
        let price = Selector::id("rptBids_ctl00__TxtUnitNetPriceN");
        let browser = ScriptedBrowser::new()
            .element(price.clone())
            .value(price.clone(), "1000")
            .fail(price.clone(), Mechanism::Native, "intercepted")
            .fail(price.clone(), Mechanism::Script, "detached")
            .fail(price.clone(), Mechanism::Pointer, "no layout box");
        let view = browser.clone();
        let session = DriverSession::new(browser, Config::default()).await.unwrap();

        let result = executor()
            .fill(&session, &TargetDescriptor::by_id("rptBids_ctl00__TxtUnitNetPriceN"), "1500")
            .await;
        assert!(matches!(result, Err(DriverError::ActionBlocked { .. })));
        assert_eq!(view.value_of(&price).as_deref(), Some("1000"));
        assert!(view
            .interactions()
            .iter()
            .all(|i| matches!(i.action, ActionKind::Type(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_is_not_found() {
        let session = DriverSession::new(ScriptedBrowser::new(), Config::default())
            .await
            .unwrap();
        let report = executor()
            .perform(&session, &TargetDescriptor::by_id("zocial-oidc"), &ActionKind::Click)
            .await;
        assert_eq!(report.outcome, ActionOutcome::NotFound);
        assert!(report.attempts.is_empty());
    }
}
