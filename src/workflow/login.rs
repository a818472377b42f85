use super::{portal, Orchestrator, TerminalOutcome};
use crate::core::BrowserTrait;
use crate::errors::{DriverError, Result};
use crate::store::{OrganizationUnit, SubmissionStore};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the page gets to show its inline credentials error.
const INLINE_ERROR_WINDOW: Duration = Duration::from_secs(8);
const ORGANIZATION_MODAL_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Authenticated,
    Retry(String),
    Fatal(TerminalOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginVerdict {
    Authenticated { attempts: u32 },
    Failed { outcome: TerminalOutcome, attempts: u32 },
}

/// Runs `attempt` until it authenticates or turns fatal, at most
/// `max_attempts` times with `delay` between tries.
pub async fn bounded_login<F, Fut>(max_attempts: u32, delay: Duration, mut attempt: F) -> LoginVerdict
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptResult>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        info!(attempt = n, max = max_attempts, "login attempt");
        match attempt(n).await {
            AttemptResult::Authenticated => return LoginVerdict::Authenticated { attempts: n },
            AttemptResult::Fatal(outcome) => {
                return LoginVerdict::Failed {
                    outcome,
                    attempts: n,
                }
            }
            AttemptResult::Retry(reason) => {
                warn!(attempt = n, %reason, "login attempt failed");
                if n < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    LoginVerdict::Failed {
        outcome: TerminalOutcome::LoginFailed,
        attempts: max_attempts,
    }
}

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    pub(super) async fn login(
        &self,
        user: &str,
        password: &str,
        unit: &OrganizationUnit,
        max_attempts: u32,
    ) -> LoginVerdict {
        let delay = Duration::from_millis(self.config.retry.login_retry_delay_ms);
        bounded_login(max_attempts, delay, |n| self.login_attempt(user, password, unit, n)).await
    }

    async fn login_attempt(
        &self,
        user: &str,
        password: &str,
        unit: &OrganizationUnit,
        attempt: u32,
    ) -> AttemptResult {
        match self.try_login(user, password, unit).await {
            Ok(result) => result,
            Err(DriverError::CriticalAlert(message)) => {
                warn!(%message, "login rejected");
                AttemptResult::Fatal(TerminalOutcome::CredentialsRejected)
            }
            Err(e) => {
                let dir = self.config.paths.artifacts_dir.clone();
                self.session
                    .capture(&dir, &format!("login_attempt_{}.png", attempt))
                    .await;
                AttemptResult::Retry(e.to_string())
            }
        }
    }

    async fn try_login(&self, user: &str, password: &str, unit: &OrganizationUnit) -> Result<AttemptResult> {
        let session = &self.session;
        let executor = &self.primitives.executor;
        let gate = &self.primitives.gate;

        session.navigate(&self.config.portal.home_url).await?;
        if session.current_url().await?.contains("queue-it") {
            info!("waiting room detected, confirming redirect");
            if let Err(e) = executor.click(session, &portal::queue_confirm()).await {
                warn!(error = %e, "waiting room confirmation not clickable");
            }
        }
        gate.wait(session, &[]).await?;

        executor.click(session, &portal::login_button()).await?;
        executor.click(session, &portal::identity_provider_button()).await?;
        gate.wait(session, &[]).await?;

        executor.fill(session, &portal::username_field(), user).await?;
        executor.fill(session, &portal::password_field(), password).await?;
        executor.click(session, &portal::login_submit()).await?;

        let alert = self
            .primitives
            .login_alerts
            .check_with_retry(session, self.config.retry.alert_attempts)
            .await;
        if alert.is_critical() {
            return Ok(AttemptResult::Fatal(TerminalOutcome::CredentialsRejected));
        }

        if self
            .primitives
            .verifier
            .await_indicator(session, &[portal::inline_login_error()], INLINE_ERROR_WINDOW)
            .await?
            .is_some()
        {
            warn!("identity provider reported an error on the page");
            return Ok(AttemptResult::Fatal(TerminalOutcome::CredentialsRejected));
        }

        gate.wait(session, &[]).await?;
        self.select_organization(unit).await?;

        let title = &self.config.portal.authenticated_title;
        let timeout = self.config.retry.wizard_step.indicator_timeout();
        if self.await_title(title, timeout).await? {
            Ok(AttemptResult::Authenticated)
        } else {
            Ok(AttemptResult::Retry("portal home never reached".to_string()))
        }
    }

    /// Picks `unit` in the organization modal when the portal shows it.
    async fn select_organization(&self, unit: &OrganizationUnit) -> Result<()> {
        let session = &self.session;
        let shown = self
            .primitives
            .verifier
            .await_indicator(session, &[portal::organization_modal()], ORGANIZATION_MODAL_WINDOW)
            .await?;
        if shown.is_none() {
            debug!("no organization modal");
            return Ok(());
        }

        info!(unit = %unit.name, position = %unit.position, "selecting organization");
        let executor = &self.primitives.executor;
        executor
            .click(session, &portal::organization_row(&unit.name))
            .await?;
        executor.click(session, &portal::organization_confirm()).await?;
        self.primitives.gate.wait(session, &[]).await?;
        Ok(())
    }

    /// Switches the active purchasing unit to the row matching `keyword`,
    /// or to the first row when none matches.
    pub(super) async fn switch_unit(&self, keyword: &str) -> Result<()> {
        let session = &self.session;
        let executor = &self.primitives.executor;

        executor.click(session, &portal::unit_container()).await?;
        self.primitives
            .locator()
            .locate(session, &portal::unit_table(), executor.timeout())
            .await?;

        if let Err(e) = executor
            .click(session, &portal::unit_select_button(Some(keyword)))
            .await
        {
            warn!(%keyword, error = %e, "no unit matches keyword, taking the first row");
            executor
                .click(session, &portal::unit_select_button(None))
                .await?;
        }
        self.primitives.gate.wait(session, &[]).await?;

        if let Some(current) = self
            .primitives
            .locator()
            .find_now(session, &portal::current_unit())
            .await?
        {
            info!(unit = %current.state.text.trim(), "active unit");
        }
        Ok(())
    }
}
