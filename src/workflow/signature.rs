use super::{portal, Orchestrator, RunContext, RutKind};
use crate::actions::{ActionKind, Mechanism};
use crate::browser::Trigger;
use crate::captcha::{injection_script, CaptchaChallenge};
use crate::core::BrowserTrait;
use crate::errors::{DriverError, Result};
use crate::store::{PendingPermission, SubmissionStore};
use serde_json::Value;
use tracing::{debug, info, warn};

const TOGGLE_ROUNDS: u32 = 5;

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    /// Signs the sworn declaration. `Ok(false)` means the run stops here
    /// until the client grants the signing permission.
    pub(super) async fn sign_declaration(&mut self, ctx: &RunContext) -> Result<bool> {
        let timeout = self.primitives.executor.timeout();
        self.primitives
            .executor
            .click(&self.session, &portal::attachments_tab())
            .await?;
        self.primitives.gate.wait(&self.session, &[]).await?;
        self.primitives
            .locator()
            .locate(&self.session, &portal::attachments_frame(), timeout)
            .await?;

        let declaration = self.declaration_state().await?;
        if !declaration.contains(portal::DECLARATION_PENDING) {
            info!(state = %declaration, "declaration already signed");
            return Ok(true);
        }
        if ctx.job.pending_permission {
            info!(tender = %ctx.job.tender, "declaration awaits client permission, deferring");
            self.store
                .record_pending_permission(&PendingPermission {
                    tender: ctx.job.tender.clone(),
                    rut_user: ctx.job.rut_user.clone(),
                    rut_client: ctx.job.rut_client.clone(),
                })
                .await?;
            return Ok(false);
        }

        let known = self.session.tab_count().await?;
        self.primitives
            .executor
            .click(&self.session, &portal::declare_and_sign())
            .await?;
        let offer_tab = self.session.switch_to_new_tab(known, timeout).await?;
        self.primitives.gate.wait(&self.session, &[]).await?;

        self.choose_signer(ctx).await?;
        self.tick_declaration_toggles().await?;

        if ctx.job.sign_with_idp {
            self.sign_with_identity_provider(ctx, offer_tab).await?;
        } else {
            self.sign_without_identity_provider(offer_tab).await?;
        }
        self.confirm_declaration_signed().await
    }

    async fn declaration_state(&self) -> Result<String> {
        let found = self
            .primitives
            .locator()
            .locate(
                &self.session,
                &portal::declaration_state(),
                self.primitives.executor.timeout(),
            )
            .await?;
        Ok(found.state.text.trim().to_uppercase())
    }

    async fn choose_signer(&self, ctx: &RunContext) -> Result<()> {
        let session = &self.session;
        let executor = &self.primitives.executor;
        let rut = &ctx.job.representative_rut;

        match ctx.job.rut_kind {
            RutKind::Representative => {
                if self
                    .primitives
                    .locator()
                    .find_now(session, &portal::representative_selected(rut))
                    .await?
                    .is_some()
                {
                    debug!(%rut, "representative already selected");
                    return Ok(());
                }
                executor
                    .click(session, &portal::representative_dropdown())
                    .await?;
                executor
                    .click_any(session, &portal::representative_options(rut), executor.timeout())
                    .await?;
            }
            RutKind::Other => {
                executor
                    .click(session, &portal::representative_dropdown())
                    .await?;
                executor.click(session, &portal::other_rut_option()).await?;
                executor
                    .fill(session, &portal::other_rut_input(), rut)
                    .await?;
                session.press_key("Enter").await?;
            }
        }
        info!(%rut, kind = ?ctx.job.rut_kind, "signer chosen");
        Ok(())
    }

    /// Ticks every enabled toggle, rechecking until all of them read checked.
    async fn tick_declaration_toggles(&self) -> Result<()> {
        for round in 1..=TOGGLE_ROUNDS {
            let counts = self
                .session
                .execute_script(portal::DECLARATION_TOGGLES_SCRIPT)
                .await?;
            let enabled = counts.get("enabled").and_then(Value::as_u64).unwrap_or(0);
            let checked = counts.get("checked").and_then(Value::as_u64).unwrap_or(0);
            debug!(round, enabled, checked, "declaration toggles");
            if enabled > 0 && checked == enabled {
                info!(toggles = enabled, "declaration toggles ticked");
                return Ok(());
            }
            tokio::time::sleep(self.config.timeouts.settle_delay()).await;
        }
        Err(DriverError::ActionBlocked {
            target: "declaration toggles".to_string(),
            reason: format!("not all ticked after {} rounds", TOGGLE_ROUNDS),
        })
    }

    async fn sign_without_identity_provider(&mut self, offer_tab: B::TabHandle) -> Result<()> {
        let executor = &self.primitives.executor;
        executor
            .perform_with(
                &self.session,
                &portal::sign_without_idp(),
                &ActionKind::Click,
                &Mechanism::SCRIPT_FIRST,
                executor.timeout(),
            )
            .await
            .into_result()?;
        self.primitives
            .verifier
            .verify(
                &self.session,
                "sign without identity provider",
                &Trigger::click(portal::confirm_sign_without_idp()),
                &[portal::close_and_return()],
                &self.config.retry.wizard_step,
            )
            .await?;
        executor
            .click(&self.session, &portal::close_and_return())
            .await?;
        self.back_to(offer_tab).await;
        Ok(())
    }

    async fn sign_with_identity_provider(
        &mut self,
        ctx: &RunContext,
        offer_tab: B::TabHandle,
    ) -> Result<()> {
        let timeout = self.primitives.executor.timeout();
        let known = self.session.tab_count().await?;
        for key in ["Tab", "Enter", "Tab", "Enter"] {
            self.session.press_key(key).await?;
        }
        let declaration_tab = self.session.switch_to_new_tab(known, timeout).await?;
        self.primitives.gate.wait(&self.session, &[]).await?;

        let site_key = self
            .session
            .execute_script(portal::SITE_KEY_SCRIPT)
            .await?
            .as_str()
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DriverError::Captcha("identity provider page has no site key".to_string()))?;
        let solver = self
            .captcha
            .clone()
            .ok_or_else(|| DriverError::ConfigurationError("no captcha solver configured".to_string()))?;
        let page_url = self.session.current_url().await?;
        let token = solver.solve(&CaptchaChallenge { site_key, page_url }).await?;
        self.session.execute_script(&injection_script(&token)).await?;

        let executor = &self.primitives.executor;
        executor
            .fill(&self.session, &portal::username_field(), &ctx.job.idp_user)
            .await?;
        executor
            .fill(&self.session, &portal::password_field(), &ctx.job.idp_password)
            .await?;
        self.session.execute_script(portal::IDP_SUBMIT_SCRIPT).await?;
        tokio::time::sleep(self.config.timeouts.settle_delay()).await;

        let alert = self.primitives.alerts.check(&self.session).await;
        if alert.is_critical() {
            return Err(DriverError::CriticalAlert(alert.message.unwrap_or_default()));
        }

        self.back_to(declaration_tab).await;
        self.back_to(offer_tab).await;
        Ok(())
    }

    /// Closes the current window and drives `tab` again.
    async fn back_to(&mut self, tab: B::TabHandle) {
        if let Err(e) = self.session.close_current_and_use(tab).await {
            debug!(error = %e, "window already closed");
        }
    }

    /// The attachments page must stop reporting the declaration as pending.
    async fn confirm_declaration_signed(&self) -> Result<bool> {
        let timeout = self.config.retry.wizard_step.indicator_timeout();
        let start = tokio::time::Instant::now();
        loop {
            if let Some(found) = self
                .primitives
                .locator()
                .find_now(&self.session, &portal::declaration_state())
                .await?
            {
                let state = found.state.text.trim().to_uppercase();
                if !state.contains(portal::DECLARATION_PENDING) {
                    info!(%state, "declaration signed");
                    return Ok(true);
                }
            }
            if start.elapsed() >= timeout {
                warn!("declaration still pending after signing");
                return Err(DriverError::TransitionTimeout {
                    step: "declaration signature".to_string(),
                    attempts: 1,
                });
            }
            tokio::time::sleep(self.primitives.gate.poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::CaptchaSolver;
    use crate::dom::{Selector, TargetDescriptor};
    use crate::store::MemoryStore;
    use crate::testing::{Effect, ScriptedBrowser};
    use crate::workflow::tests::{config_in, job, orchestrator};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct FixedSolver {
        seen: Mutex<Vec<CaptchaChallenge>>,
    }

    #[async_trait]
    impl CaptchaSolver for FixedSolver {
        async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push(challenge.clone());
            Ok("tok-123".to_string())
        }
    }

    fn first(target: &TargetDescriptor) -> Selector {
        target.selectors().next().unwrap()
    }

    fn state_selector() -> Selector {
        Selector::id("dj_estado").in_frame(portal::ATTACHMENT_FRAME)
    }

    fn attachments_page(state: &str) -> ScriptedBrowser {
        ScriptedBrowser::new()
            .ready_page()
            .element(Selector::id("ctl00_trvWizardt3"))
            .element(Selector::id(portal::ATTACHMENT_FRAME))
            .element_text(state_selector(), state)
    }

    /// Attachments page whose declaration link opens the signing window.
    fn signing_page() -> ScriptedBrowser {
        let declare = first(&portal::declare_and_sign());
        attachments_page("PENDIENTE")
            .element(declare.clone())
            .on_interact(declare, Effect::OpenTab)
            .script_returns("fKMtys", json!({"total": 3, "enabled": 3, "checked": 3}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_permission_defers_and_records() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let browser = attachments_page("PENDIENTE");
        let probe = browser.clone();
        let mut run = orchestrator(browser, store.clone(), config_in(root.path())).await;

        let mut params = job("1057-22-LE24");
        params.pending_permission = true;
        let ctx = RunContext::new(params, Default::default(), root.path().into());

        assert!(!run.sign_declaration(&ctx).await.unwrap());
        assert_eq!(
            store.pending_permissions(),
            vec![PendingPermission {
                tender: "1057-22-LE24".into(),
                rut_user: "76111111-1".into(),
                rut_client: "76222222-2".into(),
            }]
        );
        assert!(probe
            .interactions_with(&first(&portal::declare_and_sign()))
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_declaration_is_left_alone() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let mut run = orchestrator(attachments_page("Firmada"), store.clone(), config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        assert!(run.sign_declaration(&ctx).await.unwrap());
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_without_identity_provider() {
        let root = tempfile::tempdir().unwrap();
        let option = first(&portal::representative_options("11111111-1")[0]);
        let confirm = first(&portal::confirm_sign_without_idp());
        let close = first(&portal::close_and_return());
        let browser = signing_page()
            .element(first(&portal::representative_dropdown()))
            .element(option.clone())
            .element(first(&portal::sign_without_idp()))
            .element(confirm.clone())
            .on_interact(confirm.clone(), Effect::Show(close.clone()))
            .on_interact(close.clone(), Effect::Text(state_selector(), "FIRMADA".into()));
        let probe = browser.clone();
        let mut run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        assert!(run.sign_declaration(&ctx).await.unwrap());

        assert_eq!(probe.interactions_with(&option).len(), 1);
        assert_eq!(probe.interactions_with(&confirm).len(), 1);
        assert_eq!(
            probe.interactions_with(&first(&portal::sign_without_idp()))[0].mechanism,
            Mechanism::Script
        );
        assert_eq!(*run.session().tab().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_with_identity_provider_and_other_rut() {
        let root = tempfile::tempdir().unwrap();
        let rut_input = first(&portal::other_rut_input());
        let solver = Arc::new(FixedSolver {
            seen: Mutex::new(Vec::new()),
        });
        let browser = signing_page()
            .element(first(&portal::representative_dropdown()))
            .element(first(&portal::other_rut_option()))
            .element(rut_input.clone())
            .element(Selector::id("uname"))
            .element(Selector::id("pword"))
            .script_returns("data-sitekey", json!("6Lc-site"))
            .on_key("Enter", Effect::OpenTab)
            .on_script("onSubmit()", Effect::Text(state_selector(), "FIRMADA".into()));
        let probe = browser.clone();
        let mut run = orchestrator(browser, MemoryStore::new(), config_in(root.path()))
            .await
            .with_captcha(solver.clone());

        let mut params = job("1057-22-LE24");
        params.sign_with_idp = true;
        params.rut_kind = RutKind::Other;
        params.representative_rut = "22222222-2".into();
        let ctx = RunContext::new(params, Default::default(), root.path().into());

        assert!(run.sign_declaration(&ctx).await.unwrap());
        assert_eq!(probe.value_of(&rut_input).as_deref(), Some("22222222-2"));
        assert_eq!(probe.value_of(&Selector::id("uname")).as_deref(), Some("11111111-1"));
        assert_eq!(probe.scripts_matching("g-recaptcha-response\").innerHTML=\"tok-123\""), 1);
        assert_eq!(solver.seen.lock().unwrap()[0].site_key, "6Lc-site");
        assert_eq!(*run.session().tab().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_provider_without_solver_is_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let browser = signing_page()
            .element(first(&portal::representative_selected("11111111-1")))
            .script_returns("data-sitekey", json!("6Lc-site"))
            .on_key("Enter", Effect::OpenTab);
        let mut run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let mut params = job("1057-22-LE24");
        params.sign_with_idp = true;
        let ctx = RunContext::new(params, Default::default(), root.path().into());

        let err = run.sign_declaration(&ctx).await.unwrap_err();
        assert!(matches!(err, DriverError::ConfigurationError(_)));
    }
}
