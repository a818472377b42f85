use super::{portal, Orchestrator, RunContext};
use crate::core::BrowserTrait;
use crate::errors::Result;
use crate::store::SubmissionStore;
use tracing::{debug, info};

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    /// Offer name, description and joint-offer choice, then on to items.
    pub(super) async fn describe_offer(&self, ctx: &RunContext) -> Result<()> {
        let session = &self.session;
        let executor = &self.primitives.executor;
        let job = &ctx.job;

        executor
            .fill(session, &portal::offer_name(), &job.offer_name)
            .await?;
        executor
            .fill(session, &portal::offer_description(), &job.offer_description)
            .await?;

        if self
            .primitives
            .locator()
            .find_now(session, &portal::joint_offer_row())
            .await?
            .is_some()
        {
            info!(joint = job.joint_offer, "answering joint offer question");
            executor
                .click(session, &portal::joint_offer_choice(job.joint_offer))
                .await?;
        } else {
            debug!("tender has no joint offer question");
        }

        self.next_step("offer form", &[portal::no_bids_toggle()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Selector;
    use crate::store::MemoryStore;
    use crate::testing::{Effect, ScriptedBrowser};
    use crate::workflow::tests::{config_in, job, orchestrator};

    fn wizard(id: &str) -> Selector {
        Selector::id(format!("ctl00_mpcphFormWizardFields_{}", id))
    }

    fn offer_form() -> ScriptedBrowser {
        ScriptedBrowser::new()
            .ready_page()
            .element(wizard("txtBIDName"))
            .element(wizard("txtDescription"))
            .element(Selector::id("ctl00_btnNext"))
            .on_interact(Selector::id("ctl00_btnNext"), Effect::Show(wizard("chkNoBids")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fills_form_and_answers_joint_offer() {
        let root = tempfile::tempdir().unwrap();
        let browser = offer_form()
            .element(wizard("Tr1"))
            .element(wizard("rbdesactivaUtp"));
        let probe = browser.clone();
        let run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.describe_offer(&ctx).await.unwrap();

        assert_eq!(probe.value_of(&wizard("txtBIDName")).as_deref(), Some("Oferta Acme"));
        assert_eq!(probe.value_of(&wizard("txtDescription")).as_deref(), Some("Medicamentos"));
        assert_eq!(probe.interactions_with(&wizard("rbdesactivaUtp")).len(), 1);
        assert_eq!(probe.interactions_with(&Selector::id("ctl00_btnNext")).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_that_never_lands_times_out() {
        let root = tempfile::tempdir().unwrap();
        let browser = ScriptedBrowser::new()
            .ready_page()
            .element(wizard("txtBIDName"))
            .element(wizard("txtDescription"))
            .element(Selector::id("ctl00_btnNext"));
        let probe = browser.clone();
        let run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        let err = run.describe_offer(&ctx).await.unwrap_err();

        assert!(matches!(
            err,
            crate::errors::DriverError::TransitionTimeout { attempts: 4, .. }
        ));
        assert_eq!(probe.interactions_with(&Selector::id("ctl00_btnNext")).len(), 3);
        assert_eq!(probe.scripts_matching("siguiente"), 1);
        assert!(probe.interactions_with(&wizard("rbdesactivaUtp")).is_empty());
    }
}
