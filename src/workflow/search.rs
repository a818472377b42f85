use super::{portal, Orchestrator, RunContext};
use crate::browser::Trigger;
use crate::core::BrowserTrait;
use crate::errors::Result;
use crate::store::SubmissionStore;
use tracing::{info, warn};

/// The raw `enc` parameter of a listing URL, left encoded.
pub fn application_code(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("enc="))
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    /// From the search page to the offer form of the tender, editing the
    /// saved draft when there is one.
    pub(super) async fn open_offer(&self, ctx: &mut RunContext) -> Result<()> {
        let session = &self.session;
        let executor = &self.primitives.executor;
        let verifier = &self.primitives.verifier;
        let policy = &self.config.retry.wizard_step;

        session.navigate(&self.config.portal.search_url).await?;
        self.primitives.gate.wait(session, &[]).await?;

        if self
            .primitives
            .locator()
            .find_now(session, &portal::unsent_offers_modal())
            .await?
            .is_some()
        {
            info!("closing unsent offers reminder");
            if let Err(e) = executor.click(session, &portal::unsent_offers_close()).await {
                warn!(error = %e, "unsent offers reminder would not close");
            }
        }

        executor
            .fill(session, &portal::tender_code_field(), &ctx.job.tender)
            .await?;
        executor.click(session, &portal::search_button()).await?;
        self.primitives.gate.wait(session, &[]).await?;

        verifier
            .verify(
                session,
                "offers listing",
                &Trigger::click(portal::view_offers()),
                &[portal::existing_offer_edit(), portal::new_offer()],
                policy,
            )
            .await?;

        let url = session.current_url().await?;
        match application_code(&url) {
            Some(code) => {
                self.store
                    .record_application_code(&ctx.job.tender, &code)
                    .await?;
                info!(%code, "application code recorded");
                ctx.application_code = Some(code);
            }
            None => warn!(%url, "offers listing URL carries no application code"),
        }

        let saved = self
            .primitives
            .locator()
            .find_now(session, &portal::existing_offer_state())
            .await?
            .map(|found| found.state.text.contains(portal::SAVED_OFFER_STATE))
            .unwrap_or(false);
        let entry = if saved {
            info!("editing the saved offer");
            portal::existing_offer_edit()
        } else {
            info!("creating a new offer");
            portal::new_offer()
        };

        verifier
            .verify(
                session,
                "offer form",
                &Trigger::click(entry),
                &[portal::offer_name()],
                policy,
            )
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

    const LISTING: &str =
        "https://www.mercadopublico.cl/BID/Modules/RFB/StepsProcessAward/Offers.aspx?qs=2&enc=Ab%2Bc9Q==";

    fn listing_page() -> ScriptedBrowser {
        let view = Selector::css("input[title='Ver Ofertas']");
        ScriptedBrowser::new()
            .ready_page()
            .on_navigate("NEwSearchProcurement", Effect::Show(Selector::id("txtProcCode")))
            .element(Selector::id("btnSearchByCode"))
            .element(view.clone())
            .on_interact(view.clone(), Effect::Url(LISTING.to_string()))
            .on_interact(view, Effect::Show(Selector::id("btnNewBid")))
            .on_interact(
                Selector::id("btnNewBid"),
                Effect::Show(Selector::id("ctl00_mpcphFormWizardFields_txtBIDName")),
            )
    }

    #[test]
    fn test_application_code_kept_encoded() {
        assert_eq!(application_code(LISTING).as_deref(), Some("Ab%2Bc9Q=="));
        assert_eq!(application_code("https://www.mercadopublico.cl/?enc="), None);
        assert_eq!(application_code("not a url"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_offer_when_nothing_saved() {
        let root = tempfile::tempdir().unwrap();
        let browser = listing_page().element(Selector::id("modalOfertasNoEnviadas")).element(
            Selector::css("#modalOfertasNoEnviadas button.close"),
        );
        let probe = browser.clone();
        let store = MemoryStore::new();
        let run = orchestrator(browser, store.clone(), config_in(root.path())).await;

        let mut ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.open_offer(&mut ctx).await.unwrap();

        assert_eq!(
            probe.value_of(&Selector::id("txtProcCode")).as_deref(),
            Some("1057-22-LE24")
        );
        assert_eq!(
            probe
                .interactions_with(&Selector::css("#modalOfertasNoEnviadas button.close"))
                .len(),
            1
        );
        assert_eq!(probe.interactions_with(&Selector::id("btnNewBid")).len(), 1);
        assert_eq!(store.application_code("1057-22-LE24").as_deref(), Some("Ab%2Bc9Q=="));
        assert_eq!(ctx.application_code.as_deref(), Some("Ab%2Bc9Q=="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_offer_is_edited() {
        let root = tempfile::tempdir().unwrap();
        let edit = Selector::id("rptDetail_ctl01_imgEdit");
        let browser = listing_page()
            .element(edit.clone())
            .element_text(Selector::id("rptDetail_ctl01_lblrptStatus"), "Guardada")
            .on_interact(
                edit.clone(),
                Effect::Show(Selector::id("ctl00_mpcphFormWizardFields_txtBIDName")),
            );
        let probe = browser.clone();
        let run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let mut ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.open_offer(&mut ctx).await.unwrap();

        assert_eq!(probe.interactions_with(&edit).len(), 1);
        assert!(probe.interactions_with(&Selector::id("btnNewBid")).is_empty());
    }
}
