use super::{portal, Orchestrator, RunContext};
use crate::browser::Trigger;
use crate::core::BrowserTrait;
use crate::errors::{DriverError, Result};
use crate::store::{LineItem, SubmissionStore};
use crate::utils::ScreenshotManager;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Pager pages holding `item_count` items, 1-based.
pub fn plan_pages(item_count: u32) -> Vec<u32> {
    (1..=item_count.div_ceil(portal::ITEMS_PER_PAGE)).collect()
}

/// Zero-based position of the item; correlatives start at 1.
fn position(correlative: u32) -> Result<u32> {
    correlative.checked_sub(1).ok_or_else(|| {
        DriverError::InvalidArguments("line item correlative must start at 1".to_string())
    })
}

pub fn page_of(correlative: u32) -> Result<u32> {
    Ok(position(correlative)? / portal::ITEMS_PER_PAGE + 1)
}

/// Two-digit row index of the item within its page, as used in field ids.
pub fn slot_key(correlative: u32) -> Result<String> {
    Ok(format!("{:02}", position(correlative)? % portal::ITEMS_PER_PAGE))
}

/// Supplier comment: the description on one line, then the glosa.
pub fn comment_for(item: &LineItem) -> String {
    let description = item.description.split_whitespace().collect::<Vec<_>>().join(" ");
    match item.glosa.as_deref().map(str::trim) {
        Some(glosa) if !glosa.is_empty() => format!("{}-{}", description, glosa),
        _ => description,
    }
}

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    pub(super) async fn fill_line_items(&self, ctx: &RunContext) -> Result<()> {
        let job = &ctx.job;
        let count = self
            .store
            .tender_item_count(&job.tender, &job.published)
            .await?;
        let items = self.store.line_items(&job.tender, &job.rut_user).await?;
        info!(count, loaded = items.len(), "line items to enter");
        let placed = items
            .iter()
            .map(|item| Ok((page_of(item.correlative)?, slot_key(item.correlative)?, item)))
            .collect::<Result<Vec<_>>>()?;

        self.tick_no_bids().await?;

        for page in plan_pages(count) {
            self.move_to_page(page).await?;
            for (_, slot, item) in placed.iter().filter(|(on, _, _)| *on == page) {
                if let Err(e) = self.fill_item(slot, item).await {
                    if !e.is_recoverable() {
                        return Err(e);
                    }
                    warn!(correlative = item.correlative, page, error = %e, "item skipped");
                    let shot = ScreenshotManager::artifact_name(&format!("item_{}", item.correlative));
                    self.session.capture(&ctx.artifacts_dir, &shot).await;
                }
            }
        }

        self.next_step("line items", &[portal::attachments_tab()])
            .await?;
        Ok(())
    }

    async fn tick_no_bids(&self) -> Result<()> {
        let checked = self
            .session
            .execute_script(&portal::no_bids_checked_script())
            .await?;
        if checked == Value::Bool(true) {
            debug!("no-bids toggle already ticked");
            return Ok(());
        }
        self.primitives
            .executor
            .click(&self.session, &portal::no_bids_toggle())
            .await?;
        Ok(())
    }

    async fn move_to_page(&self, page: u32) -> Result<()> {
        let symbols = portal::PAGER_SYMBOLS.map(String::from);
        let report = self.primitives.gate.wait(&self.session, &symbols).await?;
        if !report.missing_symbols.is_empty() {
            self.restore_pager(&report.missing_symbols).await?;
        }

        let outcome = self
            .primitives
            .pager
            .verify_with_fallback(
                &self.session,
                &format!("page {}", page),
                &Trigger::script(portal::move_page_script(page)),
                &Trigger::script(portal::postback_page_script(page)),
                &[portal::current_page(page)],
                &self.config.retry.page_change,
            )
            .await?;
        info!(page, attempts = outcome.attempts, fallback = outcome.used_fallback, "on item page");
        Ok(())
    }

    /// Reloads the wizard page and defines the pager function again when
    /// the page lost it.
    async fn restore_pager(&self, missing: &[String]) -> Result<()> {
        warn!(?missing, "pager functions missing, reloading");
        self.session.reload().await?;
        self.primitives.gate.wait(&self.session, &[]).await?;
        self.tick_no_bids().await?;
        self.session.execute_script(portal::MOVE_PAGE_SHIM).await?;
        Ok(())
    }

    async fn fill_item(&self, slot: &str, item: &LineItem) -> Result<()> {
        let session = &self.session;
        let executor = &self.primitives.executor;
        debug!(correlative = item.correlative, %slot, "filling item");

        executor.click(session, &portal::item_radio(slot)).await?;
        executor
            .fill(session, &portal::item_comment(slot), &comment_for(item))
            .await?;
        executor
            .fill(session, &portal::item_price(slot), &item.unit_price)
            .await?;
        session.press_key("Tab").await?;
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
    use serde_json::json;

    fn wizard(id: &str) -> Selector {
        Selector::id(format!("ctl00_mpcphFormWizardFields_{}", id))
    }

    fn item(correlative: u32) -> LineItem {
        LineItem {
            correlative,
            unit_price: format!("{}00", correlative),
            description: format!("Producto  {}\n caja", correlative),
            glosa: Some("marca X".into()),
        }
    }

    fn pager_on(page: u32) -> Selector {
        portal::current_page(page).selectors().next().unwrap()
    }

    /// The first items page with every row's fields present.
    fn items_page() -> ScriptedBrowser {
        let mut browser = ScriptedBrowser::new()
            .ready_page()
            .element(wizard("chkNoBids"))
            .element(Selector::xpath("//input[contains(@id, 'rptBids_ctl')]"))
            .element(pager_on(1))
            .element(Selector::id("ctl00_btnNext"))
            .on_interact(Selector::id("ctl00_btnNext"), Effect::Show(Selector::id("ctl00_trvWizardt3")));
        for slot in 0..10 {
            browser = browser
                .element(wizard(&format!("rptBids_ctl{:02}_rblBids_0", slot)))
                .element(wizard(&format!("rptBids_ctl{:02}__TxtSupplierComment", slot)))
                .element(wizard(&format!("rptBids_ctl{:02}__TxtUnitNetPriceN", slot)));
        }
        browser
    }

    #[test]
    fn test_twenty_three_items_span_three_pages() {
        assert_eq!(plan_pages(23), vec![1, 2, 3]);
        assert_eq!(plan_pages(10), vec![1]);
        assert!(plan_pages(0).is_empty());

        assert_eq!(page_of(10).unwrap(), 1);
        assert_eq!(page_of(11).unwrap(), 2);
        assert_eq!(page_of(23).unwrap(), 3);
        assert_eq!(slot_key(1).unwrap(), "00");
        assert_eq!(slot_key(10).unwrap(), "09");
        assert_eq!(slot_key(11).unwrap(), "00");
        assert_eq!(slot_key(23).unwrap(), "02");
    }

    #[test]
    fn test_correlative_zero_is_rejected() {
        assert!(matches!(page_of(0), Err(DriverError::InvalidArguments(_))));
        assert!(matches!(slot_key(0), Err(DriverError::InvalidArguments(_))));
    }

    #[test]
    fn test_comment_collapses_whitespace() {
        assert_eq!(comment_for(&item(3)), "Producto 3 caja-marca X");
        let bare = LineItem {
            glosa: None,
            ..item(4)
        };
        assert_eq!(comment_for(&bare), "Producto 4 caja");
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_entered_page_by_page() {
        let root = tempfile::tempdir().unwrap();
        let browser = items_page()
            .script_returns("el.checked", json!(false))
            .on_script("fnMovePage(2,", Effect::Hide(pager_on(1)))
            .on_script("fnMovePage(2,", Effect::Show(pager_on(2)));
        let probe = browser.clone();
        let store = MemoryStore::new().with_items("1057-22-LE24", (1..=12).map(item).collect());
        let run = orchestrator(browser, store, config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.fill_line_items(&ctx).await.unwrap();

        assert_eq!(probe.interactions_with(&wizard("chkNoBids")).len(), 1);
        assert_eq!(probe.scripts_matching("fnMovePage(1,\"wucPagerBID\")"), 1);
        assert_eq!(probe.scripts_matching("fnMovePage(2,\"wucPagerBID\")"), 1);
        assert_eq!(probe.scripts_matching("fnMovePage(3,"), 0);
        assert_eq!(probe.keys().len(), 12);
        // Slot 01 holds item 2 on page one, then item 12 on page two.
        assert_eq!(
            probe.value_of(&wizard("rptBids_ctl01__TxtUnitNetPriceN")).as_deref(),
            Some("1200")
        );
        assert_eq!(
            probe
                .value_of(&wizard("rptBids_ctl09__TxtSupplierComment"))
                .as_deref(),
            Some("Producto 10 caja-marca X")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_page_is_a_transition_timeout() {
        let root = tempfile::tempdir().unwrap();
        let browser = items_page().script_returns("el.checked", json!(true));
        let view = browser.clone();
        let store = MemoryStore::new().with_items("1057-22-LE24", (1..=12).map(item).collect());
        let run = orchestrator(browser, store, config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        let err = run.fill_line_items(&ctx).await.unwrap_err();

        match err {
            DriverError::TransitionTimeout { step, .. } => assert_eq!(step, "page 2"),
            other => panic!("expected transition timeout, got {:?}", other),
        }
        assert_eq!(view.scripts_matching("__doPostBack('wucPagerBID$ctl02'"), 1);
        // Page one's rows keep page one's items.
        assert_eq!(
            view.value_of(&wizard("rptBids_ctl01__TxtUnitNetPriceN")).as_deref(),
            Some("200")
        );
        assert_eq!(view.keys().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_correlative_stops_before_typing() {
        let root = tempfile::tempdir().unwrap();
        let browser = items_page().script_returns("el.checked", json!(true));
        let view = browser.clone();
        let store = MemoryStore::new().with_items("1057-22-LE24", vec![item(0), item(1)]);
        let run = orchestrator(browser, store, config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        let err = run.fill_line_items(&ctx).await.unwrap_err();

        assert!(matches!(err, DriverError::InvalidArguments(_)));
        assert!(view.keys().is_empty());
        assert_eq!(view.value_of(&wizard("rptBids_ctl00__TxtUnitNetPriceN")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pager_reloads_and_injects_shim() {
        let root = tempfile::tempdir().unwrap();
        let browser = items_page()
            .script_returns("el.checked", json!(true))
            .script_returns("missingSymbols", json!(["fnMovePage"]));
        let probe = browser.clone();
        let store = MemoryStore::new().with_items("1057-22-LE24", vec![item(1)]);
        let run = orchestrator(browser, store, config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.fill_line_items(&ctx).await.unwrap();

        assert_eq!(probe.navigations(), vec!["reload"]);
        assert_eq!(probe.scripts_matching("window.fnMovePage = function"), 1);
        assert!(probe.interactions_with(&wizard("chkNoBids")).is_empty());
        assert_eq!(probe.keys(), vec!["Tab"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfillable_item_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let browser = items_page()
            .script_returns("el.checked", json!(true))
            .fail(
                wizard("rptBids_ctl01_rblBids_0"),
                crate::actions::Mechanism::Native,
                "intercepted",
            )
            .fail(
                wizard("rptBids_ctl01_rblBids_0"),
                crate::actions::Mechanism::Script,
                "intercepted",
            )
            .fail(
                wizard("rptBids_ctl01_rblBids_0"),
                crate::actions::Mechanism::Pointer,
                "intercepted",
            );
        let probe = browser.clone();
        let store = MemoryStore::new().with_items("1057-22-LE24", (1..=3).map(item).collect());
        let run = orchestrator(browser, store, config_in(root.path())).await;

        let ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.path().into());
        run.fill_line_items(&ctx).await.unwrap();

        assert_eq!(
            probe.value_of(&wizard("rptBids_ctl00__TxtUnitNetPriceN")).as_deref(),
            Some("100")
        );
        assert_eq!(probe.value_of(&wizard("rptBids_ctl01__TxtUnitNetPriceN")), None);
        assert_eq!(
            probe.value_of(&wizard("rptBids_ctl02__TxtUnitNetPriceN")).as_deref(),
            Some("300")
        );
        assert_eq!(probe.keys().len(), 2);
    }
}
