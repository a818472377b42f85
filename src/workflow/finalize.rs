use super::{portal, Orchestrator, RunContext};
use crate::core::BrowserTrait;
use crate::dom::OfferSummary;
use crate::errors::{DriverError, Result};
use crate::store::{SubmissionRecord, SubmissionStore};
use crate::utils::ScreenshotManager;
use chrono::NaiveDateTime;
use tracing::{info, warn};

/// One record per item block on the review page, stamped with `at`.
pub fn submission_records(
    summary: &OfferSummary,
    ctx: &RunContext,
    link: &str,
    at: NaiveDateTime,
) -> Vec<SubmissionRecord> {
    let application_link = ctx
        .application_code
        .as_deref()
        .map(|code| format!("{}{}", portal::DESKTOP_URL, code))
        .unwrap_or_default();

    summary
        .items
        .iter()
        .map(|item| SubmissionRecord {
            acquisition_number: summary.acquisition_number.clone(),
            name: summary.name.clone(),
            state: summary.state.clone(),
            currency: summary.currency.clone(),
            buyer: summary.buyer.clone(),
            buyer_notes: summary.buyer_notes.clone(),
            contact: summary.contact.clone(),
            phones: summary.phones.clone(),
            published_at: summary.published_at.clone(),
            closes_at: summary.closes_at.clone(),
            opens_at: summary.opens_at.clone(),
            user_name: summary.user_name.clone(),
            user_rut: summary.user_rut.clone(),
            social_reason: summary.social_reason.clone(),
            offer_name: summary.offer_name.clone(),
            offer_description: summary.offer_description.clone(),
            offered_at: summary.offered_at.clone(),
            offer_total: summary.offer_total.clone(),
            item: item.item.clone(),
            onu: item.onu.clone(),
            buyer_spec: item.buyer_spec.clone(),
            quantity: item.quantity.clone(),
            offered_quantity: item.offered_quantity.clone(),
            supplier_spec: item.supplier_spec.clone(),
            unit_price: item.unit_price.clone(),
            item_total: item.total.clone(),
            link: link.to_string(),
            application_link: application_link.clone(),
            rut_client: ctx.job.rut_client.clone(),
            rut_user: ctx.job.rut_user.clone(),
            access: ctx.job.access.clone(),
            status: 0,
            created_at: Some(at),
            updated_at: Some(at),
        })
        .collect()
}

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    /// Records the review page, enters the offer and settles the books.
    pub(super) async fn finalize(&self, ctx: &mut RunContext) -> Result<()> {
        let session = &self.session;
        let job = &ctx.job;

        let html = session.execute_script(portal::PAGE_HTML_SCRIPT).await?;
        let html = html
            .as_str()
            .ok_or_else(|| DriverError::JavaScriptFailed("review page returned no markup".to_string()))?;
        let summary = OfferSummary::parse(html)?;
        let link = session.current_url().await?;
        let now = chrono::Local::now().naive_local();

        let records = submission_records(&summary, ctx, &link, now);
        if records.is_empty() {
            warn!("review page lists no items");
        }
        for record in &records {
            self.store.insert_submission(record).await?;
        }
        info!(items = records.len(), total = %summary.offer_total, "review recorded");

        self.primitives
            .executor
            .click(session, &portal::enter_offer())
            .await?;
        let attempts = self.config.retry.alert_attempts;
        let alert = self
            .primitives
            .alerts
            .check_with_retry(session, attempts)
            .await;
        if !alert.present {
            return Err(DriverError::TransitionTimeout {
                step: "offer confirmation".to_string(),
                attempts,
            });
        }
        if alert.is_critical() {
            return Err(DriverError::CriticalAlert(alert.message.unwrap_or_default()));
        }
        session.press_key("Tab").await?;
        session.press_key("Enter").await?;
        session
            .capture(&ctx.artifacts_dir, &ScreenshotManager::artifact_name("oferta_ingresada"))
            .await;
        info!(tender = %job.tender, "offer entered");

        let company_id = ctx.company_id()?;
        let submitted = self
            .store
            .mark_documents_submitted(&job.tender, company_id, &job.offer_name, now)
            .await?;
        if !ctx.documents.is_empty() {
            self.documents
                .rename_after_submission(ctx.company_name()?, &job.tender, &job.offer_name, now)
                .await?;
        }
        self.store.mark_tender_entered(&job.tender, &job.rut_user).await?;
        let posted = self
            .store
            .mark_documents_posted(&job.tender, company_id, &job.offer_name, now)
            .await?;
        info!(submitted, posted, "documents settled");

        ctx.submitted_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::summary::tests::PAGE;
    use crate::dom::Selector;
    use crate::store::{Company, DocumentEntry, DocumentKind, MemoryStore};
    use crate::testing::{Effect, ScriptedBrowser};
    use crate::workflow::tests::{config_in, job, orchestrator};
    use chrono::NaiveDate;
    use serde_json::json;

    const REVIEW_URL: &str = "https://www.mercadopublico.cl/BID/Modules/BID/WizardBid.aspx?step=5";

    fn context(root: &std::path::Path) -> RunContext {
        let mut ctx = RunContext::new(job("1057-22-LE24"), Default::default(), root.into());
        ctx.application_code = Some("Ab%2Bc9Q==".into());
        ctx.company = Some(Company {
            id: 4,
            name: "Acme".into(),
        });
        ctx
    }

    fn enter_offer() -> Selector {
        Selector::id("ctl00_mpcphFormWizardFields_btnEnterOffer")
    }

    fn review_page() -> ScriptedBrowser {
        ScriptedBrowser::new()
            .ready_page()
            .url(REVIEW_URL)
            .script_returns("outerHTML", json!(PAGE))
            .element(enter_offer())
    }

    #[test]
    fn test_records_carry_header_and_item_fields() {
        let root = tempfile::tempdir().unwrap();
        let summary = OfferSummary::parse(PAGE).unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();

        let records = submission_records(&summary, &context(root.path()), REVIEW_URL, at);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].acquisition_number, "1057-22-LE24");
        assert_eq!(records[0].item_total, "12.300");
        assert_eq!(records[1].unit_price, "45");
        assert_eq!(
            records[1].application_link,
            "https://www.mercadopublico.cl/Portal/Modules/Desktop/Desktop.aspx?enc=Ab%2Bc9Q=="
        );
        assert!(records.iter().all(|r| r.status == 0 && r.created_at == Some(at)));
        assert_eq!(records[0].rut_client, "76222222-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_offer_settles_in_order() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("documentos/Acme/1057-22-LE24/tecnicos")).unwrap();
        let store = MemoryStore::new();
        let browser = review_page().on_interact(
            enter_offer(),
            Effect::Dialog("¿Está seguro que desea ingresar la oferta?".into()),
        );
        let probe = browser.clone();
        let run = orchestrator(browser, store.clone(), config_in(root.path())).await;

        let mut ctx = context(root.path());
        ctx.documents = vec![DocumentEntry {
            file_name: "ficha.pdf".into(),
            kind: DocumentKind::Technical,
        }];
        run.finalize(&mut ctx).await.unwrap();

        assert_eq!(
            store.writes(),
            vec![
                "insert_submission",
                "insert_submission",
                "mark_documents_submitted",
                "mark_tender_entered",
                "mark_documents_posted"
            ]
        );
        assert_eq!(store.submissions()[0].link, REVIEW_URL);
        assert_eq!(
            store.entered(),
            vec![("1057-22-LE24".to_string(), "76111111-1".to_string())]
        );
        assert_eq!(probe.keys(), vec!["Tab", "Enter"]);
        assert!(!root.path().join("documentos/Acme/1057-22-LE24").exists());
        assert!(ctx.submitted_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_confirmation_dialog_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let run = orchestrator(review_page(), store.clone(), config_in(root.path())).await;

        let mut ctx = context(root.path());
        let err = run.finalize(&mut ctx).await.unwrap_err();

        assert!(matches!(err, DriverError::TransitionTimeout { attempts: 3, .. }));
        assert!(!store.writes().contains(&"mark_tender_entered".to_string()));
        assert!(ctx.submitted_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_confirmation_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let browser = review_page().on_interact(
            enter_offer(),
            Effect::Dialog("Ha ocurrido un error al ingresar la oferta".into()),
        );
        let run = orchestrator(browser, MemoryStore::new(), config_in(root.path())).await;

        let mut ctx = context(root.path());
        let err = run.finalize(&mut ctx).await.unwrap_err();
        assert!(matches!(err, DriverError::CriticalAlert(_)));
    }
}
