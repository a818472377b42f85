use serde_json::json;
use std::path::Path;
use tender_pilot::browser::DriverSession;
use tender_pilot::dom::{Selector, TargetDescriptor};
use tender_pilot::status::{Phase, StatusFile};
use tender_pilot::store::{LineItem, MemoryStore, OrganizationUnit, PendingPermission};
use tender_pilot::testing::{Effect, ScriptedBrowser};
use tender_pilot::workflow::{portal, JobParams, RutKind};
use tender_pilot::{Config, Orchestrator, TerminalOutcome, WorkflowState};

const TENDER: &str = "1057-22-LE24";
const LISTING: &str =
    "https://www.mercadopublico.cl/BID/Modules/RFB/StepsProcessAward/Offers.aspx?qs=2&enc=Zx9%2F";

fn first(target: &TargetDescriptor) -> Selector {
    target.selectors().next().unwrap()
}

fn wizard(id: &str) -> Selector {
    Selector::id(format!("ctl00_mpcphFormWizardFields_{}", id))
}

fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.status_dir = root.join("status");
    config.paths.documents_root = root.join("documentos");
    config.paths.artifacts_dir = root.join("artifacts");
    config.clients.clear();
    std::fs::create_dir_all(&config.paths.status_dir).unwrap();
    config
}

fn job(pending_permission: bool) -> JobParams {
    JobParams {
        rut_user: "76111111-1".into(),
        rut_client: "76222222-2".into(),
        tender: TENDER.into(),
        published: "2024-05-02".into(),
        mp_user: "12345678-9".into(),
        mp_password: "secreto".into(),
        offer_name: "Oferta Acme".into(),
        offer_description: "Insumos medicos".into(),
        access: "1".into(),
        joint_offer: false,
        representative_rut: "11111111-1".into(),
        idp_user: "11111111-1".into(),
        idp_password: "clave".into(),
        sign_with_idp: false,
        rut_kind: RutKind::Representative,
        pending_permission,
    }
}

fn store() -> MemoryStore {
    let items = (1..=2)
        .map(|correlative| LineItem {
            correlative,
            unit_price: format!("{}500", correlative),
            description: format!("Guantes talla {}", correlative),
            glosa: None,
        })
        .collect();
    MemoryStore::new()
        .with_unit(
            "76222222-2",
            OrganizationUnit {
                position: "1".into(),
                name: "Farmacia Central".into(),
            },
        )
        .with_items(TENDER, items)
}

/// Portal pages from the login form to the attachments tab, with the
/// declaration still waiting for the client's permission.
fn portal_up_to_declaration(title: &str) -> ScriptedBrowser {
    let view = first(&portal::view_offers());
    let next = Selector::id("ctl00_btnNext");
    let mut browser = ScriptedBrowser::new()
        .ready_page()
        .element(first(&portal::login_button()))
        .element(Selector::id("zocial-oidc"))
        .element(Selector::id("uname"))
        .element(Selector::id("pword"))
        .element(Selector::id("login-submit"))
        .on_interact(Selector::id("login-submit"), Effect::Title(title.to_string()))
        .on_navigate("NEwSearchProcurement", Effect::Show(Selector::id("txtProcCode")))
        .element(Selector::id("btnSearchByCode"))
        .element(view.clone())
        .on_interact(view.clone(), Effect::Url(LISTING.to_string()))
        .on_interact(view, Effect::Show(Selector::id("btnNewBid")))
        .on_interact(Selector::id("btnNewBid"), Effect::Show(wizard("txtBIDName")))
        .element(wizard("txtDescription"))
        .element(next.clone())
        .on_interact(next.clone(), Effect::Show(wizard("chkNoBids")))
        .on_interact(next, Effect::Show(Selector::id("ctl00_trvWizardt3")))
        .element(Selector::xpath("//input[contains(@id, 'rptBids_ctl')]"))
        .element(first(&portal::current_page(1)))
        .element(Selector::id(portal::ATTACHMENT_FRAME))
        .element_text(first(&portal::declaration_state()), "PENDIENTE")
        .script_returns("el.checked", json!(false));
    for slot in 0..2 {
        browser = browser
            .element(wizard(&format!("rptBids_ctl{:02}_rblBids_0", slot)))
            .element(wizard(&format!("rptBids_ctl{:02}__TxtSupplierComment", slot)))
            .element(wizard(&format!("rptBids_ctl{:02}__TxtUnitNetPriceN", slot)));
    }
    browser
}

#[tokio::test(start_paused = true)]
async fn test_submission_defers_at_pending_declaration() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path());
    let title = config.portal.authenticated_title.clone();
    let browser = portal_up_to_declaration(&title);
    let probe = browser.clone();
    let store = store();
    let session = DriverSession::new(browser, config).await.unwrap();
    let mut run = Orchestrator::new(session, store.clone());

    let outcome = run.run_submission(job(true)).await;

    assert_eq!(outcome, TerminalOutcome::Deferred);
    assert_eq!(outcome.token(), None);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(run.state(), WorkflowState::SignaturePending);

    assert_eq!(store.writes(), vec!["record_application_code", "record_pending_permission"]);
    assert_eq!(store.application_code(TENDER).as_deref(), Some("Zx9%2F"));
    assert_eq!(
        store.pending_permissions(),
        vec![PendingPermission {
            tender: TENDER.into(),
            rut_user: "76111111-1".into(),
            rut_client: "76222222-2".into(),
        }]
    );

    assert_eq!(probe.value_of(&wizard("txtBIDName")).as_deref(), Some("Oferta Acme"));
    assert_eq!(
        probe.value_of(&wizard("rptBids_ctl01__TxtUnitNetPriceN")).as_deref(),
        Some("2500")
    );
    assert_eq!(
        probe.value_of(&wizard("rptBids_ctl00__TxtSupplierComment")).as_deref(),
        Some("Guantes talla 1")
    );

    let status = StatusFile::for_tender(&root.path().join("status"), TENDER);
    assert_eq!(status.read().await.unwrap(), Phase::ItemsLoaded.as_str());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_are_reported_once() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path());
    let browser = portal_up_to_declaration("Mercado Público")
        .on_interact(
            Selector::id("login-submit"),
            Effect::Dialog("Error al iniciar sesión: credenciales incorrectas".into()),
        );
    let probe = browser.clone();
    let store = store();
    let session = DriverSession::new(browser, config).await.unwrap();
    let mut run = Orchestrator::new(session, store.clone());

    let outcome = run.run_submission(job(false)).await;

    assert_eq!(outcome, TerminalOutcome::CredentialsRejected);
    assert_eq!(outcome.token(), Some("login_error_credenciales"));
    assert_eq!(probe.interactions_with(&Selector::id("login-submit")).len(), 1);
    assert!(store.writes().is_empty());

    let status = StatusFile::for_tender(&root.path().join("status"), TENDER);
    assert_eq!(status.read().await.unwrap(), Phase::CredentialsRejected.as_str());
}
