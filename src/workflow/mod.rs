//! The bid workflow: login, search listing, offer form, line items,
//! declaration signature, document upload and final submission, driven
//! through the session primitives and checkpointed into the store and the
//! status file.

pub mod context;
mod documents;
mod finalize;
mod line_items;
mod login;
mod offer;
pub mod portal;
mod search;
mod signature;

pub use context::{parse_flag, JobParams, LoginParams, RunContext, RutKind};
pub use finalize::submission_records;
pub use line_items::{comment_for, page_of, plan_pages, slot_key};
pub use login::{bounded_login, AttemptResult, LoginVerdict};

use crate::actions::ResilientExecutor;
use crate::browser::{
    AlertClassifier, AlertHandler, DriverSession, ElementLocator, ReadinessGate, TransitionReport,
    TransitionVerifier, Trigger,
};
use crate::captcha::CaptchaSolver;
use crate::core::{BrowserTrait, Config};
use crate::dom::TargetDescriptor;
use crate::errors::{DriverError, Result};
use crate::files::{DocumentRepository, UserDirectory};
use crate::status::{Phase, StatusFile};
use crate::store::SubmissionStore;
use crate::utils::ScreenshotManager;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Unauthenticated,
    AwaitingOrgSelection,
    OfferDraft,
    LineItemsEntry,
    SignaturePending,
    DocumentUpload,
    FinalReview,
    Submitted,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Unauthenticated => "unauthenticated",
            WorkflowState::AwaitingOrgSelection => "awaiting_org_selection",
            WorkflowState::OfferDraft => "offer_draft",
            WorkflowState::LineItemsEntry => "line_items_entry",
            WorkflowState::SignaturePending => "signature_pending",
            WorkflowState::DocumentUpload => "document_upload",
            WorkflowState::FinalReview => "final_review",
            WorkflowState::Submitted => "submitted",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single result a run reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    LoginOk,
    LoginFailed,
    CredentialsRejected,
    UnitSelectionFailed,
    Submitted,
    /// Stopped at the declaration waiting for the client's permission.
    Deferred,
    Aborted { state: WorkflowState, reason: String },
}

impl TerminalOutcome {
    /// What goes to stdout. Submissions succeed, defer and abort silently;
    /// their detail lives in the status file and the job log.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            TerminalOutcome::LoginOk => Some("login_ok"),
            TerminalOutcome::LoginFailed => Some("login_failed"),
            TerminalOutcome::CredentialsRejected => Some("login_error_credenciales"),
            TerminalOutcome::UnitSelectionFailed => Some("error_seleccion_unidad"),
            TerminalOutcome::Submitted
            | TerminalOutcome::Deferred
            | TerminalOutcome::Aborted { .. } => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            TerminalOutcome::LoginOk | TerminalOutcome::Submitted | TerminalOutcome::Deferred => 0,
            _ => 1,
        }
    }
}

/// The driver primitives, built once from configuration.
#[derive(Debug, Clone)]
struct Primitives {
    executor: ResilientExecutor,
    verifier: TransitionVerifier,
    /// Like `verifier`, also waiting for the product pager's functions.
    pager: TransitionVerifier,
    gate: ReadinessGate,
    login_alerts: AlertHandler,
    alerts: AlertHandler,
}

impl Primitives {
    fn from_config(config: &Config) -> Self {
        let timeouts = &config.timeouts;
        let locator = ElementLocator::from_config(timeouts);
        let executor = ResilientExecutor::new(locator, timeouts.element_timeout());
        let gate = ReadinessGate::from_config(timeouts);
        let verifier = TransitionVerifier::new(executor.clone(), gate.clone(), timeouts.settle_delay());
        let pager = verifier.clone().with_symbols(&portal::PAGER_SYMBOLS);
        let alert_poll = Duration::from_millis(timeouts.alert_poll_ms);

        Self {
            executor,
            verifier,
            pager,
            gate,
            login_alerts: AlertHandler::new(
                AlertClassifier::new(&config.alerts.login_keywords),
                alert_poll,
                timeouts.poll_interval(),
            ),
            alerts: AlertHandler::new(
                AlertClassifier::new(&config.alerts.critical_keywords),
                alert_poll,
                timeouts.poll_interval(),
            ),
        }
    }

    fn locator(&self) -> &ElementLocator {
        self.executor.locator()
    }
}

/// Owns the session and the store for one run and walks the workflow.
pub struct Orchestrator<B: BrowserTrait, S: SubmissionStore> {
    session: DriverSession<B>,
    store: S,
    config: Config,
    primitives: Primitives,
    state: WorkflowState,
    status: Option<StatusFile>,
    captcha: Option<Arc<dyn CaptchaSolver>>,
    documents: DocumentRepository,
}

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    pub fn new(session: DriverSession<B>, store: S) -> Self {
        let config = session.config().clone();
        Self {
            primitives: Primitives::from_config(&config),
            documents: DocumentRepository::new(config.paths.documents_root.clone()),
            session,
            store,
            config,
            state: WorkflowState::Unauthenticated,
            status: None,
            captcha: None,
        }
    }

    pub fn with_captcha(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.captcha = Some(solver);
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn session(&self) -> &DriverSession<B> {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn shutdown(self) -> Result<()> {
        self.session.close().await
    }

    fn advance(&mut self, state: WorkflowState) {
        info!(from = %self.state, to = %state, "workflow state");
        self.state = state;
    }

    async fn checkpoint(&self, phase: Phase) {
        if let Some(status) = &self.status {
            status.checkpoint(phase).await;
        }
    }

    /// Login-only run: authenticate and pick the user's unit, nothing else.
    pub async fn run_login(&mut self, params: &LoginParams) -> TerminalOutcome {
        info!(user = %params.user, company_id = params.company_id, access = %params.access, "login run");
        let unit = match UserDirectory::unit_for(&self.config.paths.users_cache, params.user_id).await {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                warn!(user_id = params.user_id, "no organization unit cached for user");
                return TerminalOutcome::LoginFailed;
            }
            Err(e) => {
                error!(error = %e, "user cache unreadable");
                return TerminalOutcome::LoginFailed;
            }
        };

        let attempts = self.config.retry.login_only_attempts;
        match self.login(&params.user, &params.password, &unit, attempts).await {
            LoginVerdict::Authenticated { attempts } => {
                info!(attempts, "login confirmed");
                TerminalOutcome::LoginOk
            }
            LoginVerdict::Failed { outcome, attempts } => {
                warn!(attempts, ?outcome, "login failed");
                outcome
            }
        }
    }

    /// Full submission run. Any error past the login ends the run with the
    /// reason in the status file and a screenshot of the failing page.
    pub async fn run_submission(&mut self, job: JobParams) -> TerminalOutcome {
        let policy = self.config.client_policy(&job.rut_user);
        let artifacts_dir = self.config.artifacts_dir_for(&job.rut_user);
        self.status = Some(StatusFile::for_tender(&self.config.paths.status_dir, &job.tender));
        self.checkpoint(Phase::Starting).await;

        info!(
            tender = %job.tender,
            rut_user = %job.rut_user,
            rut_client = %job.rut_client,
            session_id = self.session.session_id(),
            "submission run"
        );

        let mut ctx = RunContext::new(job, policy, artifacts_dir);
        let outcome = match self.drive_submission(&mut ctx).await {
            Ok(outcome) => outcome,
            Err(e) => self.abort(&ctx, e).await,
        };
        info!(?outcome, state = %self.state, "run finished");
        outcome
    }

    async fn drive_submission(&mut self, ctx: &mut RunContext) -> Result<TerminalOutcome> {
        let Some(unit) = self.store.organization_unit(&ctx.job.rut_client).await? else {
            warn!(rut_client = %ctx.job.rut_client, "no organization unit on record");
            return Ok(TerminalOutcome::LoginFailed);
        };

        let attempts = self.config.retry.login_attempts;
        let user = ctx.job.mp_user.clone();
        let password = ctx.job.mp_password.clone();
        match self.login(&user, &password, &unit, attempts).await {
            LoginVerdict::Authenticated { attempts } => info!(attempts, "login confirmed"),
            LoginVerdict::Failed { outcome, attempts } => {
                warn!(attempts, ?outcome, "login failed");
                if outcome == TerminalOutcome::CredentialsRejected {
                    self.checkpoint(Phase::CredentialsRejected).await;
                }
                return Ok(outcome);
            }
        }

        if let Some(keyword) = ctx.policy.unit_keyword.clone() {
            self.advance(WorkflowState::AwaitingOrgSelection);
            if let Err(e) = self.switch_unit(&keyword).await {
                error!(error = %e, %keyword, "unit switch failed");
                self.session
                    .capture(&ctx.artifacts_dir, "error_seleccion_unidad.png")
                    .await;
                return Ok(TerminalOutcome::UnitSelectionFailed);
            }
        }
        self.checkpoint(Phase::LoggedIn).await;

        self.advance(WorkflowState::OfferDraft);
        self.open_offer(ctx).await?;
        self.describe_offer(ctx).await?;
        self.checkpoint(Phase::OfferDescribed).await;

        self.advance(WorkflowState::LineItemsEntry);
        self.fill_line_items(ctx).await?;
        self.checkpoint(Phase::ItemsLoaded).await;

        self.advance(WorkflowState::SignaturePending);
        if !self.sign_declaration(ctx).await? {
            return Ok(TerminalOutcome::Deferred);
        }
        self.checkpoint(Phase::Signed).await;

        self.advance(WorkflowState::DocumentUpload);
        self.upload_documents(ctx).await?;
        self.checkpoint(Phase::DocumentsLoaded).await;

        self.advance(WorkflowState::FinalReview);
        self.checkpoint(Phase::Finalizing).await;
        self.finalize(ctx).await?;
        self.checkpoint(Phase::Confirmed).await;

        self.advance(WorkflowState::Submitted);
        Ok(TerminalOutcome::Submitted)
    }

    async fn abort(&self, ctx: &RunContext, err: DriverError) -> TerminalOutcome {
        error!(state = %self.state, error = %err, "run aborted");
        let shot = ScreenshotManager::artifact_name(&format!("error_{}", self.state));
        self.session.capture(&ctx.artifacts_dir, &shot).await;
        if let Some(status) = &self.status {
            let text = format!("Error en {}: {}", self.state, err);
            if let Err(e) = status.write(&text).await {
                warn!(error = %e, "could not record failure in status file");
            }
        }
        TerminalOutcome::Aborted {
            state: self.state,
            reason: err.to_string(),
        }
    }

    /// Moves the wizard forward and confirms the next page by `indicators`,
    /// falling back to scanning the page for any next-like control.
    async fn next_step(&self, step: &str, indicators: &[TargetDescriptor]) -> Result<TransitionReport> {
        self.primitives
            .verifier
            .verify_with_fallback(
                &self.session,
                step,
                &Trigger::click(portal::wizard_next_anywhere()),
                &Trigger::script(portal::EMERGENCY_NEXT_SCRIPT),
                indicators,
                &self.config.retry.wizard_step,
            )
            .await
    }

    /// Polls the page title until it equals `expected`.
    async fn await_title(&self, expected: &str, timeout: Duration) -> Result<bool> {
        let start = tokio::time::Instant::now();
        loop {
            let title = self.session.title().await?;
            if title == expected {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                warn!(%title, %expected, "page title never matched");
                return Ok(false);
            }
            tokio::time::sleep(self.primitives.gate.poll_interval()).await;
        }
    }
}
