use super::{portal, Orchestrator, RunContext};
use crate::core::BrowserTrait;
use crate::errors::{DriverError, Result};
use crate::files::{upload_wait, DocumentRepository};
use crate::store::{DocumentEntry, SubmissionStore};
use crate::utils::ScreenshotManager;
use serde_json::Value;
use tracing::{debug, info, warn};

impl<B: BrowserTrait, S: SubmissionStore> Orchestrator<B, S> {
    /// Replaces whatever is attached with the tender's pending documents.
    pub(super) async fn upload_documents(&self, ctx: &mut RunContext) -> Result<()> {
        let company = self
            .store
            .company(&ctx.job.rut_user)
            .await?
            .ok_or_else(|| DriverError::RecordNotFound(format!("company with RUT {}", ctx.job.rut_user)))?;
        let documents = self
            .store
            .pending_documents(company.id, &ctx.job.tender)
            .await?;
        info!(company = %company.name, count = documents.len(), "documents to upload");
        ctx.company = Some(company);

        self.remove_attached().await?;
        for document in &documents {
            self.upload_document(ctx, document).await?;
        }
        ctx.documents = documents;

        let attached = self.attached_names().await?;
        for document in &ctx.documents {
            if !attached.iter().any(|name| name.contains(&document.file_name)) {
                warn!(file = %document.file_name, "document missing from the attached list");
            }
        }
        ctx.attached_names = attached;

        self.next_step("documents", &portal::review_indicators())
            .await?;
        Ok(())
    }

    async fn remove_attached(&self) -> Result<()> {
        let removed = self
            .session
            .execute_script(&portal::remove_attached_script())
            .await?
            .as_u64()
            .unwrap_or(0);
        if removed == 0 {
            return Ok(());
        }

        info!(removed, "removed previously attached documents");
        let alert = self.primitives.alerts.check(&self.session).await;
        if alert.is_critical() {
            return Err(DriverError::CriticalAlert(alert.message.unwrap_or_default()));
        }
        tokio::time::sleep(self.config.timeouts.settle_delay()).await;
        Ok(())
    }

    async fn upload_document(&self, ctx: &RunContext, document: &DocumentEntry) -> Result<()> {
        let session = &self.session;
        let locator = self.primitives.locator();
        let path = self
            .documents
            .document_path(ctx.company_name()?, &ctx.job.tender, document);
        let size_mb = DocumentRepository::size_mb(&path).await?;
        let suffix = document.kind.widget_suffix();

        let input = locator
            .locate(session, &portal::document_input(suffix), self.primitives.executor.timeout())
            .await?;
        session
            .set_input_files(&input.selector, std::slice::from_ref(&path))
            .await?;
        self.primitives
            .executor
            .click(session, &portal::document_add(suffix))
            .await?;

        let (confirm, settle) = upload_wait(size_mb);
        if locator
            .locate(session, &portal::upload_confirmation(), confirm)
            .await
            .is_err()
        {
            return Err(DriverError::TransitionTimeout {
                step: format!("upload of {}", document.file_name),
                attempts: 1,
            });
        }

        if ctx.policy.verbose_documents {
            info!(file = %document.file_name, kind = ?document.kind, size_mb, "document uploaded");
            let shot = ScreenshotManager::artifact_name(&format!("documento_{}", document.file_name));
            session.capture(&ctx.artifacts_dir, &shot).await;
        } else {
            debug!(file = %document.file_name, size_mb, "document uploaded");
        }
        tokio::time::sleep(settle).await;
        Ok(())
    }

    async fn attached_names(&self) -> Result<Vec<String>> {
        let listed = self
            .session
            .execute_script(&portal::attached_names_script())
            .await?;
        Ok(match listed {
            Value::Array(names) => names
                .into_iter()
                .filter_map(|name| name.as_str().map(|n| n.trim().to_string()))
                .collect(),
            _ => Vec::new(),
        })
    }
}
