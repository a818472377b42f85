use super::{
    Company, DocumentEntry, LineItem, OrganizationUnit, PendingPermission, SubmissionRecord,
    SubmissionStore,
};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    units: HashMap<String, OrganizationUnit>,
    item_counts: HashMap<String, u32>,
    items: HashMap<String, Vec<LineItem>>,
    companies: HashMap<String, Company>,
    documents: HashMap<(i64, String), Vec<DocumentEntry>>,
    application_codes: HashMap<String, String>,
    pending: Vec<PendingPermission>,
    submissions: Vec<SubmissionRecord>,
    entered: Vec<(String, String)>,
    writes: Vec<String>,
}

/// In-process store. Clones share state, so a test can keep one handle
/// while the workflow owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_unit(self, rut: &str, unit: OrganizationUnit) -> Self {
        self.state().units.insert(rut.to_string(), unit);
        self
    }

    pub fn with_items(self, tender: &str, items: Vec<LineItem>) -> Self {
        {
            let mut state = self.state();
            state.item_counts.insert(tender.to_string(), items.len() as u32);
            state.items.insert(tender.to_string(), items);
        }
        self
    }

    pub fn with_company(self, rut: &str, company: Company) -> Self {
        self.state().companies.insert(rut.to_string(), company);
        self
    }

    pub fn with_documents(self, company_id: i64, tender: &str, documents: Vec<DocumentEntry>) -> Self {
        self.state()
            .documents
            .insert((company_id, tender.to_string()), documents);
        self
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state().submissions.clone()
    }

    pub fn pending_permissions(&self) -> Vec<PendingPermission> {
        self.state().pending.clone()
    }

    pub fn application_code(&self, tender: &str) -> Option<String> {
        self.state().application_codes.get(tender).cloned()
    }

    pub fn entered(&self) -> Vec<(String, String)> {
        self.state().entered.clone()
    }

    /// Names of the write operations in the order they ran.
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn organization_unit(&self, rut: &str) -> Result<Option<OrganizationUnit>> {
        Ok(self.state().units.get(rut).cloned())
    }

    async fn tender_item_count(&self, tender: &str, _published: &str) -> Result<u32> {
        Ok(self.state().item_counts.get(tender).copied().unwrap_or(0))
    }

    async fn record_application_code(&self, tender: &str, code: &str) -> Result<()> {
        let mut state = self.state();
        state
            .application_codes
            .insert(tender.to_string(), code.to_string());
        state.writes.push("record_application_code".into());
        Ok(())
    }

    async fn line_items(&self, tender: &str, _rut_user: &str) -> Result<Vec<LineItem>> {
        Ok(self.state().items.get(tender).cloned().unwrap_or_default())
    }

    async fn company(&self, rut: &str) -> Result<Option<Company>> {
        Ok(self.state().companies.get(rut).cloned())
    }

    async fn pending_documents(&self, company_id: i64, tender: &str) -> Result<Vec<DocumentEntry>> {
        Ok(self
            .state()
            .documents
            .get(&(company_id, tender.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn record_pending_permission(&self, pending: &PendingPermission) -> Result<()> {
        let mut state = self.state();
        state.pending.push(pending.clone());
        state.writes.push("record_pending_permission".into());
        Ok(())
    }

    async fn insert_submission(&self, record: &SubmissionRecord) -> Result<()> {
        let mut state = self.state();
        state.submissions.push(record.clone());
        state.writes.push("insert_submission".into());
        Ok(())
    }

    async fn mark_documents_submitted(
        &self,
        tender: &str,
        company_id: i64,
        _offer_name: &str,
        _at: NaiveDateTime,
    ) -> Result<u64> {
        let mut state = self.state();
        state.writes.push("mark_documents_submitted".into());
        Ok(state
            .documents
            .get(&(company_id, tender.to_string()))
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn mark_documents_posted(
        &self,
        tender: &str,
        company_id: i64,
        _offer_name: &str,
        _at: NaiveDateTime,
    ) -> Result<u64> {
        let mut state = self.state();
        state.writes.push("mark_documents_posted".into());
        Ok(state
            .documents
            .remove(&(company_id, tender.to_string()))
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn mark_tender_entered(&self, tender: &str, rut_client: &str) -> Result<()> {
        let mut state = self.state();
        state.entered.push((tender.to_string(), rut_client.to_string()));
        state.writes.push("mark_tender_entered".into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentKind;

    #[tokio::test]
    async fn test_posting_clears_pending_documents() {
        let store = MemoryStore::new().with_documents(
            4,
            "1057-22-LE24",
            vec![DocumentEntry {
                file_name: "anexo.pdf".into(),
                kind: DocumentKind::Administrative,
            }],
        );
        let at = chrono::NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        assert_eq!(store.pending_documents(4, "1057-22-LE24").await.unwrap().len(), 1);
        assert_eq!(store.mark_documents_submitted("1057-22-LE24", 4, "o", at).await.unwrap(), 1);
        assert_eq!(store.mark_documents_posted("1057-22-LE24", 4, "o", at).await.unwrap(), 1);
        assert!(store.pending_documents(4, "1057-22-LE24").await.unwrap().is_empty());
        assert_eq!(
            store.writes(),
            vec!["mark_documents_submitted", "mark_documents_posted"]
        );
    }
}
