//! Relational store the workflow reads its inputs from and records
//! results into. Each write commits on its own; a run that dies between
//! two checkpoints leaves the earlier ones in place.

pub mod memory;
pub mod mysql;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationUnit {
    pub position: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based position of the item within the tender.
    pub correlative: u32,
    pub unit_price: String,
    pub description: String,
    pub glosa: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Administrative,
    Technical,
    Economic,
}

impl DocumentKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "administrativo" => Some(DocumentKind::Administrative),
            "tecnico" | "técnico" => Some(DocumentKind::Technical),
            "economico" | "económico" => Some(DocumentKind::Economic),
            _ => None,
        }
    }

    /// Folder holding documents of this kind under the tender directory.
    pub fn folder(&self) -> &'static str {
        match self {
            DocumentKind::Administrative => "administrativos",
            DocumentKind::Technical => "tecnicos",
            DocumentKind::Economic => "economicos",
        }
    }

    /// Suffix of the portal's upload widgets for this kind.
    pub fn widget_suffix(&self) -> &'static str {
        match self {
            DocumentKind::Administrative => "admin",
            DocumentKind::Technical => "tec",
            DocumentKind::Economic => "eco",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub file_name: String,
    pub kind: DocumentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPermission {
    pub tender: String,
    pub rut_user: String,
    pub rut_client: String,
}

/// One row per submitted line item, read back from the final review page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub acquisition_number: String,
    pub name: String,
    pub state: String,
    pub currency: String,
    pub buyer: String,
    pub buyer_notes: String,
    pub contact: String,
    pub phones: String,
    pub published_at: String,
    pub closes_at: String,
    pub opens_at: String,
    pub user_name: String,
    pub user_rut: String,
    pub social_reason: String,
    pub offer_name: String,
    pub offer_description: String,
    pub offered_at: String,
    pub offer_total: String,
    pub item: String,
    pub onu: String,
    pub buyer_spec: String,
    pub quantity: String,
    pub offered_quantity: String,
    pub supplier_spec: String,
    pub unit_price: String,
    pub item_total: String,
    pub link: String,
    pub application_link: String,
    pub rut_client: String,
    pub rut_user: String,
    pub access: String,
    pub status: i32,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn organization_unit(&self, rut: &str) -> Result<Option<OrganizationUnit>>;

    /// Number of line items published for the tender on that date.
    async fn tender_item_count(&self, tender: &str, published: &str) -> Result<u32>;

    async fn record_application_code(&self, tender: &str, code: &str) -> Result<()>;

    /// Items with their price and glosa, ordered by correlative.
    async fn line_items(&self, tender: &str, rut_user: &str) -> Result<Vec<LineItem>>;

    async fn company(&self, rut: &str) -> Result<Option<Company>>;

    /// Documents still waiting to be attached to this tender's offer.
    async fn pending_documents(&self, company_id: i64, tender: &str) -> Result<Vec<DocumentEntry>>;

    async fn record_pending_permission(&self, pending: &PendingPermission) -> Result<()>;

    async fn insert_submission(&self, record: &SubmissionRecord) -> Result<()>;

    async fn mark_documents_submitted(
        &self,
        tender: &str,
        company_id: i64,
        offer_name: &str,
        at: NaiveDateTime,
    ) -> Result<u64>;

    async fn mark_documents_posted(
        &self,
        tender: &str,
        company_id: i64,
        offer_name: &str,
        at: NaiveDateTime,
    ) -> Result<u64>;

    async fn mark_tender_entered(&self, tender: &str, rut_client: &str) -> Result<()>;
}
