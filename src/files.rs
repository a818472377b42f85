use crate::errors::{DriverError, Result};
use crate::store::{DocumentEntry, OrganizationUnit};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Documents live at `<root>/<company>/<tender>/<kind folder>/<file>`.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    root: PathBuf,
}

impl DocumentRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tender_dir(&self, company: &str, tender: &str) -> PathBuf {
        self.root.join(company).join(tender)
    }

    pub fn document_path(&self, company: &str, tender: &str, document: &DocumentEntry) -> PathBuf {
        self.tender_dir(company, tender)
            .join(document.kind.folder())
            .join(&document.file_name)
    }

    /// Size in megabytes (10^6 bytes), two decimals.
    pub async fn size_mb(path: &Path) -> Result<f64> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            DriverError::Filesystem(format!("{}: {}", path.display(), e))
        })?;
        Ok((metadata.len() as f64 / 1_000_000.0 * 100.0).round() / 100.0)
    }

    /// Renames the tender folder to `<tender>_<offer>_<ddmmYYYY_HHMMSS>` so
    /// the next run does not pick the same documents up again.
    pub async fn rename_after_submission(
        &self,
        company: &str,
        tender: &str,
        offer_name: &str,
        at: NaiveDateTime,
    ) -> Result<PathBuf> {
        let current = self.tender_dir(company, tender);
        let renamed = self.root.join(company).join(format!(
            "{}_{}{}",
            tender,
            offer_name,
            at.format("_%d%m%Y_%H%M%S")
        ));
        tokio::fs::rename(&current, &renamed).await.map_err(|e| {
            DriverError::Filesystem(format!(
                "renaming {} to {}: {}",
                current.display(),
                renamed.display(),
                e
            ))
        })?;
        info!(from = %current.display(), to = %renamed.display(), "document folder archived");
        Ok(renamed)
    }
}

/// How long to wait for the portal to acknowledge an upload of `size_mb`:
/// the confirmation timeout and the pause after it.
pub fn upload_wait(size_mb: f64) -> (Duration, Duration) {
    if size_mb > 1.0 {
        let confirm = (size_mb * 2.0).min(120.0);
        let settle = size_mb.min(20.0);
        (Duration::from_secs_f64(confirm), Duration::from_secs_f64(settle))
    } else {
        (Duration::from_secs(10), Duration::from_secs(1))
    }
}

#[derive(Debug, Deserialize)]
struct CachedUser {
    id: i64,
    #[serde(default)]
    lugar_unidad: Option<String>,
    #[serde(default)]
    nombre_unidad: Option<String>,
}

/// JSON export of portal users, used by the login-only command.
pub struct UserDirectory;

impl UserDirectory {
    pub async fn unit_for(path: &Path, user_id: i64) -> Result<Option<OrganizationUnit>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "user cache unavailable");
                return Ok(None);
            }
        };
        let users: Vec<CachedUser> = serde_json::from_str(&raw)?;
        Ok(users
            .into_iter()
            .find(|user| user.id == user_id)
            .map(|user| OrganizationUnit {
                position: user.lugar_unidad.unwrap_or_default(),
                name: user.nombre_unidad.unwrap_or_default(),
            }))
    }
}
