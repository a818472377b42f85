use crate::core::config::ClientPolicy;
use crate::errors::{DriverError, Result};
use crate::store::{Company, DocumentEntry};
use chrono::NaiveDateTime;
use std::path::PathBuf;

/// Which RUT signs the sworn declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RutKind {
    /// The representative offered in the dropdown.
    Representative,
    /// A RUT typed in through the "Otro RUT" option.
    Other,
}

impl RutKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "representante" | "representative" => Ok(RutKind::Representative),
            "otro" | "other" => Ok(RutKind::Other),
            other => Err(DriverError::InvalidArguments(format!(
                "unknown RUT kind '{}'",
                other
            ))),
        }
    }
}

/// Parses the `si`/`no` flags the caller passes.
pub fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "si" | "sí" | "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => Err(DriverError::InvalidArguments(format!(
            "expected si/no, got '{}'",
            other
        ))),
    }
}

/// Everything a submission run is told by its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct JobParams {
    pub rut_user: String,
    pub rut_client: String,
    pub tender: String,
    /// Publication date as stored alongside the tender.
    pub published: String,
    pub mp_user: String,
    pub mp_password: String,
    pub offer_name: String,
    pub offer_description: String,
    pub access: String,
    pub joint_offer: bool,
    pub representative_rut: String,
    pub idp_user: String,
    pub idp_password: String,
    pub sign_with_idp: bool,
    pub rut_kind: RutKind,
    /// The client still has to grant the signing permission; the run stops
    /// at the declaration and records the request instead.
    pub pending_permission: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginParams {
    pub user: String,
    pub password: String,
    pub access: String,
    pub company_id: i64,
    pub user_id: i64,
}

/// Run-scoped state gathered as the workflow advances.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job: JobParams,
    pub policy: ClientPolicy,
    pub artifacts_dir: PathBuf,
    pub company: Option<Company>,
    pub application_code: Option<String>,
    pub documents: Vec<DocumentEntry>,
    /// Names the portal lists as attached after the upload step.
    pub attached_names: Vec<String>,
    pub submitted_at: Option<NaiveDateTime>,
}

impl RunContext {
    pub fn new(job: JobParams, policy: ClientPolicy, artifacts_dir: PathBuf) -> Self {
        Self {
            job,
            policy,
            artifacts_dir,
            company: None,
            application_code: None,
            documents: Vec::new(),
            attached_names: Vec::new(),
            submitted_at: None,
        }
    }

    pub fn company_name(&self) -> Result<&str> {
        self.company
            .as_ref()
            .map(|c| c.name.as_str())
            .ok_or_else(|| DriverError::RecordNotFound(format!("company {}", self.job.rut_user)))
    }

    pub fn company_id(&self) -> Result<i64> {
        self.company
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| DriverError::RecordNotFound(format!("company {}", self.job.rut_user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("si").unwrap());
        assert!(parse_flag("SÍ").unwrap());
        assert!(!parse_flag("no").unwrap());
        assert!(matches!(
            parse_flag("quizas"),
            Err(DriverError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_rut_kind_parsing() {
        assert_eq!(RutKind::parse("representante").unwrap(), RutKind::Representative);
        assert_eq!(RutKind::parse("Otro").unwrap(), RutKind::Other);
        assert!(RutKind::parse("").is_err());
    }
}
