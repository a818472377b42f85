use crate::errors::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Checkpoint phases as shown to whoever polls the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    LoggedIn,
    OfferDescribed,
    ItemsLoaded,
    Signed,
    DocumentsLoaded,
    Finalizing,
    Confirmed,
    CredentialsRejected,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "Iniciando Proceso...",
            Phase::LoggedIn => "Login exitoso. Procediendo a la descripción de la oferta...",
            Phase::OfferDescribed => {
                "Descripción de la oferta completada. Procediendo a la carga de productos..."
            }
            Phase::ItemsLoaded => {
                "Carga de productos completada. Procediendo a la firma de la declaración jurada..."
            }
            Phase::Signed => "Firma completada. Procediendo a la carga de documentos...",
            Phase::DocumentsLoaded => "Carga de documentos completada. Finalizando oferta...",
            Phase::Finalizing => "Finalizando oferta en Mercado Público...",
            Phase::Confirmed => "Oferta finalizada y confirmada exitosamente",
            Phase::CredentialsRejected => "Error: Credenciales incorrectas o problema del servidor",
        }
    }
}

/// `status_<tender>.txt`, holding only the latest phase.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn for_tender(dir: &Path, tender: &str) -> Self {
        Self {
            path: dir.join(format!("status_{}.txt", tender)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file's content with `text`. Readers never see a
    /// half-written file: the text goes to a sibling first and is renamed over.
    pub async fn write(&self, text: &str) -> Result<()> {
        let staging = self.path.with_extension("txt.tmp");
        tokio::fs::write(&staging, text.as_bytes()).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), status = text, "status updated");
        Ok(())
    }

    pub async fn set(&self, phase: Phase) -> Result<()> {
        self.write(phase.as_str()).await
    }

    /// Like [`set`](Self::set) but only logs failures; a status file that
    /// cannot be written must not stop a submission.
    pub async fn checkpoint(&self, phase: Phase) {
        if let Err(e) = self.set(phase).await {
            warn!(error = %e, path = %self.path.display(), "could not write status file");
        }
    }

    pub async fn read(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_phase_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::for_tender(dir.path(), "1057-22-LE24");

        status.set(Phase::LoggedIn).await.unwrap();
        let once = tokio::fs::read(status.path()).await.unwrap();
        status.set(Phase::LoggedIn).await.unwrap();
        let twice = tokio::fs::read(status.path()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, Phase::LoggedIn.as_str().as_bytes());
    }

    #[tokio::test]
    async fn test_overwrites_not_appends() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::for_tender(dir.path(), "1057-22-LE24");
        assert!(status.path().ends_with("status_1057-22-LE24.txt"));

        status.set(Phase::Starting).await.unwrap();
        status.set(Phase::Confirmed).await.unwrap();
        assert_eq!(status.read().await.unwrap(), Phase::Confirmed.as_str());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
