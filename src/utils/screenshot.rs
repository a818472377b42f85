use crate::browser::DriverSession;
use crate::core::BrowserTrait;
use crate::errors::Result;
use std::path::Path;

pub struct ScreenshotManager;

impl ScreenshotManager {
    pub async fn save_to_file<B: BrowserTrait>(
        session: &DriverSession<B>,
        file_path: &Path,
    ) -> Result<()> {
        let screenshot_bytes = session.screenshot().await?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(file_path, screenshot_bytes).await?;
        Ok(())
    }

    /// `<label>_<YYYYmmdd_HHMMSS>.png`, with path separators stripped.
    pub fn artifact_name(label: &str) -> String {
        let clean: String = label
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}_{}.png", clean, chrono::Local::now().format("%Y%m%d_%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_is_flat() {
        let name = ScreenshotManager::artifact_name("page 2/retry");
        assert!(name.starts_with("page_2_retry_"));
        assert!(name.ends_with(".png"));
        assert!(!name.contains('/'));
    }
}
