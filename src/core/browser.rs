use crate::actions::{ActionKind, Mechanism};
use crate::dom::{ElementState, Selector};
use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type TabHandle: Clone + Send + Sync;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &crate::core::Config) -> Result<()>;

    /// Create a new tab/page
    async fn new_tab(&self) -> Result<Self::TabHandle>;

    /// Every open tab, oldest first. Windows opened by the page show up here.
    async fn tabs(&self) -> Result<Vec<Self::TabHandle>>;

    async fn close_tab(&self, tab: &Self::TabHandle) -> Result<()>;

    /// Navigate to a URL
    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()>;

    async fn reload(&self, tab: &Self::TabHandle) -> Result<()>;

    /// Execute JavaScript in the browser
    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value>;

    /// Take a screenshot
    async fn take_screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>>;

    /// Get current URL
    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Get page title
    async fn get_title(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Looks the selector up once. `None` means no match right now.
    async fn probe(&self, tab: &Self::TabHandle, selector: &Selector) -> Result<Option<ElementState>> {
        let value = self.execute_script(tab, &selector.probe_js()).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Performs `action` through exactly one mechanism; no fallback here.
    async fn interact(
        &self,
        tab: &Self::TabHandle,
        selector: &Selector,
        action: &ActionKind,
        mechanism: Mechanism,
    ) -> Result<()>;

    /// Attach local files to an `<input type=file>`.
    async fn set_input_files(
        &self,
        tab: &Self::TabHandle,
        selector: &Selector,
        files: &[PathBuf],
    ) -> Result<()>;

    /// Send a single key press ("Tab", "Enter") to the focused element.
    async fn press_key(&self, tab: &Self::TabHandle, key: &str) -> Result<()>;

    /// Message of the native dialog currently open on the tab, if any.
    async fn pending_dialog(&self, tab: &Self::TabHandle) -> Result<Option<String>>;

    async fn handle_dialog(&self, tab: &Self::TabHandle, accept: bool) -> Result<()>;

    /// Check if browser is still running
    fn is_running(&self) -> bool;

    /// Close the browser
    async fn close(&mut self) -> Result<()>;
}
