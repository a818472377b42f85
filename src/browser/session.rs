use crate::actions::{ActionKind, Mechanism};
use crate::core::{BrowserTrait, Config};
use crate::dom::{ElementState, Selector};
use crate::errors::{DriverError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The one browsing session a run owns: a browser, the tab being driven
/// and the configuration every primitive reads its timeouts from.
pub struct DriverSession<B: BrowserTrait> {
    browser: Arc<B>,
    tab: Option<B::TabHandle>,
    config: Arc<Config>,
    session_id: String,
}

impl<B: BrowserTrait> DriverSession<B> {
    pub async fn new(mut browser: B, config: Config) -> Result<Self> {
        browser.launch(&config).await?;
        let tab = browser.new_tab().await?;
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(session_id = %session_id, "browser session started");

        Ok(Self {
            browser: Arc::new(browser),
            tab: Some(tab),
            config: Arc::new(config),
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn browser(&self) -> &B {
        self.browser.as_ref()
    }

    pub fn tab(&self) -> Result<&B::TabHandle> {
        self.tab.as_ref().ok_or(DriverError::NoActiveTab)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.browser.navigate(self.tab()?, url).await
    }

    pub async fn reload(&self) -> Result<()> {
        self.browser.reload(self.tab()?).await
    }

    pub async fn execute_script(&self, script: &str) -> Result<Value> {
        self.browser.execute_script(self.tab()?, script).await
    }

    pub async fn current_url(&self) -> Result<String> {
        self.browser.get_url(self.tab()?).await
    }

    pub async fn title(&self) -> Result<String> {
        self.browser.get_title(self.tab()?).await
    }

    pub async fn probe(&self, selector: &Selector) -> Result<Option<ElementState>> {
        self.browser.probe(self.tab()?, selector).await
    }

    pub async fn interact(
        &self,
        selector: &Selector,
        action: &ActionKind,
        mechanism: Mechanism,
    ) -> Result<()> {
        self.browser
            .interact(self.tab()?, selector, action, mechanism)
            .await
    }

    pub async fn set_input_files(&self, selector: &Selector, files: &[PathBuf]) -> Result<()> {
        self.browser.set_input_files(self.tab()?, selector, files).await
    }

    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.browser.press_key(self.tab()?, key).await
    }

    pub async fn pending_dialog(&self) -> Result<Option<String>> {
        self.browser.pending_dialog(self.tab()?).await
    }

    pub async fn handle_dialog(&self, accept: bool) -> Result<()> {
        self.browser.handle_dialog(self.tab()?, accept).await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.browser.take_screenshot(self.tab()?).await
    }

    /// Best-effort debug capture; failures are logged, never raised.
    pub async fn capture(&self, dir: &Path, name: &str) {
        let path = dir.join(name);
        match crate::utils::ScreenshotManager::save_to_file(self, &path).await {
            Ok(()) => debug!(path = %path.display(), "screenshot saved"),
            Err(e) => warn!(error = %e, path = %path.display(), "screenshot failed"),
        }
    }

    pub async fn tab_count(&self) -> Result<usize> {
        Ok(self.browser.tabs().await?.len())
    }

    /// Waits for the page to open a window beyond the `known` ones, then
    /// drives the newest. Returns the tab that was active before.
    pub async fn switch_to_new_tab(&mut self, known: usize, timeout: Duration) -> Result<B::TabHandle> {
        let previous = self.tab()?.clone();
        let poll = self.config.timeouts.poll_interval();
        let start = tokio::time::Instant::now();

        loop {
            let tabs = self.browser.tabs().await?;
            if tabs.len() > known {
                if let Some(newest) = tabs.last() {
                    self.tab = Some(newest.clone());
                    info!(open_tabs = tabs.len(), "switched to new window");
                    return Ok(previous);
                }
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::NavigationFailed(format!(
                    "no new window opened within {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub async fn close_tab(&self, tab: &B::TabHandle) -> Result<()> {
        self.browser.close_tab(tab).await
    }

    /// Closes the tab being driven and drives `next` from now on. The switch
    /// happens even when closing fails, e.g. because the page closed itself.
    pub async fn close_current_and_use(&mut self, next: B::TabHandle) -> Result<()> {
        let current = self.tab()?.clone();
        let closed = self.browser.close_tab(&current).await;
        self.tab = Some(next);
        closed
    }

    pub async fn close(mut self) -> Result<()> {
        self.tab = None;
        match Arc::get_mut(&mut self.browser) {
            Some(browser) => browser.close().await,
            None => Ok(()),
        }
    }
}
