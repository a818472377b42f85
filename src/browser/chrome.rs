use crate::actions::{ActionKind, Mechanism};
use crate::core::{BrowserTrait, Config};
use crate::dom::selector::js_quote;
use crate::dom::{Selector, Strategy};
use crate::errors::{DriverError, Result};
use async_trait::async_trait;
use headless_chrome::browser::tab::element::Element;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Page, DOM};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

type DialogSlot = Arc<Mutex<Option<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A Chrome tab plus the message of the native dialog it is showing, which
/// the DevTools protocol only announces as an event.
#[derive(Clone)]
pub struct ChromeTab {
    tab: Arc<Tab>,
    dialog: DialogSlot,
}

impl ChromeTab {
    fn watch(tab: Arc<Tab>) -> Result<Self> {
        let dialog: DialogSlot = Arc::new(Mutex::new(None));
        let slot = dialog.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::PageJavascriptDialogOpening(opening) => {
                *lock(&slot) = Some(opening.params.message.clone());
            }
            Event::PageJavascriptDialogClosed(_) => {
                *lock(&slot) = None;
            }
            _ => {}
        }))
        .map_err(|e| DriverError::TabCreationFailed(e.to_string()))?;
        Ok(Self { tab, dialog })
    }
}

/// Chrome browser implementation
pub struct ChromeBrowser {
    browser: Option<Browser>,
    watched: Mutex<HashMap<String, ChromeTab>>,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self {
            browser: None,
            watched: Mutex::new(HashMap::new()),
        }
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser.as_ref().ok_or(DriverError::BrowserNotLaunched)
    }

    fn track(&self, tab: Arc<Tab>) -> Result<ChromeTab> {
        let id = tab.get_target_id().to_string();
        let mut watched = lock(&self.watched);
        if let Some(existing) = watched.get(&id) {
            return Ok(existing.clone());
        }
        let handle = ChromeTab::watch(tab)?;
        watched.insert(id, handle.clone());
        Ok(handle)
    }

    fn find_native<'a>(tab: &'a Tab, selector: &Selector) -> Result<Element<'a>> {
        if selector.frame.is_some() {
            return Err(DriverError::JavaScriptFailed(
                "native lookup cannot enter frames".to_string(),
            ));
        }
        let found = match &selector.strategy {
            Strategy::XPath(xpath) => tab.find_element_by_xpath(xpath),
            other => tab.find_element(&other.as_css().unwrap_or_default()),
        };
        found.map_err(|_| DriverError::ElementNotFound(selector.to_string()))
    }

    fn native(tab: &Tab, selector: &Selector, action: &ActionKind) -> Result<()> {
        let element = Self::find_native(tab, selector)?;
        let outcome = match action {
            ActionKind::Click => element.click().map(|_| ()),
            ActionKind::Type(text) => element
                .click()
                .and_then(|_| tab.press_key_with_modifiers("a", Some(&[ModifierKey::Ctrl])))
                .and_then(|t| t.type_str(text))
                .map(|_| ()),
            ActionKind::Clear => element
                .call_js_fn("function() { this.value = ''; }", vec![], false)
                .map(|_| ()),
            ActionKind::Select(value) => element
                .call_js_fn(
                    "function(v) { this.value = v; this.dispatchEvent(new Event('change', { bubbles: true })); }",
                    vec![Value::String(value.clone())],
                    false,
                )
                .map(|_| ()),
        };
        outcome.map_err(|e| DriverError::JavaScriptFailed(e.to_string()))
    }

    fn script_for(selector: &Selector, action: &ActionKind) -> String {
        let body = match action {
            ActionKind::Click => "el.click();".to_string(),
            ActionKind::Type(text) => format!(
                "el.focus(); el.value = '{}'; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
                js_quote(text)
            ),
            ActionKind::Clear => "el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true }));"
                .to_string(),
            ActionKind::Select(value) => format!(
                "el.value = '{}'; el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
                js_quote(value)
            ),
        };
        format!(
            r#"(function() {{ const el = {}; if (!el) return false; {} return true; }})()"#,
            selector.resolve_js(),
            body
        )
    }

    /// Viewport coordinates of the element's centre, frame offset included.
    fn midpoint_script(selector: &Selector) -> String {
        let frame_offset = match &selector.frame {
            Some(frame) => format!(
                "const f = document.getElementById('{}'); const o = f ? f.getBoundingClientRect() : {{ left: 0, top: 0 }};",
                js_quote(frame)
            ),
            None => "const o = { left: 0, top: 0 };".to_string(),
        };
        format!(
            r#"
            (function() {{
                const el = {};
                if (!el) return null;
                {}
                const r = el.getBoundingClientRect();
                if (r.width === 0 || r.height === 0) return null;
                return {{ x: o.left + r.left + r.width / 2, y: o.top + r.top + r.height / 2 }};
            }})()
            "#,
            selector.resolve_js(),
            frame_offset
        )
    }

    async fn pointer(&self, tab: &ChromeTab, selector: &Selector, action: &ActionKind) -> Result<()> {
        let at = self
            .execute_script(tab, &Self::midpoint_script(selector))
            .await?;
        let (Some(x), Some(y)) = (
            at.get("x").and_then(Value::as_f64),
            at.get("y").and_then(Value::as_f64),
        ) else {
            return Err(DriverError::ElementNotFound(selector.to_string()));
        };
        let point = Point { x, y };
        let tab = &tab.tab;
        let outcome = match action {
            ActionKind::Click => tab
                .move_mouse_to_point(point)
                .and_then(|t| t.click_point(point))
                .map(|_| ()),
            ActionKind::Type(text) => tab
                .click_point(point)
                .and_then(|t| t.press_key_with_modifiers("a", Some(&[ModifierKey::Ctrl])))
                .and_then(|t| t.type_str(text))
                .map(|_| ()),
            other => {
                return Err(DriverError::JavaScriptFailed(format!(
                    "pointer mechanism cannot {}",
                    other
                )))
            }
        };
        outcome.map_err(|e| DriverError::JavaScriptFailed(e.to_string()))
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type TabHandle = ChromeTab;

    async fn launch(&mut self, config: &Config) -> Result<()> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.browser.viewport.width, config.browser.viewport.height
        );

        let user_agent_arg = config
            .browser
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-popup-blocking"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if config.browser.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        for arg in &config.browser.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.browser.headless)
            .idle_browser_timeout(std::time::Duration::from_millis(config.browser.timeout_ms))
            .args(args)
            .build()
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        self.browser = Some(browser);
        Ok(())
    }

    async fn new_tab(&self) -> Result<Self::TabHandle> {
        let tab = self
            .browser()?
            .new_tab()
            .map_err(|e| DriverError::TabCreationFailed(e.to_string()))?;
        self.track(tab)
    }

    async fn tabs(&self) -> Result<Vec<Self::TabHandle>> {
        let open: Vec<Arc<Tab>> = {
            let tabs = self.browser()?.get_tabs();
            let guard = lock(tabs);
            guard.iter().cloned().collect()
        };
        open.into_iter().map(|tab| self.track(tab)).collect()
    }

    async fn close_tab(&self, tab: &Self::TabHandle) -> Result<()> {
        lock(&self.watched).remove(&tab.tab.get_target_id().to_string());
        tab.tab
            .close(true)
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()> {
        tab.tab
            .navigate_to(url)
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;

        tab.tab
            .wait_until_navigated()
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn reload(&self, tab: &Self::TabHandle) -> Result<()> {
        tab.tab
            .reload(false, None)
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value> {
        let result = tab
            .tab
            .evaluate(script, false)
            .map_err(|e| DriverError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn take_screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>> {
        let screenshot = tab
            .tab
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| DriverError::ScreenshotFailed(e.to_string()))?;

        Ok(screenshot)
    }

    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.tab.get_url())
    }

    async fn get_title(&self, tab: &Self::TabHandle) -> Result<String> {
        let result = self.execute_script(tab, "document.title").await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    async fn interact(
        &self,
        tab: &Self::TabHandle,
        selector: &Selector,
        action: &ActionKind,
        mechanism: Mechanism,
    ) -> Result<()> {
        debug!(%selector, %action, %mechanism, "interacting");
        match mechanism {
            Mechanism::Native => Self::native(&tab.tab, selector, action),
            Mechanism::Script => {
                let done = self
                    .execute_script(tab, &Self::script_for(selector, action))
                    .await?;
                if done == Value::Bool(true) {
                    Ok(())
                } else {
                    Err(DriverError::StaleElement(selector.to_string()))
                }
            }
            Mechanism::Pointer => self.pointer(tab, selector, action).await,
        }
    }

    async fn set_input_files(
        &self,
        tab: &Self::TabHandle,
        selector: &Selector,
        files: &[PathBuf],
    ) -> Result<()> {
        // Resolving through script keeps frame-scoped inputs reachable.
        let remote = tab
            .tab
            .evaluate(&selector.resolve_js(), false)
            .map_err(|e| DriverError::JavaScriptFailed(e.to_string()))?;
        let object_id = remote
            .object_id
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))?;
        tab.tab
            .call_method(DOM::SetFileInputFiles {
                files: files.iter().map(|f| f.display().to_string()).collect(),
                node_id: None,
                backend_node_id: None,
                object_id: Some(object_id),
            })
            .map_err(|e| DriverError::JavaScriptFailed(e.to_string()))?;
        Ok(())
    }

    async fn press_key(&self, tab: &Self::TabHandle, key: &str) -> Result<()> {
        tab.tab
            .press_key(key)
            .map_err(|e| DriverError::JavaScriptFailed(e.to_string()))?;
        Ok(())
    }

    async fn pending_dialog(&self, tab: &Self::TabHandle) -> Result<Option<String>> {
        Ok(lock(&tab.dialog).clone())
    }

    async fn handle_dialog(&self, tab: &Self::TabHandle, accept: bool) -> Result<()> {
        tab.tab
            .call_method(Page::HandleJavaScriptDialog {
                accept,
                prompt_text: None,
            })
            .map_err(|e| DriverError::DialogFailed(e.to_string()))?;
        if lock(&tab.dialog).take().is_none() {
            warn!("dialog handled without an opening event");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.watched).clear();
        self.browser = None;
        Ok(())
    }
}
