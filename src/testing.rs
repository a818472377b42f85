//! In-memory browser for exercising the driver without Chrome.
//!
//! A [`ScriptedBrowser`] holds a flat page model: which selectors match,
//! what scripts return and what each interaction changes. Clones share the
//! same page, so a test keeps one handle for inspection while the session
//! owns another.

use crate::actions::{ActionKind, Mechanism};
use crate::core::{BrowserTrait, Config};
use crate::dom::{ElementState, Selector};
use crate::errors::{DriverError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// A change to the page model, fired by an interaction, script or navigation.
#[derive(Debug, Clone)]
pub enum Effect {
    Show(Selector),
    Hide(Selector),
    /// Replaces the text a probe of the selector reports.
    Text(Selector, String),
    Dialog(String),
    Url(String),
    Title(String),
    OpenTab,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub selector: Selector,
    pub action: ActionKind,
    pub mechanism: Mechanism,
}

#[derive(Debug, Default)]
struct Page {
    elements: HashMap<Selector, ElementState>,
    hidden_until: HashMap<Selector, u32>,
    failures: Vec<(Selector, Mechanism, String)>,
    stale: HashSet<Selector>,
    interact_effects: Vec<(Selector, Effect)>,
    script_effects: Vec<(String, Effect)>,
    navigate_effects: Vec<(String, Effect)>,
    key_effects: Vec<(String, Effect)>,
    script_rules: Vec<(String, Value)>,
    failing_scripts: Vec<(String, String)>,
    dialogs: VecDeque<String>,
    dialogs_broken: bool,
    url: String,
    title: String,
    values: HashMap<Selector, String>,
    tabs: Vec<usize>,
    next_tab: usize,

    probes: Vec<String>,
    interactions: Vec<Interaction>,
    scripts: Vec<String>,
    keys: Vec<String>,
    uploads: Vec<(Selector, Vec<PathBuf>)>,
    navigations: Vec<String>,
}

impl Page {
    fn show(&mut self, selector: Selector) {
        self.hidden_until.remove(&selector);
        self.elements.insert(
            selector,
            ElementState {
                visible: true,
                enabled: true,
                ..Default::default()
            },
        );
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Show(selector) => self.show(selector),
            Effect::Hide(selector) => {
                self.elements.remove(&selector);
            }
            Effect::Text(selector, text) => {
                if let Some(state) = self.elements.get_mut(&selector) {
                    state.text = text;
                }
            }
            Effect::Dialog(message) => self.dialogs.push_back(message),
            Effect::Url(url) => self.url = url,
            Effect::Title(title) => self.title = title,
            Effect::OpenTab => {
                self.next_tab += 1;
                let id = self.next_tab;
                self.tabs.push(id);
            }
        }
    }

    fn present(&self, selector: &Selector) -> bool {
        self.elements.contains_key(selector) && !self.hidden_until.contains_key(selector)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedBrowser {
    page: Arc<Mutex<Page>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn page(&self) -> MutexGuard<'_, Page> {
        self.page.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Document complete, no jQuery, every page function defined.
    pub fn ready_page(self) -> Self {
        self.script_returns("readyState", Value::Bool(true))
            .script_returns("jQuery", Value::Null)
            .script_returns("missingSymbols", Value::Array(Vec::new()))
    }

    pub fn element(self, selector: Selector) -> Self {
        self.page().show(selector);
        self
    }

    pub fn hidden_element(self, selector: Selector) -> Self {
        self.element_state(
            selector,
            ElementState {
                visible: false,
                enabled: true,
                ..Default::default()
            },
        )
    }

    pub fn element_state(self, selector: Selector, state: ElementState) -> Self {
        self.page().elements.insert(selector, state);
        self
    }

    /// Visible element whose text a probe reports.
    pub fn element_text(self, selector: Selector, text: &str) -> Self {
        self.element_state(
            selector,
            ElementState {
                visible: true,
                enabled: true,
                tag: String::new(),
                text: text.to_string(),
            },
        )
    }

    /// Element that misses the first `misses` probes.
    pub fn appear_after(self, selector: Selector, misses: u32) -> Self {
        {
            let mut page = self.page();
            page.show(selector.clone());
            page.hidden_until.insert(selector, misses);
        }
        self
    }

    /// Field already holding `value`, as a form reloaded with saved input.
    pub fn value(self, selector: Selector, value: &str) -> Self {
        self.page().values.insert(selector, value.to_string());
        self
    }

    pub fn fail(self, selector: Selector, mechanism: Mechanism, message: &str) -> Self {
        self.page()
            .failures
            .push((selector, mechanism, message.to_string()));
        self
    }

    /// The next interaction with `selector` reports a stale match.
    pub fn stale_once(self, selector: Selector) -> Self {
        self.page().stale.insert(selector);
        self
    }

    pub fn on_interact(self, selector: Selector, effect: Effect) -> Self {
        self.page().interact_effects.push((selector, effect));
        self
    }

    pub fn on_script(self, fragment: &str, effect: Effect) -> Self {
        self.page()
            .script_effects
            .push((fragment.to_string(), effect));
        self
    }

    pub fn on_navigate(self, fragment: &str, effect: Effect) -> Self {
        self.page()
            .navigate_effects
            .push((fragment.to_string(), effect));
        self
    }

    /// Every press of `key` fires `effect`.
    pub fn on_key(self, key: &str, effect: Effect) -> Self {
        self.page().key_effects.push((key.to_string(), effect));
        self
    }

    /// Scripts containing `fragment` evaluate to `value`. Later rules win.
    pub fn script_returns(self, fragment: &str, value: Value) -> Self {
        self.page()
            .script_rules
            .push((fragment.to_string(), value));
        self
    }

    pub fn script_fails(self, fragment: &str, message: &str) -> Self {
        self.page()
            .failing_scripts
            .push((fragment.to_string(), message.to_string()));
        self
    }

    pub fn queue_dialog(self, message: &str) -> Self {
        self.page().dialogs.push_back(message.to_string());
        self
    }

    /// Every dialog call errors, as when the page has already navigated away.
    pub fn broken_dialogs(self) -> Self {
        self.page().dialogs_broken = true;
        self
    }

    pub fn url(self, url: &str) -> Self {
        self.page().url = url.to_string();
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.page().title = title.to_string();
        self
    }

    pub fn probes(&self) -> Vec<String> {
        self.page().probes.clone()
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.page().interactions.clone()
    }

    pub fn interactions_with(&self, selector: &Selector) -> Vec<Interaction> {
        self.page()
            .interactions
            .iter()
            .filter(|i| &i.selector == selector)
            .cloned()
            .collect()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.page().scripts.clone()
    }

    pub fn scripts_matching(&self, fragment: &str) -> usize {
        self.page()
            .scripts
            .iter()
            .filter(|s| s.contains(fragment))
            .count()
    }

    pub fn keys(&self) -> Vec<String> {
        self.page().keys.clone()
    }

    pub fn uploads(&self) -> Vec<(Selector, Vec<PathBuf>)> {
        self.page().uploads.clone()
    }

    pub fn value_of(&self, selector: &Selector) -> Option<String> {
        self.page().values.get(selector).cloned()
    }

    pub fn dialogs_pending(&self) -> usize {
        self.page().dialogs.len()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.page().navigations.clone()
    }
}

#[async_trait]
impl BrowserTrait for ScriptedBrowser {
    type TabHandle = usize;

    async fn launch(&mut self, _config: &Config) -> Result<()> {
        Ok(())
    }

    async fn new_tab(&self) -> Result<usize> {
        let mut page = self.page();
        page.next_tab += 1;
        let id = page.next_tab;
        page.tabs.push(id);
        Ok(id)
    }

    async fn tabs(&self) -> Result<Vec<usize>> {
        Ok(self.page().tabs.clone())
    }

    async fn close_tab(&self, tab: &usize) -> Result<()> {
        self.page().tabs.retain(|t| t != tab);
        Ok(())
    }

    async fn navigate(&self, _tab: &usize, url: &str) -> Result<()> {
        let mut page = self.page();
        page.navigations.push(url.to_string());
        page.url = url.to_string();
        let effects: Vec<Effect> = page
            .navigate_effects
            .iter()
            .filter(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            page.apply(effect);
        }
        Ok(())
    }

    async fn reload(&self, _tab: &usize) -> Result<()> {
        self.page().navigations.push("reload".to_string());
        Ok(())
    }

    async fn execute_script(&self, _tab: &usize, script: &str) -> Result<Value> {
        let mut page = self.page();
        page.scripts.push(script.to_string());

        if let Some((_, message)) = page
            .failing_scripts
            .iter()
            .find(|(fragment, _)| script.contains(fragment.as_str()))
        {
            return Err(DriverError::JavaScriptFailed(message.clone()));
        }

        let effects: Vec<Effect> = page
            .script_effects
            .iter()
            .filter(|(fragment, _)| script.contains(fragment.as_str()))
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            page.apply(effect);
        }

        Ok(page
            .script_rules
            .iter()
            .rev()
            .find(|(fragment, _)| script.contains(fragment.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn take_screenshot(&self, _tab: &usize) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn get_url(&self, _tab: &usize) -> Result<String> {
        Ok(self.page().url.clone())
    }

    async fn get_title(&self, _tab: &usize) -> Result<String> {
        Ok(self.page().title.clone())
    }

    async fn probe(&self, _tab: &usize, selector: &Selector) -> Result<Option<ElementState>> {
        let mut page = self.page();
        page.probes.push(selector.to_string());

        match page.hidden_until.get(selector).copied() {
            Some(0) => {
                page.hidden_until.remove(selector);
            }
            Some(remaining) => {
                page.hidden_until.insert(selector.clone(), remaining - 1);
                return Ok(None);
            }
            None => {}
        }
        Ok(page.elements.get(selector).cloned())
    }

    async fn interact(
        &self,
        _tab: &usize,
        selector: &Selector,
        action: &ActionKind,
        mechanism: Mechanism,
    ) -> Result<()> {
        let mut page = self.page();
        page.interactions.push(Interaction {
            selector: selector.clone(),
            action: action.clone(),
            mechanism,
        });

        if page.stale.remove(selector) {
            return Err(DriverError::StaleElement(selector.to_string()));
        }
        if !page.present(selector) {
            return Err(DriverError::ElementNotFound(selector.to_string()));
        }
        if let Some((_, _, message)) = page
            .failures
            .iter()
            .find(|(s, m, _)| s == selector && *m == mechanism)
        {
            return Err(DriverError::JavaScriptFailed(message.clone()));
        }

        match action {
            ActionKind::Click => {}
            ActionKind::Type(text) => {
                page.values.insert(selector.clone(), text.clone());
            }
            ActionKind::Clear => {
                page.values.remove(selector);
            }
            ActionKind::Select(value) => {
                page.values.insert(selector.clone(), value.clone());
            }
        }

        let effects: Vec<Effect> = page
            .interact_effects
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            page.apply(effect);
        }
        Ok(())
    }

    async fn set_input_files(&self, _tab: &usize, selector: &Selector, files: &[PathBuf]) -> Result<()> {
        let mut page = self.page();
        if !page.present(selector) {
            return Err(DriverError::ElementNotFound(selector.to_string()));
        }
        page.uploads.push((selector.clone(), files.to_vec()));
        let effects: Vec<Effect> = page
            .interact_effects
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            page.apply(effect);
        }
        Ok(())
    }

    async fn press_key(&self, _tab: &usize, key: &str) -> Result<()> {
        let mut page = self.page();
        page.keys.push(key.to_string());
        let effects: Vec<Effect> = page
            .key_effects
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            page.apply(effect);
        }
        Ok(())
    }

    async fn pending_dialog(&self, _tab: &usize) -> Result<Option<String>> {
        let page = self.page();
        if page.dialogs_broken {
            return Err(DriverError::DialogFailed("dialog target closed".to_string()));
        }
        Ok(page.dialogs.front().cloned())
    }

    async fn handle_dialog(&self, _tab: &usize, _accept: bool) -> Result<()> {
        let mut page = self.page();
        if page.dialogs_broken {
            return Err(DriverError::DialogFailed("dialog target closed".to_string()));
        }
        page.dialogs
            .pop_front()
            .map(|_| ())
            .ok_or_else(|| DriverError::DialogFailed("no dialog is showing".to_string()))
    }

    fn is_running(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
