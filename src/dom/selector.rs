use serde::{Deserialize, Serialize};
use std::fmt;

/// One way of finding an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Id(String),
    Css(String),
    XPath(String),
    /// Any element whose attribute contains the fragment, e.g. generated
    /// ASP.NET ids or hashed CSS class names.
    AttrContains { attr: String, fragment: String },
}

/// A strategy bound to the document (or same-origin iframe) it lives in.
/// This is the handle the driver keeps for a located element; every
/// interaction resolves it again, so a stale match surfaces as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub strategy: Strategy,
    pub frame: Option<String>,
}

/// What a probe learned about a matched element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub text: String,
}

pub(crate) fn js_quote(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

impl Strategy {
    /// Equivalent CSS selector, when one exists.
    pub fn as_css(&self) -> Option<String> {
        match self {
            Strategy::Id(id) => Some(format!("[id='{}']", id)),
            Strategy::Css(css) => Some(css.clone()),
            Strategy::XPath(_) => None,
            Strategy::AttrContains { attr, fragment } => Some(format!("[{}*='{}']", attr, fragment)),
        }
    }
}

impl Selector {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            frame: None,
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Strategy::Id(id.into()))
    }

    pub fn css(css: impl Into<String>) -> Self {
        Self::new(Strategy::Css(css.into()))
    }

    pub fn xpath(xpath: impl Into<String>) -> Self {
        Self::new(Strategy::XPath(xpath.into()))
    }

    pub fn in_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame = Some(frame_id.into());
        self
    }

    fn root_js(&self) -> String {
        match &self.frame {
            Some(frame) => format!(
                "(function() {{ const f = document.getElementById('{}'); return f ? f.contentDocument : null; }})()",
                js_quote(frame)
            ),
            None => "document".to_string(),
        }
    }

    /// JavaScript expression evaluating to the matched element or `null`.
    pub fn resolve_js(&self) -> String {
        let lookup = match &self.strategy {
            Strategy::Id(id) => format!("root.getElementById('{}')", js_quote(id)),
            Strategy::XPath(xpath) => format!(
                "root.evaluate('{}', root, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_quote(xpath)
            ),
            other => format!(
                "root.querySelector('{}')",
                js_quote(&other.as_css().unwrap_or_default())
            ),
        };
        format!(
            "(function() {{ const root = {}; if (!root) return null; return {}; }})()",
            self.root_js(),
            lookup
        )
    }

    /// Script returning an [`ElementState`] object, or `null` on no match.
    pub fn probe_js(&self) -> String {
        format!(
            r#"
            (function() {{
                const el = {};
                if (!el) return null;
                const view = el.ownerDocument.defaultView || window;
                const rect = el.getBoundingClientRect();
                const style = view.getComputedStyle(el);
                const visible = rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden' && style.display !== 'none';
                const enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
                return {{
                    visible: visible,
                    enabled: enabled,
                    tag: el.tagName.toLowerCase(),
                    text: (el.innerText || el.value || '').slice(0, 200)
                }};
            }})()
            "#,
            self.resolve_js()
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Id(id) => write!(f, "id={}", id),
            Strategy::Css(css) => write!(f, "css={}", css),
            Strategy::XPath(xpath) => write!(f, "xpath={}", xpath),
            Strategy::AttrContains { attr, fragment } => write!(f, "attr[{}*={}]", attr, fragment),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame {
            Some(frame) => write!(f, "frame({}) > {}", frame, self.strategy),
            None => write!(f, "{}", self.strategy),
        }
    }
}
