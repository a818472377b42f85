use super::selector::{ElementState, Selector, Strategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    Present,
    Visible,
    Clickable,
}

impl Requirement {
    pub fn satisfied_by(&self, state: &ElementState) -> bool {
        match self {
            Requirement::Present => true,
            Requirement::Visible => state.visible,
            Requirement::Clickable => state.visible && state.enabled,
        }
    }
}

/// One logical UI element and the ordered ways of finding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    label: String,
    strategies: Vec<Strategy>,
    frame: Option<String>,
    requirement: Requirement,
}

impl TargetDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            strategies: Vec::new(),
            frame: None,
            requirement: Requirement::Present,
        }
    }

    /// Shorthand for the common single-id target.
    pub fn by_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone()).id(id)
    }

    pub fn by_xpath(xpath: impl Into<String>) -> Self {
        let xpath = xpath.into();
        Self::new(xpath.clone()).xpath(xpath)
    }

    pub fn by_css(css: impl Into<String>) -> Self {
        let css = css.into();
        Self::new(css.clone()).css(css)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Id(id.into()));
        self
    }

    pub fn css(mut self, css: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Css(css.into()));
        self
    }

    pub fn xpath(mut self, xpath: impl Into<String>) -> Self {
        self.strategies.push(Strategy::XPath(xpath.into()));
        self
    }

    /// Matches any element whose `attr` contains `fragment`.
    pub fn attr_contains(mut self, attr: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.strategies.push(Strategy::AttrContains {
            attr: attr.into(),
            fragment: fragment.into(),
        });
        self
    }

    pub fn in_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame = Some(frame_id.into());
        self
    }

    pub fn visible(mut self) -> Self {
        self.requirement = Requirement::Visible;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.requirement = Requirement::Clickable;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Selectors in declared order, each bound to the target's frame.
    pub fn selectors(&self) -> impl Iterator<Item = Selector> + '_ {
        self.strategies.iter().map(move |strategy| Selector {
            strategy: strategy.clone(),
            frame: self.frame.clone(),
        })
    }
}
