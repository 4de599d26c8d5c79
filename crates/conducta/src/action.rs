//! Action model.
//!
//! An [`ActionTemplate`] is what a specification declares ("click any
//! `.delete` button"); an [`Action`] is one concrete, replayable instance
//! ("click the second `.delete` button"). Actions are plain data so that a
//! sequence of them can be serialized, compared and shrunk.

use crate::query::Selector;
use crate::result::ConstructionError;
use crate::state::{ElementSnapshot, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Interaction kind of a template, with the parameter choices to draw from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateKind {
    /// Single click
    Click,
    /// Double click
    DoubleClick,
    /// Move keyboard focus
    Focus,
    /// Press one key on the focused element
    KeyPress {
        /// Key values (`Enter`, `Escape`, `a`, ...)
        keys: Vec<String>,
    },
    /// Type text into an editable element
    EnterText {
        /// Texts to choose from
        texts: Vec<String>,
    },
    /// Clear an editable element
    Clear,
    /// Reload the page
    Reload,
    /// Navigate to a URL
    Navigate {
        /// URLs to choose from
        urls: Vec<String>,
    },
    /// History back
    Back,
}

impl TemplateKind {
    /// Whether actions of this kind target an element
    #[must_use]
    pub const fn targets_element(&self) -> bool {
        !matches!(self, Self::Reload | Self::Navigate { .. } | Self::Back)
    }

    /// Snake-case name of the kind
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::Focus => "focus",
            Self::KeyPress { .. } => "key_press",
            Self::EnterText { .. } => "enter_text",
            Self::Clear => "clear",
            Self::Reload => "reload",
            Self::Navigate { .. } => "navigate",
            Self::Back => "back",
        }
    }

    fn interactions(&self) -> Vec<Interaction> {
        match self {
            Self::Click => vec![Interaction::Click],
            Self::DoubleClick => vec![Interaction::DoubleClick],
            Self::Focus => vec![Interaction::Focus],
            Self::KeyPress { keys } => keys
                .iter()
                .map(|key| Interaction::KeyPress { key: key.clone() })
                .collect(),
            Self::EnterText { texts } => texts
                .iter()
                .map(|text| Interaction::EnterText { text: text.clone() })
                .collect(),
            Self::Clear => vec![Interaction::Clear],
            Self::Reload => vec![Interaction::Reload],
            Self::Navigate { urls } => urls
                .iter()
                .map(|url| Interaction::Navigate { url: url.clone() })
                .collect(),
            Self::Back => vec![Interaction::Back],
        }
    }
}

const fn default_weight() -> u32 {
    1
}

/// An action a specification allows the generator to take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTemplate {
    /// Label reported by `happened`; defaults to the kind name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Interaction kind and parameters
    pub kind: TemplateKind,
    /// Selector the target elements are drawn from (element actions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    /// Relative weight for weighted generation
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ActionTemplate {
    /// Template for an element action
    #[must_use]
    pub fn on(kind: TemplateKind, selector: impl Into<Selector>) -> Self {
        Self {
            name: None,
            kind,
            selector: Some(selector.into()),
            weight: 1,
        }
    }

    /// Template for a page-level action (reload, navigate, back)
    #[must_use]
    pub const fn page(kind: TemplateKind) -> Self {
        Self {
            name: None,
            kind,
            selector: None,
            weight: 1,
        }
    }

    /// Click on elements matching `selector`
    #[must_use]
    pub fn click(selector: impl Into<Selector>) -> Self {
        Self::on(TemplateKind::Click, selector)
    }

    /// Set the label
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the weight
    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Label used by `happened`
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.name())
    }

    /// Check the template is well-formed
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let invalid = |message: &str| {
            Err(ConstructionError::InvalidAction {
                name: self.label().to_string(),
                message: message.to_string(),
            })
        };
        if self.weight == 0 {
            return invalid("weight must be at least 1");
        }
        match (&self.selector, self.kind.targets_element()) {
            (None, true) => return invalid("element actions need a selector"),
            (Some(_), false) => return invalid("page actions take no selector"),
            _ => {}
        }
        if self.kind.interactions().is_empty() {
            return invalid("no parameter values to choose from");
        }
        Ok(())
    }

    fn allows(&self, interaction: &Interaction, snapshot: &ElementSnapshot) -> bool {
        match interaction {
            Interaction::Click | Interaction::DoubleClick => {
                snapshot.visible && snapshot.is_enabled()
            }
            Interaction::Focus => {
                snapshot.visible
                    && snapshot.is_enabled()
                    && snapshot.is_focusable()
                    && !snapshot.focused
            }
            Interaction::KeyPress { .. } => snapshot.focused && snapshot.is_editable(),
            Interaction::EnterText { .. } | Interaction::Clear => {
                snapshot.visible && snapshot.is_enabled() && snapshot.is_editable()
            }
            Interaction::Reload | Interaction::Navigate { .. } | Interaction::Back => true,
        }
    }
}

/// A concrete interaction, with its parameter fixed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    /// Single click
    Click,
    /// Double click
    DoubleClick,
    /// Move keyboard focus
    Focus,
    /// Press a key
    KeyPress {
        /// Key value
        key: String,
    },
    /// Type text
    EnterText {
        /// Text
        text: String,
    },
    /// Clear the field
    Clear,
    /// Reload the page
    Reload,
    /// Navigate to a URL
    Navigate {
        /// URL
        url: String,
    },
    /// History back
    Back,
}

impl Interaction {
    /// Snake-case name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::Focus => "focus",
            Self::KeyPress { .. } => "key_press",
            Self::EnterText { .. } => "enter_text",
            Self::Clear => "clear",
            Self::Reload => "reload",
            Self::Navigate { .. } => "navigate",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyPress { key } => write!(f, "key_press({key:?})"),
            Self::EnterText { text } => write!(f, "enter_text({text:?})"),
            Self::Navigate { url } => write!(f, "navigate({url:?})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Element an action targets, by position among a selector's matches
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Selector
    pub selector: Selector,
    /// Index in document order
    pub index: usize,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

/// One concrete, replayable action
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Action {
    /// Template label, if the template was named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// What to do
    pub interaction: Interaction,
    /// Where to do it (element actions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl Action {
    /// Build an element action
    #[must_use]
    pub fn on(interaction: Interaction, selector: impl Into<Selector>, index: usize) -> Self {
        Self {
            name: None,
            interaction,
            target: Some(Target {
                selector: selector.into(),
                index,
            }),
        }
    }

    /// Build a page-level action
    #[must_use]
    pub const fn page(interaction: Interaction) -> Self {
        Self {
            name: None,
            interaction,
            target: None,
        }
    }

    /// Set the label
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label of the state this action produces
    #[must_use]
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_else(|| self.interaction.name())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        write!(f, "{}", self.interaction)?;
        if let Some(target) = &self.target {
            write!(f, " on {target}")?;
        }
        Ok(())
    }
}

/// A valid action together with the weight of the template it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Action
    pub action: Action,
    /// Template weight
    pub weight: u32,
}

/// Every valid action in `state`, with weights.
///
/// Order is deterministic: template order, then document order, then
/// parameter order. An action produced by two templates is kept once, with
/// the first template's weight.
#[must_use]
pub fn candidates(state: &State, templates: &[ActionTemplate]) -> Vec<Candidate> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |action: Action, weight: u32| {
        if seen.insert(action.clone()) {
            out.push(Candidate { action, weight });
        }
    };

    for template in templates {
        let interactions = template.kind.interactions();
        match &template.selector {
            None => {
                for interaction in interactions {
                    let action = Action {
                        name: template.name.clone(),
                        interaction,
                        target: None,
                    };
                    push(action, template.weight);
                }
            }
            Some(selector) => {
                let Some(matches) = state.query(selector) else {
                    continue;
                };
                for (index, element) in matches.iter().enumerate() {
                    let Some(snapshot) = state.element(element) else {
                        continue;
                    };
                    for interaction in &interactions {
                        if template.allows(interaction, snapshot) {
                            let action = Action {
                                name: template.name.clone(),
                                interaction: interaction.clone(),
                                target: Some(Target {
                                    selector: selector.clone(),
                                    index,
                                }),
                            };
                            push(action, template.weight);
                        }
                    }
                }
            }
        }
    }
    out
}

/// Every action that is semantically possible in `state`
#[must_use]
pub fn valid_actions(state: &State, templates: &[ActionTemplate]) -> Vec<Action> {
    candidates(state, templates)
        .into_iter()
        .map(|c| c.action)
        .collect()
}

/// Whether `action` is currently valid
#[must_use]
pub fn is_valid(action: &Action, state: &State, templates: &[ActionTemplate]) -> bool {
    candidates(state, templates)
        .iter()
        .any(|c| &c.action == action)
}
