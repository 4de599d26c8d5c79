//! Observed DOM states and behaviors.
//!
//! A [`State`] is an immutable snapshot taken once after the page became
//! ready and once after every executed action. A [`Behavior`] is the ordered
//! sequence of those snapshots for one run.

use crate::query::Selector;
use crate::value::ElementRef;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Label of the initial state's `happened` value
pub const LOADED: &str = "loaded";

/// Everything observed about one element at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Lowercase tag name
    pub tag: String,
    /// Text content (for form fields, the current value)
    pub text: String,
    /// All attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Computed style properties that the specification reads
    #[serde(default)]
    pub style: BTreeMap<String, String>,
    /// Visibility as decided by the driver
    pub visible: bool,
    /// Whether the element has keyboard focus
    #[serde(default)]
    pub focused: bool,
}

impl ElementSnapshot {
    /// Create a snapshot of a visible element with the given tag and text
    #[must_use]
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            text: text.into(),
            visible: true,
            ..Self::default()
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a computed style property
    #[must_use]
    pub fn with_style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.style.insert(name.into(), value.into());
        self
    }

    /// Set visibility
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set focus
    #[must_use]
    pub const fn with_focus(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Read an attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Not carrying a `disabled` attribute
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.attributes.contains_key("disabled")
    }

    /// Accepts text input
    #[must_use]
    pub fn is_editable(&self) -> bool {
        if self.attributes.contains_key("readonly") {
            return false;
        }
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.attribute("type").unwrap_or("text"),
                "checkbox" | "radio" | "button" | "submit" | "reset" | "file" | "hidden" | "image"
            ),
            _ => matches!(self.attribute("contenteditable"), Some("" | "true")),
        }
    }

    /// Can receive keyboard focus
    #[must_use]
    pub fn is_focusable(&self) -> bool {
        self.attributes.contains_key("tabindex")
            || self.is_editable()
            || matches!(
                self.tag.as_str(),
                "a" | "button" | "input" | "select" | "textarea"
            )
    }
}

/// Immutable snapshot of the observed DOM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Query results per captured selector, in document order
    queries: BTreeMap<Selector, Vec<ElementRef>>,
    /// Per-element observations
    elements: BTreeMap<ElementRef, ElementSnapshot>,
    /// Label of what produced this state
    happened: String,
}

impl State {
    /// Create an empty state produced by `happened`
    #[must_use]
    pub fn new(happened: impl Into<String>) -> Self {
        Self {
            queries: BTreeMap::new(),
            elements: BTreeMap::new(),
            happened: happened.into(),
        }
    }

    /// Create an empty initial state
    #[must_use]
    pub fn loaded() -> Self {
        Self::new(LOADED)
    }

    /// Record an element matched by `selector`, appended in document order
    #[must_use]
    pub fn with_element(
        mut self,
        selector: impl Into<Selector>,
        element: ElementRef,
        snapshot: ElementSnapshot,
    ) -> Self {
        self.insert(selector.into(), element, snapshot);
        self
    }

    /// Record that `selector` was captured but matched nothing
    #[must_use]
    pub fn with_empty(mut self, selector: impl Into<Selector>) -> Self {
        self.queries.entry(selector.into()).or_default();
        self
    }

    pub(crate) fn insert(
        &mut self,
        selector: Selector,
        element: ElementRef,
        snapshot: ElementSnapshot,
    ) {
        let matches = self.queries.entry(selector).or_default();
        if !matches.contains(&element) {
            matches.push(element.clone());
        }
        self.elements.insert(element, snapshot);
    }

    pub(crate) fn capture_selector(&mut self, selector: Selector, matches: Vec<ElementRef>) {
        self.queries.insert(selector, matches);
    }

    pub(crate) fn capture_element(&mut self, element: ElementRef, snapshot: ElementSnapshot) {
        self.elements.insert(element, snapshot);
    }

    /// Elements matched by a captured selector, `None` if it was not captured
    #[must_use]
    pub fn query(&self, selector: &Selector) -> Option<&[ElementRef]> {
        self.queries.get(selector).map(Vec::as_slice)
    }

    /// Observation of one element, `None` if it is absent from this state
    #[must_use]
    pub fn element(&self, element: &ElementRef) -> Option<&ElementSnapshot> {
        self.elements.get(element)
    }

    /// Captured selectors
    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.queries.keys()
    }

    /// Label of what produced this state
    #[must_use]
    pub fn happened(&self) -> &str {
        &self.happened
    }

    /// Short SHA-256 fingerprint of the observed DOM content (excluding `happened`)
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (selector, matches) in &self.queries {
            hasher.update(selector.as_str().as_bytes());
            for element in matches {
                hasher.update([0u8]);
                // Element identities change across navigations; only content counts
                if let Some(snapshot) = self.elements.get(element) {
                    // serde_json keeps BTreeMap order, so the encoding is canonical
                    if let Ok(bytes) = serde_json::to_vec(snapshot) {
                        hasher.update(&bytes);
                    }
                }
            }
            hasher.update([0xffu8]);
        }
        hasher
            .finalize()
            .iter()
            .take(6)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Ordered, non-empty sequence of states for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    states: Vec<State>,
}

impl Behavior {
    /// Start a behavior at its initial state
    #[must_use]
    pub fn new(initial: State) -> Self {
        Self {
            states: vec![initial],
        }
    }

    /// Build a behavior from states; `None` if `states` is empty
    #[must_use]
    pub fn from_states(states: Vec<State>) -> Option<Self> {
        if states.is_empty() {
            None
        } else {
            Some(Self { states })
        }
    }

    /// Append the state observed after an action
    pub fn push(&mut self, state: State) {
        self.states.push(state);
    }

    /// Number of states (always at least 1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false; behaviors hold at least the initial state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State at a position
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&State> {
        self.states.get(position)
    }

    /// Most recently observed state
    #[must_use]
    pub fn last(&self) -> &State {
        // Non-empty by construction
        &self.states[self.states.len() - 1]
    }

    /// All states in order
    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }
}
