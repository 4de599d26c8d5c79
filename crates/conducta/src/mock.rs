//! In-memory browser driver for tests and demos.
//!
//! A [`MockPage`] models an application as a plain state machine: it renders
//! a flat list of elements and reacts to element actions. [`MockDriver`]
//! turns that into a [`BrowserDriver`], handling navigation, reload and
//! history itself. Every navigation builds a fresh page from the factory, so
//! element references from an earlier page go stale, just like in a browser.

use crate::action::{Action, Interaction};
use crate::driver::{BrowserDriver, DriverError};
use crate::query::Selector;
use crate::state::ElementSnapshot;
use crate::value::ElementRef;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// One rendered element of a mock page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    /// Identity, stable across renders of the same page
    pub id: String,
    /// Selectors this element matches
    pub selectors: Vec<Selector>,
    /// Current observation
    pub snapshot: ElementSnapshot,
}

impl MockElement {
    /// Create an element matching `selectors`
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        selectors: impl IntoIterator<Item = impl Into<Selector>>,
        snapshot: ElementSnapshot,
    ) -> Self {
        Self {
            id: id.into(),
            selectors: selectors.into_iter().map(Into::into).collect(),
            snapshot,
        }
    }

    /// Whether this element matches `selector`
    #[must_use]
    pub fn matches(&self, selector: &Selector) -> bool {
        self.selectors.contains(selector)
    }
}

/// Application model behind a [`MockDriver`]
pub trait MockPage: Send {
    /// Elements in document order
    fn render(&self) -> Vec<MockElement>;

    /// React to an element action (click, key press, ...)
    fn handle(&mut self, action: &Action, element: &MockElement) -> Result<(), DriverError>;
}

type PageFactory<P> = Box<dyn Fn(&str) -> P + Send>;

/// Mock driver for unit testing
pub struct MockDriver<P: MockPage> {
    factory: PageFactory<P>,
    page: Option<P>,
    history: Vec<String>,
    generation: u64,
    /// Call history for verification
    call_history: Vec<String>,
    failures: VecDeque<(String, DriverError)>,
    flaky: BTreeMap<String, (usize, usize)>,
}

impl<P: MockPage> fmt::Debug for MockDriver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("history", &self.history)
            .field("generation", &self.generation)
            .field("calls", &self.call_history.len())
            .finish_non_exhaustive()
    }
}

impl<P: MockPage> MockDriver<P> {
    /// Create a driver that builds a fresh page for every navigation
    pub fn new(factory: impl Fn(&str) -> P + Send + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            page: None,
            history: Vec::new(),
            generation: 0,
            call_history: Vec::new(),
            failures: VecDeque::new(),
            flaky: BTreeMap::new(),
        }
    }

    /// Fail the next call of `method` with `error`
    pub fn inject_failure(&mut self, method: impl Into<String>, error: DriverError) {
        self.failures.push_back((method.into(), error));
    }

    /// Fail every `every`-th call of `method` with a transient error
    pub fn fail_every(&mut self, method: impl Into<String>, every: usize) {
        self.flaky.insert(method.into(), (every.max(1), 0));
    }

    /// Current page, if navigated
    #[must_use]
    pub const fn page(&self) -> Option<&P> {
        self.page.as_ref()
    }

    /// Current URL
    #[must_use]
    pub fn current_url(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(method))
    }

    fn record(&mut self, call: String) -> Result<(), DriverError> {
        let method = call.split(':').next().unwrap_or_default().to_string();
        self.call_history.push(call);
        if let Some(pos) = self.failures.iter().position(|(m, _)| *m == method) {
            if let Some((_, error)) = self.failures.remove(pos) {
                return Err(error);
            }
        }
        if let Some((every, count)) = self.flaky.get_mut(&method) {
            *count += 1;
            if *count % *every == 0 {
                return Err(DriverError::transient(format!("injected {method} failure")));
            }
        }
        Ok(())
    }

    fn load(&mut self, url: &str) {
        self.page = Some((self.factory)(url));
        self.generation += 1;
    }

    fn element_ref(&self, id: &str) -> ElementRef {
        ElementRef::new(format!("{}:{id}", self.generation))
    }

    /// Resolve a reference to an element of the current page
    fn resolve(&self, element: &ElementRef) -> Result<MockElement, DriverError> {
        let stale = || DriverError::StaleElement {
            element: element.clone(),
        };
        let (generation, id) = element.as_str().split_once(':').ok_or_else(stale)?;
        if generation != self.generation.to_string() {
            return Err(stale());
        }
        let page = self.page.as_ref().ok_or_else(stale)?;
        page.render()
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(stale)
    }
}

#[async_trait]
impl<P: MockPage> BrowserDriver for MockDriver<P> {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.record(format!("navigate:{url}"))?;
        self.history.clear();
        self.history.push(url.to_string());
        self.load(url);
        Ok(())
    }

    async fn find_elements(&mut self, selector: &Selector) -> Result<Vec<ElementRef>, DriverError> {
        self.record(format!("find_elements:{selector}"))?;
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| DriverError::fatal("no page loaded"))?;
        Ok(page
            .render()
            .iter()
            .filter(|e| e.matches(selector))
            .map(|e| self.element_ref(&e.id))
            .collect())
    }

    async fn read_element(
        &mut self,
        element: &ElementRef,
        styles: &BTreeSet<String>,
    ) -> Result<ElementSnapshot, DriverError> {
        self.record(format!("read_element:{element}"))?;
        let mut snapshot = self.resolve(element)?.snapshot;
        snapshot.style.retain(|name, _| styles.contains(name));
        Ok(snapshot)
    }

    async fn perform(
        &mut self,
        action: &Action,
        target: Option<&ElementRef>,
    ) -> Result<(), DriverError> {
        self.record(format!("perform:{action}"))?;
        match &action.interaction {
            Interaction::Reload => {
                let url = self
                    .current_url()
                    .ok_or_else(|| DriverError::rejected("nothing to reload"))?
                    .to_string();
                self.load(&url);
                Ok(())
            }
            Interaction::Navigate { url } => {
                self.history.push(url.clone());
                self.load(url);
                Ok(())
            }
            Interaction::Back => {
                if self.history.len() > 1 {
                    self.history.pop();
                }
                let url = self
                    .current_url()
                    .ok_or_else(|| DriverError::rejected("no history"))?
                    .to_string();
                self.load(&url);
                Ok(())
            }
            _ => {
                let target =
                    target.ok_or_else(|| DriverError::rejected("element action without target"))?;
                let element = self.resolve(target)?;
                let page = self
                    .page
                    .as_mut()
                    .ok_or_else(|| DriverError::fatal("no page loaded"))?;
                page.handle(action, &element)
            }
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.call_history.push("close".to_string());
        self.page = None;
        Ok(())
    }
}
