//! `BrowserDriver` - abstract browser capability
//!
//! The checking core never speaks a wire protocol. Everything it needs from
//! a browser goes through this trait, and those calls are the only points
//! where a run can block, time out or be aborted.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  BrowserDriver (Abstract Trait)                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────┐   ┌────────────────────────────┐  │
//! │  │  ChromiumDriver       │   │  MockDriver                │  │
//! │  │  (feature "browser")  │   │  (tests, demos)            │  │
//! │  │  CDP via chromiumoxide│   │  scripted page model       │  │
//! │  └───────────────────────┘   └────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::action::Action;
use crate::query::Selector;
use crate::state::ElementSnapshot;
use crate::value::ElementRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Network or automation hiccup; the same call may succeed when retried
    #[error("transient driver failure: {message}")]
    Transient {
        /// Error message
        message: String,
    },

    /// The session is unusable
    #[error("fatal driver failure: {message}")]
    Fatal {
        /// Error message
        message: String,
    },

    /// The page refused the action (element detached, not interactable, ...)
    #[error("action rejected: {message}")]
    ActionRejected {
        /// Error message
        message: String,
    },

    /// An element reference no longer resolves
    #[error("stale element {element}")]
    StaleElement {
        /// Element
        element: ElementRef,
    },
}

impl DriverError {
    /// Transient failure
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Fatal failure
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Rejected action
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::ActionRejected {
            message: message.into(),
        }
    }

    /// Whether retrying the same trial could succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Browser configuration for driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Timeout for navigation
    pub navigation_timeout: Duration,
    /// Executable path override
    pub executable_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
            executable_path: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Use a specific browser binary
    #[must_use]
    pub fn executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Browser capability consumed by the executor.
///
/// Reads are consistent within one call. `perform` is atomic with respect to
/// the action it names; waiting for the page to settle afterwards is the
/// driver's job. A fresh `navigate` invalidates every element reference.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Navigate to URL, starting a fresh page
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Elements matching `selector`, in document order
    async fn find_elements(&mut self, selector: &Selector) -> Result<Vec<ElementRef>, DriverError>;

    /// Observe one element, reading the given computed style properties
    async fn read_element(
        &mut self,
        element: &ElementRef,
        styles: &BTreeSet<String>,
    ) -> Result<ElementSnapshot, DriverError>;

    /// Perform an action; `target` is the resolved element for element actions
    async fn perform(
        &mut self,
        action: &Action,
        target: Option<&ElementRef>,
    ) -> Result<(), DriverError>;

    /// Release the session
    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
