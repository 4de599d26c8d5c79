//! Query engine interface over DOM snapshots.
//!
//! Queries never touch the browser: they resolve against a [`State`] that the
//! executor already captured. A [`QueryAssertion`] pairs a query with a typed
//! [`Assertion`] and is reused unchanged across every state of a behavior.

use crate::assertion::{Assertion, AssertionResult};
use crate::result::ConstructionError;
use crate::state::{ElementSnapshot, State};
use crate::value::{ElementRef, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// CSS selector
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(String);

impl Selector {
    /// Create a selector
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    /// Get the selector source
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failures resolving a query against a state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The selector was not captured in the state
    #[error("selector '{selector}' was not captured")]
    NotCaptured {
        /// Selector
        selector: String,
    },

    /// Exactly one element was expected, none matched
    #[error("no element matches '{selector}'")]
    NoMatch {
        /// Selector
        selector: String,
    },

    /// Exactly one element was expected, several matched
    #[error("{count} elements match '{selector}', expected exactly one")]
    Ambiguous {
        /// Selector
        selector: String,
        /// Number of matches
        count: usize,
    },

    /// A matched element has no observation in the state
    #[error("element {element} is missing from the state")]
    StaleElement {
        /// Element
        element: ElementRef,
    },
}

/// Run a selector against a state, in document order
pub fn run_query<'s>(
    state: &'s State,
    selector: &Selector,
) -> Result<&'s [ElementRef], QueryError> {
    state.query(selector).ok_or_else(|| QueryError::NotCaptured {
        selector: selector.to_string(),
    })
}

/// How to obtain a value from the current DOM snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Whether anything matches (one bool)
    Present {
        /// Selector
        selector: Selector,
    },
    /// Number of matches (one number)
    Count {
        /// Selector
        selector: Selector,
    },
    /// Text of each match
    Text {
        /// Selector
        selector: Selector,
    },
    /// Attribute of each match; absent attributes read as ""
    Attribute {
        /// Selector
        selector: Selector,
        /// Attribute name
        name: String,
    },
    /// Computed style property of each match; unread properties read as ""
    Style {
        /// Selector
        selector: Selector,
        /// CSS property name
        name: String,
    },
    /// Visibility of each match
    Visible {
        /// Selector
        selector: Selector,
    },
}

impl Query {
    /// Text query
    #[must_use]
    pub fn text(selector: impl Into<Selector>) -> Self {
        Self::Text {
            selector: selector.into(),
        }
    }

    /// Visibility query
    #[must_use]
    pub fn visible(selector: impl Into<Selector>) -> Self {
        Self::Visible {
            selector: selector.into(),
        }
    }

    /// Presence query
    #[must_use]
    pub fn present(selector: impl Into<Selector>) -> Self {
        Self::Present {
            selector: selector.into(),
        }
    }

    /// Count query
    #[must_use]
    pub fn count(selector: impl Into<Selector>) -> Self {
        Self::Count {
            selector: selector.into(),
        }
    }

    /// Attribute query
    #[must_use]
    pub fn attribute(selector: impl Into<Selector>, name: impl Into<String>) -> Self {
        Self::Attribute {
            selector: selector.into(),
            name: name.into(),
        }
    }

    /// Style query
    #[must_use]
    pub fn style(selector: impl Into<Selector>, name: impl Into<String>) -> Self {
        Self::Style {
            selector: selector.into(),
            name: name.into(),
        }
    }

    /// The selector this query runs
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        match self {
            Self::Present { selector }
            | Self::Count { selector }
            | Self::Text { selector }
            | Self::Attribute { selector, .. }
            | Self::Style { selector, .. }
            | Self::Visible { selector } => selector,
        }
    }

    /// Style property the query reads, if any
    #[must_use]
    pub fn style_name(&self) -> Option<&str> {
        match self {
            Self::Style { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Kind of each value the query produces
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Present { .. } | Self::Visible { .. } => ValueKind::Bool,
            Self::Count { .. } => ValueKind::Number,
            Self::Text { .. } | Self::Attribute { .. } | Self::Style { .. } => ValueKind::String,
        }
    }

    /// Whether the query aggregates all matches into a single value
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Present { .. } | Self::Count { .. })
    }

    fn project(&self, snapshot: &ElementSnapshot) -> Value {
        match self {
            Self::Text { .. } => Value::String(snapshot.text.clone()),
            Self::Attribute { name, .. } => {
                Value::String(snapshot.attribute(name).unwrap_or_default().to_string())
            }
            Self::Style { name, .. } => {
                Value::String(snapshot.style.get(name).cloned().unwrap_or_default())
            }
            Self::Visible { .. } => Value::Bool(snapshot.visible),
            Self::Present { .. } | Self::Count { .. } => Value::Bool(true),
        }
    }

    /// Resolve against a state: one value per match, or one aggregate value
    pub fn resolve(&self, state: &State) -> Result<Vec<Value>, QueryError> {
        let matches = run_query(state, self.selector())?;
        match self {
            Self::Present { .. } => Ok(vec![Value::Bool(!matches.is_empty())]),
            #[allow(clippy::cast_precision_loss)]
            Self::Count { .. } => Ok(vec![Value::Number(matches.len() as f64)]),
            _ => matches
                .iter()
                .map(|element| {
                    state
                        .element(element)
                        .map(|snapshot| self.project(snapshot))
                        .ok_or_else(|| QueryError::StaleElement {
                            element: element.clone(),
                        })
                })
                .collect(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { selector } => write!(f, "present({selector:?})"),
            Self::Count { selector } => write!(f, "count({selector:?})"),
            Self::Text { selector } => write!(f, "{selector:?}.text"),
            Self::Attribute { selector, name } => write!(f, "{selector:?}.attributes({name:?})"),
            Self::Style { selector, name } => write!(f, "{selector:?}.style({name:?})"),
            Self::Visible { selector } => write!(f, "{selector:?}.visible"),
        }
    }
}

/// How many matches a query assertion expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// Exactly one element must match; zero or several is an error
    #[default]
    One,
    /// Check the first match; no match is false
    First,
    /// Every match must satisfy (true when nothing matches)
    All,
    /// Some match must satisfy (false when nothing matches)
    Any,
}

/// A query paired with a typed assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAssertion {
    /// Query to run against each state
    pub query: Query,
    /// Assertion applied to the query's values
    pub assertion: Assertion,
    /// Expected cardinality
    #[serde(default)]
    pub expect: Expect,
}

impl QueryAssertion {
    /// Pair a query and an assertion, rejecting kind mismatches
    pub fn new(
        query: Query,
        assertion: Assertion,
        expect: Expect,
    ) -> Result<Self, ConstructionError> {
        let qa = Self {
            query,
            assertion,
            expect,
        };
        qa.validate()?;
        Ok(qa)
    }

    /// Re-run the construction check (for deserialized helpers)
    pub fn validate(&self) -> Result<(), ConstructionError> {
        self.assertion
            .validate(&self.query.kind(), self.query.selector().as_str())
    }

    /// Decide the assertion in `state`
    pub fn check(&self, state: &State) -> Result<bool, QueryError> {
        self.evaluate(state).map(|result| result.passed)
    }

    /// Decide the assertion in `state` and explain a failure
    pub fn evaluate(&self, state: &State) -> Result<AssertionResult, QueryError> {
        let values = self.query.resolve(state)?;
        if self.query.is_aggregate() {
            return Ok(values
                .first()
                .map_or_else(|| AssertionResult::fail("no value"), |v| self.assertion.evaluate(v)));
        }
        let selector = self.query.selector().to_string();
        match self.expect {
            Expect::One => match values.as_slice() {
                [value] => Ok(self.assertion.evaluate(value)),
                [] => Err(QueryError::NoMatch { selector }),
                _ => Err(QueryError::Ambiguous {
                    selector,
                    count: values.len(),
                }),
            },
            Expect::First => Ok(values.first().map_or_else(
                || AssertionResult::fail(format!("nothing matches '{selector}'")),
                |v| self.assertion.evaluate(v),
            )),
            Expect::All => Ok(values
                .iter()
                .map(|v| self.assertion.evaluate(v))
                .find(|r| !r.passed)
                .unwrap_or_else(AssertionResult::pass)),
            Expect::Any => {
                if values.iter().any(|v| self.assertion.check(v)) {
                    Ok(AssertionResult::pass())
                } else {
                    Ok(AssertionResult::fail(format!(
                        "no match of '{selector}' satisfies {}",
                        self.assertion
                    )))
                }
            }
        }
    }
}

impl fmt::Display for QueryAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.query, self.assertion)
    }
}
