//! Typed assertions over query results.
//!
//! An [`Assertion`] is a predicate tied to the [`ValueKind`] it applies to.
//! The tag is checked when a query assertion is constructed, so applying
//! `Contains` to a non-string query is rejected before anything runs.

use crate::result::ConstructionError;
use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Result of an assertion
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
}

impl AssertionResult {
    /// Create a passing assertion result
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    /// Create a failing assertion result
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Opaque host predicate. Only its label shows up in diagnostics.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    kind: ValueKind,
    func: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Predicate {
    /// Wrap a closure that accepts values of `kind`
    pub fn new(
        label: impl Into<String>,
        kind: ValueKind,
        func: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            func: Arc::new(func),
        }
    }

    /// Label used in diagnostics
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Kind the predicate accepts
    #[must_use]
    pub const fn kind(&self) -> &ValueKind {
        &self.kind
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A predicate over a value of some kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Structural equality with the expected value
    Equals {
        /// Expected value
        value: Value,
    },
    /// Substring test, strings only
    Contains {
        /// Substring to look for
        substring: String,
    },
    /// Opaque host predicate
    #[serde(skip)]
    Satisfies(Predicate),
}

impl Assertion {
    /// Equality assertion
    #[must_use]
    pub fn equals(expected: impl Into<Value>) -> Self {
        Self::Equals {
            value: expected.into(),
        }
    }

    /// Substring assertion
    #[must_use]
    pub fn contains(substring: impl Into<String>) -> Self {
        Self::Contains {
            substring: substring.into(),
        }
    }

    /// Host predicate assertion
    pub fn satisfies(
        label: impl Into<String>,
        kind: ValueKind,
        func: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Satisfies(Predicate::new(label, kind, func))
    }

    /// Variant name for diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Equals { .. } => "equals",
            Self::Contains { .. } => "contains",
            Self::Satisfies(_) => "satisfies",
        }
    }

    /// Check that this assertion can apply to values of `kind`.
    ///
    /// `Equals` accepts every kind: comparing against a value of another kind
    /// is simply false at runtime.
    pub fn validate(&self, kind: &ValueKind, selector: &str) -> Result<(), ConstructionError> {
        let ok = match self {
            Self::Equals { .. } => true,
            Self::Contains { .. } => kind.unify(&ValueKind::String).is_some(),
            Self::Satisfies(predicate) => kind.unify(predicate.kind()).is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(ConstructionError::AssertionKind {
                assertion: self.name().to_string(),
                kind: kind.clone(),
                selector: selector.to_string(),
            })
        }
    }

    /// Apply the assertion. Total: ill-kinded input yields false.
    #[must_use]
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Self::Equals { value: expected } => expected == value,
            Self::Contains { substring: needle } => value.as_str().is_some_and(|haystack| {
                // The empty needle matches only the empty string
                if needle.is_empty() {
                    haystack.is_empty()
                } else {
                    haystack.contains(needle.as_str())
                }
            }),
            Self::Satisfies(predicate) => (predicate.func)(value),
        }
    }

    /// Apply the assertion and explain a failure
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> AssertionResult {
        if self.check(value) {
            return AssertionResult::pass();
        }
        match self {
            Self::Equals { value: expected } => {
                AssertionResult::fail(format!("expected {expected}, got {value}"))
            }
            Self::Contains { substring: needle } => {
                AssertionResult::fail(format!("expected {value} to contain {needle:?}"))
            }
            Self::Satisfies(predicate) => AssertionResult::fail(format!(
                "predicate '{}' rejected {value}",
                predicate.label()
            )),
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { value: expected } => write!(f, "== {expected}"),
            Self::Contains { substring: needle } => write!(f, "contains {needle:?}"),
            Self::Satisfies(predicate) => write!(f, "satisfies <{}>", predicate.label()),
        }
    }
}
