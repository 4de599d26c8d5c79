//! Typed values produced by formula evaluation.
//!
//! Every formula evaluates to a [`Value`]. Containers are homogeneous: the
//! element kind of a set or sequence is fixed when the formula is validated,
//! and [`ValueKind`] is the tag the construction checks work with.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque reference to a DOM element, assigned by the browser driver.
///
/// References are only meaningful within the session that produced them; a
/// fresh navigation invalidates all of them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(String);

impl ElementRef {
    /// Create an element reference from a driver-assigned id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// The kind of a value, as known at formula-construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// Number (f64)
    Number,
    /// String
    String,
    /// DOM element reference
    Element,
    /// Unordered, deduplicated set of the inner kind
    Set(Box<ValueKind>),
    /// Ordered sequence of the inner kind
    Sequence(Box<ValueKind>),
    /// Not yet determined (element kind of an empty literal)
    Any,
}

impl ValueKind {
    /// Set of the given element kind
    #[must_use]
    pub fn set_of(inner: Self) -> Self {
        Self::Set(Box::new(inner))
    }

    /// Sequence of the given element kind
    #[must_use]
    pub fn sequence_of(inner: Self) -> Self {
        Self::Sequence(Box::new(inner))
    }

    /// Element kind of a container, if this is one
    #[must_use]
    pub fn element_kind(&self) -> Option<&Self> {
        match self {
            Self::Set(inner) | Self::Sequence(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a value of this kind can be quantified over
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Set(_) | Self::Sequence(_) | Self::Any)
    }

    /// Combine two kinds that must agree, resolving `Any` against the other.
    ///
    /// Returns `None` when the kinds are incompatible.
    #[must_use]
    pub fn unify(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, k) | (k, Self::Any) => Some(k.clone()),
            (Self::Set(a), Self::Set(b)) => a.unify(b).map(Self::set_of),
            (Self::Sequence(a), Self::Sequence(b)) => a.unify(b).map(Self::sequence_of),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Element => write!(f, "element"),
            Self::Set(inner) => write!(f, "set<{inner}>"),
            Self::Sequence(inner) => write!(f, "sequence<{inner}>"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// A runtime value.
///
/// Equality is structural and total: values of differing kinds compare
/// unequal. Numbers are ordered with [`f64::total_cmp`], so `NaN` equals
/// itself and sets of numbers stay well-formed.
///
/// Serialized untagged: documents write plain YAML/JSON scalars and lists.
/// A list always reads back as a sequence, a string always as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// DOM element reference
    Element(ElementRef),
    /// Ordered sequence
    Sequence(Vec<Value>),
    /// Unordered, deduplicated set
    Set(BTreeSet<Value>),
}

impl Value {
    /// Build a string value
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Build a set value, deduplicating
    #[must_use]
    pub fn set(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    /// Build a sequence value
    #[must_use]
    pub fn sequence(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    /// Kind of this value. Empty containers report `Any` as their element kind.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Element(_) => ValueKind::Element,
            Self::Set(items) => {
                ValueKind::set_of(items.iter().next().map_or(ValueKind::Any, Self::kind))
            }
            Self::Sequence(items) => {
                ValueKind::sequence_of(items.first().map_or(ValueKind::Any, Self::kind))
            }
        }
    }

    /// Get as bool
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as element reference
    #[must_use]
    pub const fn as_element(&self) -> Option<&ElementRef> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Elements of a set (in set order) or sequence (in sequence order)
    #[must_use]
    pub fn items(&self) -> Option<Vec<&Self>> {
        match self {
            Self::Set(items) => Some(items.iter().collect()),
            Self::Sequence(items) => Some(items.iter().collect()),
            _ => None,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::String(_) => 2,
            Self::Element(_) => 3,
            Self::Set(_) => 4,
            Self::Sequence(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Element(a), Self::Element(b)) => a.cmp(b),
            (Self::Set(a), Self::Set(b)) => a.cmp(b),
            (Self::Sequence(a), Self::Sequence(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ElementRef> for Value {
    fn from(e: ElementRef) -> Self {
        Self::Element(e)
    }
}

fn write_items<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Element(e) => write!(f, "{e}"),
            Self::Set(items) => {
                write!(f, "{{")?;
                write_items(f, items.iter())?;
                write!(f, "}}")
            }
            Self::Sequence(items) => {
                write!(f, "[")?;
                write_items(f, items.iter())?;
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod equality_tests {
        use super::*;

        #[test]
        fn test_differing_kinds_are_unequal() {
            assert_ne!(Value::Bool(true), Value::Number(1.0));
            assert_ne!(Value::string("1"), Value::Number(1.0));
            assert_ne!(Value::set([]), Value::sequence([]));
        }

        #[test]
        fn test_nan_equals_itself() {
            assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        }

        #[test]
        fn test_set_deduplicates() {
            let set = Value::set([Value::from(1.0), Value::from(1.0), Value::from(2.0)]);
            assert_eq!(set.items().map(|i| i.len()), Some(2));
        }

        #[test]
        fn test_sequence_keeps_repeats_and_order() {
            let seq = Value::sequence([Value::from("b"), Value::from("a"), Value::from("b")]);
            let items = seq.items().unwrap();
            assert_eq!(items.len(), 3);
            assert_eq!(items[0], &Value::from("b"));
        }
    }

    mod kind_tests {
        use super::*;

        #[test]
        fn test_kind_of_empty_container_is_any() {
            assert_eq!(Value::set([]).kind(), ValueKind::set_of(ValueKind::Any));
        }

        #[test]
        fn test_unify_resolves_any() {
            let any_set = ValueKind::set_of(ValueKind::Any);
            let num_set = ValueKind::set_of(ValueKind::Number);
            assert_eq!(any_set.unify(&num_set), Some(num_set.clone()));
            assert_eq!(num_set.unify(&ValueKind::set_of(ValueKind::String)), None);
            assert_eq!(ValueKind::Bool.unify(&ValueKind::Number), None);
        }

        #[test]
        fn test_kind_display() {
            let kind = ValueKind::sequence_of(ValueKind::Element);
            assert_eq!(kind.to_string(), "sequence<element>");
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_display_containers() {
            let seq = Value::sequence([Value::from("a"), Value::Bool(false)]);
            assert_eq!(seq.to_string(), "[\"a\", false]");
            let set = Value::set([Value::from(2.0), Value::from(1.0)]);
            assert_eq!(set.to_string(), "{1, 2}");
        }

        #[test]
        fn test_display_element() {
            assert_eq!(Value::from(ElementRef::new("e3")).to_string(), "<e3>");
        }
    }
}
