//! Result and error types for Conducta.

use crate::value::{ElementRef, ValueKind};
use thiserror::Error;

/// Result type for Conducta operations
pub type ConductaResult<T> = Result<T, ConductaError>;

/// Errors that can occur while checking a specification
#[derive(Debug, Error)]
pub enum ConductaError {
    /// The specification is not well-formed
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// The specification document could not be loaded
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// The browser driver failed outside of a run
    #[error("Driver error: {0}")]
    Driver(#[from] crate::driver::DriverError),

    /// The check was aborted externally
    #[error("Check aborted")]
    Aborted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Well-formedness errors, detected before anything is executed.
///
/// `fragment` holds the offending formula rendered in surface syntax.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    /// `next` applied to a formula that itself contains a temporal modality
    #[error("nested temporal modality inside next: {fragment}")]
    NestedNext {
        /// Offending formula
        fragment: String,
    },

    /// Operator references form a cycle
    #[error("recursive operator definition: {}", cycle.join(" -> "))]
    RecursiveOperator {
        /// Operators on the cycle, first repeated at the end
        cycle: Vec<String>,
    },

    /// Two operators share a name
    #[error("operator '{name}' is defined more than once")]
    DuplicateOperator {
        /// Operator name
        name: String,
    },

    /// Call to an operator that does not exist
    #[error("unknown operator '{name}' in {fragment}")]
    UnknownOperator {
        /// Operator name
        name: String,
        /// Offending formula
        fragment: String,
    },

    /// Call with the wrong number of arguments
    #[error("operator '{name}' expects {expected} argument(s), got {found} in {fragment}")]
    ArityMismatch {
        /// Operator name
        name: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
        /// Offending formula
        fragment: String,
    },

    /// Variable used outside of its binder
    #[error("unbound variable '{name}' in {fragment}")]
    UnboundVariable {
        /// Variable name
        name: String,
        /// Offending formula
        fragment: String,
    },

    /// Reference to a query assertion helper that does not exist
    #[error("unknown helper '{name}'")]
    UnknownHelper {
        /// Helper name
        name: String,
    },

    /// A sub-formula has the wrong kind
    #[error("expected {expected}, found {found} in {fragment}")]
    KindMismatch {
        /// Description of the expected kind
        expected: String,
        /// Inferred kind
        found: ValueKind,
        /// Offending formula
        fragment: String,
    },

    /// Assertion variant cannot apply to the query's value kind
    #[error("{assertion} assertion cannot apply to {kind} query on '{selector}'")]
    AssertionKind {
        /// Assertion variant name
        assertion: String,
        /// Kind produced by the query
        kind: ValueKind,
        /// Query selector
        selector: String,
    },

    /// Regular expression failed to compile
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Action template is malformed
    #[error("invalid action template '{name}': {message}")]
    InvalidAction {
        /// Template name or kind
        name: String,
        /// What is wrong
        message: String,
    },
}

/// Errors raised while evaluating a formula against a behavior.
///
/// Any of these makes the run inconclusive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// `next` reached past the last recorded state
    #[error("no state after position {position}")]
    NoNextState {
        /// Position `next` was evaluated at
        position: usize,
    },

    /// Element projection on an element absent from the current state
    #[error("stale element {element} at position {position}")]
    StaleElement {
        /// Referenced element
        element: ElementRef,
        /// Position of the projection
        position: usize,
    },

    /// Evaluation started outside the behavior
    #[error("position {position} is outside a behavior of {len} state(s)")]
    PositionOutOfRange {
        /// Requested position
        position: usize,
        /// Behavior length
        len: usize,
    },

    /// A query assertion helper could not be decided
    #[error("query failed at position {position}: {source}")]
    Query {
        /// Position of the query
        position: usize,
        /// Underlying query error
        source: crate::query::QueryError,
    },

    /// Selector was not captured in the state (missing dependency)
    #[error("selector '{selector}' was not captured at position {position}")]
    Uncaptured {
        /// Selector
        selector: String,
        /// Position of the query
        position: usize,
    },

    /// A value had an unexpected kind at runtime
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        /// Expected kind
        expected: String,
        /// Actual value rendered
        found: String,
    },
}

/// Errors loading a specification document
#[derive(Debug, Error)]
pub enum SpecError {
    /// YAML could not be parsed into a specification
    #[error("failed to parse specification: {message}")]
    Parse {
        /// Parser message
        message: String,
    },

    /// File could not be read
    #[error("failed to read specification {path}: {source}")]
    Read {
        /// Path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
}
