//! Conducta: specification-driven testing for web applications
//!
//! A specification is a temporal-logic proposition over DOM snapshots plus
//! the actions a user may take. Conducta generates random action sequences
//! that are valid in the page's current state, drives them through a
//! browser, records every state the page goes through, and evaluates the
//! proposition over the recorded behavior. A rejecting sequence is shrunk by
//! delta debugging to a minimal counterexample.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       CONDUCTA Architecture                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐   │
//! │  │ Spec       │   │ Generator  │   │ Executor   │   │ Browser    │   │
//! │  │ (validated)│──►│ (seeded)   │──►│ (snapshot) │──►│ Driver     │   │
//! │  └────────────┘   └────────────┘   └─────┬──────┘   └────────────┘   │
//! │        │                                 │ Behavior                  │
//! │        ▼                                 ▼                           │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐                    │
//! │  │ Checker    │◄──│ Evaluator  │◄──│ States     │                    │
//! │  │            │   │ (pure)     │   │            │                    │
//! │  └─────┬──────┘   └────────────┘   └────────────┘                    │
//! │        ▼ rejected                                                    │
//! │  ┌────────────┐   ┌────────────┐                                     │
//! │  │ Shrinker   │──►│ Report     │                                     │
//! │  └────────────┘   └────────────┘                                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use conducta::prelude::*;
//!
//! let spec = Specification::from_file("todo.yaml")?.validate()?;
//! let mut driver = ChromiumDriver::launch(DriverConfig::default()).await?;
//! let report = Checker::new(&mut driver, &spec, CheckConfig::new("http://localhost:8080"))
//!     .check()
//!     .await;
//! println!("{}", report.render());
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod action;
mod assertion;
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
mod cdp;
#[allow(clippy::missing_errors_doc)]
mod checker;
mod driver;
#[allow(clippy::missing_errors_doc)]
mod eval;
#[allow(clippy::missing_errors_doc)]
mod executor;
mod formula;
mod generator;
mod query;
#[allow(clippy::missing_errors_doc)]
mod report;
mod result;
mod shrink;
#[allow(clippy::missing_errors_doc)]
mod spec;
mod state;
mod typecheck;
mod value;
mod wait;

/// Scriptable in-memory driver for tests and demos
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod mock;

pub use action::{
    candidates, is_valid, valid_actions, Action, ActionTemplate, Candidate, Interaction, Target,
    TemplateKind,
};
pub use assertion::{Assertion, AssertionResult, Predicate};
#[cfg(feature = "browser")]
pub use cdp::ChromiumDriver;
pub use checker::{
    CheckConfig, CheckEvent, CheckPhase, Checker, ProgressHook, RunOutcome, DEFAULT_MAX_ACTIONS,
    DEFAULT_TESTS,
};
pub use driver::{BrowserDriver, DriverConfig, DriverError};
pub use eval::Evaluator;
pub use executor::{BehaviorExecutor, ExecutionError, ExecutionFailure};
pub use formula::{Comparison, Dependencies, Formula, OperatorDef};
pub use generator::{ActionGenerator, Seed, Weighting};
pub use query::{run_query, Expect, Query, QueryAssertion, QueryError, Selector};
pub use report::{Counterexample, InconclusiveReason, Report, RunSummary, Verdict};
pub use result::{ConductaError, ConductaResult, ConstructionError, EvalError, SpecError};
pub use shrink::{
    shrink, Oracle, ShrinkOptions, ShrinkOutcome, ShrinkSearch, TrialOutcome,
    DEFAULT_MAX_TRIALS, DEFAULT_TRIAL_RETRIES,
};
pub use spec::{Specification, ValidatedSpec};
pub use state::{Behavior, ElementSnapshot, State, LOADED};
pub use value::{ElementRef, Value, ValueKind};
pub use wait::{
    guarded, AbortHandle, AbortSignal, Interrupt, WaitOptions, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_SETTLE_TIMEOUT_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::action::*;
    pub use super::assertion::*;
    #[cfg(feature = "browser")]
    pub use super::cdp::*;
    pub use super::checker::*;
    pub use super::driver::*;
    pub use super::eval::*;
    pub use super::executor::*;
    pub use super::formula::*;
    pub use super::generator::*;
    pub use super::mock::*;
    pub use super::query::*;
    pub use super::report::*;
    pub use super::result::*;
    pub use super::shrink::*;
    pub use super::spec::*;
    pub use super::state::*;
    pub use super::value::*;
    pub use super::wait::*;
}
