//! Checker - runs a validated specification against a live application
//!
//! Each test navigates to the origin, waits for the ready condition, then
//! interleaves generation and execution: an action is drawn from the actions
//! valid in the latest observed state, performed, and the new state
//! recorded. When the action budget is spent (or nothing is valid) the
//! proposition is evaluated over the recorded behavior.
//!
//! ```text
//! Idle → NavigatingToOrigin → WaitingReady → Generating ⇄ Executing → Evaluating
//!                                                                        │
//!                               ┌──────────────┬─────────────────────────┤
//!                               ▼              ▼                         ▼
//!                            Accepted   Rejected → Shrinking        Inconclusive
//! ```
//!
//! The first rejection stops the check; it is shrunk by replaying candidate
//! subsequences against fresh navigations.

use crate::action::Action;
use crate::driver::BrowserDriver;
use crate::eval::Evaluator;
use crate::executor::{BehaviorExecutor, ExecutionError};
use crate::generator::{ActionGenerator, Seed, Weighting};
use crate::report::{Counterexample, InconclusiveReason, Report, RunSummary, Verdict};
use crate::shrink::{shrink, Oracle, ShrinkOptions, TrialOutcome};
use crate::spec::ValidatedSpec;
use crate::state::Behavior;
use crate::wait::{AbortSignal, WaitOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Default number of actions per test
pub const DEFAULT_MAX_ACTIONS: usize = 20;

/// Default number of tests per check
pub const DEFAULT_TESTS: usize = 10;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// URL every test starts from
    pub origin: String,
    /// Maximum actions per test
    pub max_actions: usize,
    /// Number of tests
    pub tests: usize,
    /// Seed of the whole check; test `i` uses `seed.derive(i)`
    pub seed: Seed,
    /// Shrink the first rejecting sequence
    pub shrink: bool,
    /// Maximum shrink trials, retries included
    pub max_shrink_trials: usize,
    /// Re-attempts for a shrink trial that could not complete
    pub trial_retries: usize,
    /// How actions are drawn
    pub weighting: Weighting,
    /// Executor timeouts
    pub wait: WaitOptions,
}

impl Default for CheckConfig {
    fn default() -> Self {
        let shrink = ShrinkOptions::default();
        Self {
            origin: String::new(),
            max_actions: DEFAULT_MAX_ACTIONS,
            tests: DEFAULT_TESTS,
            seed: Seed::default(),
            shrink: true,
            max_shrink_trials: shrink.max_trials,
            trial_retries: shrink.retries,
            weighting: Weighting::default(),
            wait: WaitOptions::default(),
        }
    }
}

impl CheckConfig {
    /// Create a config for `origin` with defaults
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Set the action budget per test
    #[must_use]
    pub const fn with_max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    /// Set the number of tests
    #[must_use]
    pub const fn with_tests(mut self, tests: usize) -> Self {
        self.tests = tests;
        self
    }

    /// Set the seed
    #[must_use]
    pub const fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable shrinking
    #[must_use]
    pub const fn with_shrink(mut self, shrink: bool) -> Self {
        self.shrink = shrink;
        self
    }

    /// Set the shrink trial budget
    #[must_use]
    pub const fn with_max_shrink_trials(mut self, trials: usize) -> Self {
        self.max_shrink_trials = trials;
        self
    }

    /// Set the retries per shrink trial
    #[must_use]
    pub const fn with_trial_retries(mut self, retries: usize) -> Self {
        self.trial_retries = retries;
        self
    }

    /// Set the weighting scheme
    #[must_use]
    pub const fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Set the executor timeouts
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Shrink limits
    #[must_use]
    pub const fn shrink_options(&self) -> ShrinkOptions {
        ShrinkOptions {
            max_trials: self.max_shrink_trials,
            retries: self.trial_retries,
        }
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Where a test currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckPhase {
    /// Nothing started
    Idle,
    /// Loading the origin
    NavigatingToOrigin,
    /// Polling the ready condition
    WaitingReady,
    /// Drawing the next action
    Generating,
    /// Performing an action and snapshotting
    Executing,
    /// Evaluating the proposition
    Evaluating,
    /// Minimizing a rejecting sequence
    Shrinking,
    /// Proposition held
    Accepted,
    /// Proposition failed
    Rejected,
    /// Run could not be completed or decided
    Inconclusive,
}

impl CheckPhase {
    /// Check if the phase ends a test
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Inconclusive)
    }
}

impl From<Verdict> for CheckPhase {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accepted => Self::Accepted,
            Verdict::Rejected => Self::Rejected,
            Verdict::Inconclusive => Self::Inconclusive,
        }
    }
}

/// Progress events emitted during a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckEvent {
    /// A test began
    TestStarted {
        /// Test index
        test: usize,
        /// Seed of the test
        seed: Seed,
    },
    /// A test moved to a new phase
    Phase {
        /// Test index
        test: usize,
        /// New phase
        phase: CheckPhase,
    },
    /// An action was performed
    ActionPerformed {
        /// Test index
        test: usize,
        /// Position of the action
        index: usize,
        /// The action
        action: Action,
    },
    /// A test finished
    TestFinished(RunSummary),
    /// A shrink trial finished
    ShrinkTrial {
        /// Trials so far
        trials: usize,
        /// Length of the candidate
        candidate_len: usize,
        /// Whether it rejected
        rejected: bool,
    },
}

/// Callback receiving [`CheckEvent`]s
pub type ProgressHook = Box<dyn FnMut(&CheckEvent) + Send>;

#[derive(Default)]
struct Progress {
    phase: Option<CheckPhase>,
    hook: Option<ProgressHook>,
}

impl Progress {
    fn emit(&mut self, event: &CheckEvent) {
        if let Some(hook) = self.hook.as_mut() {
            hook(event);
        }
    }

    fn enter(&mut self, test: usize, phase: CheckPhase) {
        if self.phase == Some(phase) {
            return;
        }
        debug!(target: "conducta::checker", test, phase = ?phase, "phase");
        self.phase = Some(phase);
        self.emit(&CheckEvent::Phase { test, phase });
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("phase", &self.phase)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

// =============================================================================
// CHECKER
// =============================================================================

/// A finished test, before it is summarized
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Test summary
    pub summary: RunSummary,
    /// Actions performed (including a failed last one)
    pub actions: Vec<Action>,
    /// Recorded behavior: the full one for rejections, the states before
    /// the failing step when execution stopped early
    pub behavior: Option<Behavior>,
}

impl RunOutcome {
    /// An execution error ended the test; an abort discards `partial`
    fn inconclusive(
        index: usize,
        seed: Seed,
        actions: Vec<Action>,
        partial: Option<Behavior>,
        error: &ExecutionError,
    ) -> Self {
        let (reason, partial) = match error {
            ExecutionError::Aborted => (InconclusiveReason::Aborted, None),
            other => (
                InconclusiveReason::Execution {
                    message: other.to_string(),
                },
                partial,
            ),
        };
        Self {
            summary: RunSummary {
                index,
                seed,
                verdict: Verdict::Inconclusive,
                actions: actions.len(),
                reason: Some(reason),
                partial: partial.clone(),
            },
            actions,
            behavior: partial,
        }
    }
}

/// Runs checks of one specification through one driver session
#[derive(Debug)]
pub struct Checker<'a, D: BrowserDriver + ?Sized> {
    driver: &'a mut D,
    spec: &'a ValidatedSpec,
    config: CheckConfig,
    signal: AbortSignal,
    progress: Progress,
}

impl<'a, D: BrowserDriver + ?Sized> Checker<'a, D> {
    /// Create a checker
    pub fn new(driver: &'a mut D, spec: &'a ValidatedSpec, config: CheckConfig) -> Self {
        Self {
            driver,
            spec,
            config,
            signal: AbortSignal::never(),
            progress: Progress::default(),
        }
    }

    /// Observe an abort signal
    #[must_use]
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Receive progress events
    #[must_use]
    pub fn with_progress(mut self, hook: impl FnMut(&CheckEvent) + Send + 'static) -> Self {
        self.progress.hook = Some(Box::new(hook));
        self
    }

    /// Current phase of the test in progress
    #[must_use]
    pub fn phase(&self) -> CheckPhase {
        self.progress.phase.unwrap_or(CheckPhase::Idle)
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Run every test, stopping at the first rejection or on abort
    pub async fn check(&mut self) -> Report {
        let mut report = Report::new(self.config.clone());
        info!(
            target: "conducta::checker",
            origin = %self.config.origin,
            tests = self.config.tests,
            seed = %self.config.seed,
            "check started"
        );

        for test in 0..self.config.tests {
            let seed = self.config.seed.derive(test as u64);
            let outcome = self.run_test(test, seed).await;
            let summary = outcome.summary.clone();
            report.record(summary.clone());

            match summary.verdict {
                Verdict::Rejected => {
                    if let Some(behavior) = outcome.behavior {
                        report.counterexample =
                            Some(self.counterexample(test, seed, outcome.actions, behavior).await);
                    }
                    break;
                }
                _ if summary.reason == Some(InconclusiveReason::Aborted) => break,
                _ => {}
            }
        }

        report.finish();
        info!(
            target: "conducta::checker",
            verdict = %report.verdict,
            tests = report.runs.len(),
            "check finished"
        );
        report
    }

    /// Run a single test with the given seed
    pub async fn run_test(&mut self, test: usize, seed: Seed) -> RunOutcome {
        self.progress.phase = None;
        self.progress.emit(&CheckEvent::TestStarted { test, seed });
        debug!(target: "conducta::checker", test, seed = %seed, "test started");

        let outcome = self.execute_test(test, seed).await;
        self.progress.enter(test, outcome.summary.verdict.into());
        match &outcome.summary.reason {
            Some(reason) => warn!(
                target: "conducta::checker",
                test,
                reason = %reason,
                "test inconclusive"
            ),
            None => info!(
                target: "conducta::checker",
                test,
                verdict = %outcome.summary.verdict,
                actions = outcome.actions.len(),
                "test finished"
            ),
        }
        self.progress
            .emit(&CheckEvent::TestFinished(outcome.summary.clone()));
        outcome
    }

    async fn execute_test(&mut self, test: usize, seed: Seed) -> RunOutcome {
        let spec = self.spec;
        let mut executor = BehaviorExecutor::new(&mut *self.driver, spec)
            .with_wait(self.config.wait)
            .with_abort(self.signal.clone());
        let mut actions = Vec::new();
        let inconclusive = |actions, partial, error: &ExecutionError| {
            RunOutcome::inconclusive(test, seed, actions, partial, error)
        };

        self.progress.enter(test, CheckPhase::NavigatingToOrigin);
        if let Err(error) = executor.open(&self.config.origin).await {
            return inconclusive(actions, None, &error);
        }
        self.progress.enter(test, CheckPhase::WaitingReady);
        let mut behavior = match executor.await_ready(spec.ready()).await {
            Ok(initial) => Behavior::new(initial),
            Err(error) => return inconclusive(actions, None, &error),
        };

        let mut generator = ActionGenerator::new(seed).with_weighting(self.config.weighting);
        while actions.len() < self.config.max_actions {
            self.progress.enter(test, CheckPhase::Generating);
            let Some(action) = generator.next_action(behavior.last(), spec.actions()) else {
                debug!(target: "conducta::checker", test, "no valid actions");
                break;
            };
            self.progress.enter(test, CheckPhase::Executing);
            let index = actions.len();
            let result = executor.step(index, behavior.last(), &action).await;
            actions.push(action.clone());
            match result {
                Ok(state) => {
                    behavior.push(state);
                    self.progress.emit(&CheckEvent::ActionPerformed {
                        test,
                        index,
                        action,
                    });
                }
                Err(error) => return inconclusive(actions, Some(behavior), &error),
            }
        }

        self.progress.enter(test, CheckPhase::Evaluating);
        let (verdict, reason) = match Evaluator::new(spec).verdict(&behavior) {
            Ok(true) => (Verdict::Accepted, None),
            Ok(false) => (Verdict::Rejected, None),
            Err(error) => (
                Verdict::Inconclusive,
                Some(InconclusiveReason::Evaluation {
                    message: error.to_string(),
                }),
            ),
        };
        RunOutcome {
            summary: RunSummary {
                index: test,
                seed,
                verdict,
                actions: actions.len(),
                reason,
                partial: None,
            },
            actions,
            behavior: verdict.is_rejected().then_some(behavior),
        }
    }

    async fn counterexample(
        &mut self,
        test: usize,
        seed: Seed,
        original: Vec<Action>,
        behavior: Behavior,
    ) -> Counterexample {
        if !self.config.shrink {
            return Counterexample {
                test,
                seed,
                shrunk: original.clone(),
                original,
                trials: 0,
                shrink_complete: false,
                behavior,
            };
        }

        self.progress.enter(test, CheckPhase::Shrinking);
        info!(
            target: "conducta::checker",
            test,
            actions = original.len(),
            "shrinking rejected sequence"
        );
        let mut oracle = ReplayOracle {
            driver: &mut *self.driver,
            spec: self.spec,
            origin: &self.config.origin,
            wait: self.config.wait,
            signal: self.signal.clone(),
            progress: &mut self.progress,
            trials: 0,
            last_rejecting: None,
        };
        let outcome = shrink(original.clone(), &mut oracle, self.config.shrink_options()).await;
        let shrunk_behavior = match oracle.last_rejecting.take() {
            Some((actions, replayed)) if actions == outcome.minimal => replayed,
            _ => behavior,
        };
        Counterexample {
            test,
            seed,
            original,
            shrunk: outcome.minimal,
            trials: outcome.trials,
            shrink_complete: outcome.complete,
            behavior: shrunk_behavior,
        }
    }
}

/// Decides shrink candidates by replaying them from a fresh navigation
struct ReplayOracle<'o, D: BrowserDriver + ?Sized> {
    driver: &'o mut D,
    spec: &'o ValidatedSpec,
    origin: &'o str,
    wait: WaitOptions,
    signal: AbortSignal,
    progress: &'o mut Progress,
    trials: usize,
    last_rejecting: Option<(Vec<Action>, Behavior)>,
}

impl<D: BrowserDriver + ?Sized> ReplayOracle<'_, D> {
    async fn replay(&mut self, candidate: &[Action]) -> TrialOutcome {
        let mut executor = BehaviorExecutor::new(&mut *self.driver, self.spec)
            .with_wait(self.wait)
            .with_abort(self.signal.clone());
        match executor.execute(self.origin, self.spec.ready(), candidate).await {
            Ok(behavior) => match Evaluator::new(self.spec).verdict(&behavior) {
                Ok(false) => {
                    self.last_rejecting = Some((candidate.to_vec(), behavior));
                    TrialOutcome::Rejects
                }
                Ok(true) => TrialOutcome::NotRejected,
                Err(error) => {
                    debug!(target: "conducta::shrink", error = %error, "candidate undecided");
                    TrialOutcome::NotRejected
                }
            },
            Err(failure) => match failure.error {
                ExecutionError::Aborted => TrialOutcome::Aborted,
                error if error.is_retryable() => TrialOutcome::Incomplete {
                    reason: error.to_string(),
                },
                error => {
                    debug!(target: "conducta::shrink", error = %error, "candidate not replayable");
                    TrialOutcome::NotRejected
                }
            },
        }
    }
}

#[async_trait]
impl<D: BrowserDriver + ?Sized> Oracle<Action> for ReplayOracle<'_, D> {
    async fn trial(&mut self, candidate: &[Action]) -> TrialOutcome {
        let outcome = self.replay(candidate).await;
        self.trials += 1;
        self.progress.emit(&CheckEvent::ShrinkTrial {
            trials: self.trials,
            candidate_len: candidate.len(),
            rejected: outcome == TrialOutcome::Rejects,
        });
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::ActionTemplate;
    use crate::driver::DriverError;
    use crate::formula::{Comparison, Formula};
    use crate::mock::{MockDriver, MockElement, MockPage};
    use crate::spec::Specification;
    use crate::state::ElementSnapshot;
    use crate::wait::AbortHandle;
    use std::sync::{Arc, Mutex};

    /// A counter whose display breaks once it reaches `limit`
    #[derive(Debug)]
    struct Counter {
        count: u32,
        limit: u32,
    }

    impl MockPage for Counter {
        fn render(&self) -> Vec<MockElement> {
            let shown = if self.count >= self.limit {
                "NaN".to_string()
            } else {
                self.count.to_string()
            };
            vec![
                MockElement::new("count", ["#count"], ElementSnapshot::new("span", shown)),
                MockElement::new("inc", ["#inc"], ElementSnapshot::new("button", "+")),
                MockElement::new("noop", ["#noop"], ElementSnapshot::new("button", "?")),
            ]
        }

        fn handle(&mut self, _action: &Action, element: &MockElement) -> Result<(), DriverError> {
            if element.id == "inc" {
                self.count += 1;
            }
            Ok(())
        }
    }

    /// `always(forall c in query("#count"): length(c.text) < 3)`
    fn spec() -> ValidatedSpec {
        let short = Formula::compare(
            Comparison::Lt,
            Formula::length(Formula::text(Formula::var("c"))),
            Formula::number(3.0),
        );
        Specification::new(
            "#count",
            Formula::always(Formula::forall("c", Formula::query("#count"), short)),
        )
        .with_action(ActionTemplate::click("#inc"))
        .with_action(ActionTemplate::click("#noop"))
        .validate()
        .unwrap()
    }

    fn config() -> CheckConfig {
        CheckConfig::new("http://counter")
            .with_tests(5)
            .with_max_actions(12)
            .with_seed(Seed::from_u64(42))
            .with_wait(
                WaitOptions::new()
                    .with_ready_timeout(200)
                    .with_settle_timeout(200)
                    .with_poll_interval(5),
            )
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = CheckConfig::default();
            assert_eq!(config.max_actions, DEFAULT_MAX_ACTIONS);
            assert_eq!(config.tests, DEFAULT_TESTS);
            assert!(config.shrink);
            assert_eq!(config.shrink_options(), ShrinkOptions::default());
        }

        #[test]
        fn test_partial_yaml_fills_defaults() {
            let config: CheckConfig =
                serde_yaml_ng::from_str("origin: http://app\ntests: 3\n").unwrap();
            assert_eq!(config.origin, "http://app");
            assert_eq!(config.tests, 3);
            assert_eq!(config.max_actions, DEFAULT_MAX_ACTIONS);
        }
    }

    mod check_tests {
        use super::*;

        #[tokio::test]
        async fn test_accepts_when_limit_unreachable() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 1000 });
            let report = Checker::new(&mut driver, &spec, config()).check().await;
            assert_eq!(report.verdict, Verdict::Accepted);
            assert_eq!(report.runs.len(), 5);
            assert!(report.counterexample.is_none());
        }

        #[tokio::test]
        async fn test_rejects_and_shrinks_to_needed_clicks() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 3 });
            let report = Checker::new(&mut driver, &spec, config().with_max_actions(30))
                .check()
                .await;
            assert_eq!(report.verdict, Verdict::Rejected);
            let cex = report.counterexample.unwrap();
            let inc = Action::on(crate::action::Interaction::Click, "#inc", 0);
            assert_eq!(cex.shrunk, vec![inc.clone(), inc.clone(), inc]);
            assert_eq!(cex.behavior.len(), 4);
            assert!(cex.original.len() >= cex.shrunk.len());
            assert!(cex.shrink_complete);
        }

        #[tokio::test]
        async fn test_no_shrink_keeps_original() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 3 });
            let report = Checker::new(
                &mut driver,
                &spec,
                config().with_max_actions(30).with_shrink(false),
            )
            .check()
            .await;
            let cex = report.counterexample.unwrap();
            assert_eq!(cex.original, cex.shrunk);
            assert_eq!(cex.trials, 0);
        }

        #[tokio::test]
        async fn test_same_seed_same_report() {
            let spec = spec();
            let run = || async {
                let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 3 });
                Checker::new(&mut driver, &spec, config().with_max_actions(30))
                    .check()
                    .await
            };
            let a = run().await;
            let b = run().await;
            assert_eq!(a.runs, b.runs);
            assert_eq!(a.counterexample, b.counterexample);
        }

        #[tokio::test]
        async fn test_navigation_failure_is_inconclusive() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 3 });
            driver.inject_failure("navigate", DriverError::transient("dns"));
            let report = Checker::new(&mut driver, &spec, config().with_tests(1))
                .check()
                .await;
            assert_eq!(report.verdict, Verdict::Inconclusive);
            assert!(matches!(
                report.runs[0].reason,
                Some(InconclusiveReason::Execution { .. })
            ));
        }

        #[tokio::test]
        async fn test_rejected_action_keeps_partial_behavior() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 1000 });
            driver.inject_failure("perform", DriverError::rejected("stale"));
            let outcome = Checker::new(&mut driver, &spec, config())
                .run_test(0, Seed::from_u64(42))
                .await;
            assert_eq!(outcome.summary.verdict, Verdict::Inconclusive);
            assert!(matches!(
                outcome.summary.reason,
                Some(InconclusiveReason::Execution { ref message }) if message.contains("stale")
            ));
            let partial = outcome.behavior.expect("partial behavior");
            assert_eq!(partial.len(), 1);
            assert_eq!(partial.states()[0].happened(), crate::state::LOADED);
            assert_eq!(outcome.summary.partial, Some(partial));
        }

        #[tokio::test]
        async fn test_driver_failure_midway_keeps_earlier_states() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 1000 });
            driver.fail_every("perform", 3);
            let report = Checker::new(&mut driver, &spec, config().with_tests(1))
                .check()
                .await;
            assert_eq!(report.verdict, Verdict::Inconclusive);
            let run = &report.runs[0];
            assert_eq!(run.actions, 3);
            let partial = run.partial.as_ref().expect("partial behavior");
            assert_eq!(partial.len(), 3);
            assert!(report.render().contains("  0. loaded"));

            let json = report.to_json().unwrap();
            let back: Report = serde_json::from_str(&json).unwrap();
            assert_eq!(back.runs[0].partial.as_ref().map(Behavior::len), Some(3));
        }

        #[tokio::test]
        async fn test_transient_failures_while_shrinking_are_retried() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 3 });
            // Exploration navigates once; every replay's first navigation then fails
            driver.fail_every("navigate", 2);
            let report = Checker::new(
                &mut driver,
                &spec,
                config()
                    .with_max_actions(30)
                    .with_max_shrink_trials(2000)
                    .with_trial_retries(1),
            )
            .check()
            .await;
            assert_eq!(report.verdict, Verdict::Rejected);
            assert_eq!(report.runs.len(), 1);
            let cex = report.counterexample.unwrap();
            let inc = Action::on(crate::action::Interaction::Click, "#inc", 0);
            assert_eq!(cex.shrunk, vec![inc.clone(), inc.clone(), inc]);
            assert_eq!(cex.behavior.len(), 4);
            assert!(cex.shrink_complete);
            assert_eq!(cex.trials % 2, 0);
            let navigations = driver
                .history()
                .iter()
                .filter(|c| c.starts_with("navigate"))
                .count();
            assert_eq!(navigations, 1 + cex.trials);
        }

        #[tokio::test]
        async fn test_abort_stops_check() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 1000 });
            let handle = AbortHandle::new();
            handle.abort();
            let report = Checker::new(&mut driver, &spec, config())
                .with_abort(handle.signal())
                .check()
                .await;
            assert_eq!(report.runs.len(), 1);
            assert_eq!(report.runs[0].reason, Some(InconclusiveReason::Aborted));
            assert!(report.runs[0].partial.is_none());
            assert_eq!(report.verdict, Verdict::Inconclusive);
        }

        #[tokio::test]
        async fn test_progress_events() {
            let spec = spec();
            let mut driver = MockDriver::new(|_| Counter { count: 0, limit: 1000 });
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let mut checker = Checker::new(&mut driver, &spec, config().with_tests(1))
                .with_progress(move |event| sink.lock().unwrap().push(event.clone()));
            assert_eq!(checker.phase(), CheckPhase::Idle);
            checker.check().await;
            assert_eq!(checker.phase(), CheckPhase::Accepted);
            let events = events.lock().unwrap();
            assert!(matches!(events[0], CheckEvent::TestStarted { test: 0, .. }));
            let phases: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    CheckEvent::Phase { phase, .. } => Some(*phase),
                    _ => None,
                })
                .collect();
            assert_eq!(phases[0], CheckPhase::NavigatingToOrigin);
            assert_eq!(phases[1], CheckPhase::WaitingReady);
            assert_eq!(phases.last(), Some(&CheckPhase::Accepted));
            let performed = events
                .iter()
                .filter(|e| matches!(e, CheckEvent::ActionPerformed { .. }))
                .count();
            assert_eq!(performed, 12);
            assert!(matches!(events.last(), Some(CheckEvent::TestFinished(_))));
        }
    }
}
