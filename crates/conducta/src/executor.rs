//! Behavior execution.
//!
//! Drives actions one at a time through a [`BrowserDriver`], snapshotting
//! the specification's dependencies after each step. Actions are strictly
//! sequential: the next one is only submitted once the previous state has
//! been captured.

use crate::action::{is_valid, Action};
use crate::driver::{BrowserDriver, DriverError};
use crate::query::Selector;
use crate::spec::ValidatedSpec;
use crate::state::{Behavior, State, LOADED};
use crate::value::ElementRef;
use crate::wait::{guarded, AbortSignal, Interrupt, WaitOptions};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that end a behavior execution early
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The action could not be performed in the observed state
    #[error("action {index} ({action}) failed: {reason}")]
    ActionFailed {
        /// Position of the action in the sequence
        index: usize,
        /// Action rendered
        action: String,
        /// What went wrong
        reason: String,
    },

    /// A bounded wait elapsed
    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Limit in milliseconds
        ms: u64,
    },

    /// The run was aborted externally
    #[error("execution aborted")]
    Aborted,

    /// The driver failed
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ExecutionError {
    /// Whether the same execution might complete if attempted again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Driver(e) => e.is_retryable(),
            Self::ActionFailed { .. } | Self::Aborted => false,
        }
    }

    fn interrupted(interrupt: Interrupt, what: impl Into<String>) -> Self {
        match interrupt {
            Interrupt::Aborted => Self::Aborted,
            #[allow(clippy::cast_possible_truncation)]
            Interrupt::TimedOut { after } => Self::Timeout {
                what: what.into(),
                ms: after.as_millis() as u64,
            },
        }
    }
}

/// An execution that stopped early
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    /// Why it stopped
    pub error: ExecutionError,
    /// States recorded up to the last successful step, kept for diagnostics.
    /// `None` when the run was aborted.
    pub partial: Option<Behavior>,
}

/// Executes behaviors of one specification against one driver session
#[derive(Debug)]
pub struct BehaviorExecutor<'d, D: BrowserDriver + ?Sized> {
    driver: &'d mut D,
    spec: &'d ValidatedSpec,
    wait: WaitOptions,
    signal: AbortSignal,
}

impl<'d, D: BrowserDriver + ?Sized> BehaviorExecutor<'d, D> {
    /// Create an executor
    pub fn new(driver: &'d mut D, spec: &'d ValidatedSpec) -> Self {
        Self {
            driver,
            spec,
            wait: WaitOptions::default(),
            signal: AbortSignal::never(),
        }
    }

    /// Set the timeouts
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Observe an abort signal
    #[must_use]
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Navigate to `origin` and wait until `ready` matches; returns the initial state
    pub async fn start(&mut self, origin: &str, ready: &Selector) -> Result<State, ExecutionError> {
        self.open(origin).await?;
        self.await_ready(ready).await
    }

    /// Navigate to `origin`, starting a fresh page
    pub async fn open(&mut self, origin: &str) -> Result<(), ExecutionError> {
        debug!(target: "conducta::executor", origin, "navigating to origin");
        let signal = self.signal.clone();
        guarded(&signal, Some(self.wait.ready_timeout()), self.driver.navigate(origin))
            .await
            .map_err(|i| ExecutionError::interrupted(i, format!("navigation to {origin}")))??;
        Ok(())
    }

    /// Poll until `ready` matches, then capture the initial state
    pub async fn await_ready(&mut self, ready: &Selector) -> Result<State, ExecutionError> {
        let signal = self.signal.clone();
        let limit = Some(self.wait.ready_timeout());
        guarded(&signal, limit, self.wait_ready(ready))
            .await
            .map_err(|i| ExecutionError::interrupted(i, format!("ready condition '{ready}'")))??;
        let state = guarded(&signal, limit, self.snapshot(LOADED))
            .await
            .map_err(|i| ExecutionError::interrupted(i, "initial snapshot"))??;
        debug!(
            target: "conducta::executor",
            fingerprint = %state.fingerprint(),
            "page ready"
        );
        Ok(state)
    }

    async fn wait_ready(&mut self, ready: &Selector) -> Result<(), DriverError> {
        loop {
            if !self.driver.find_elements(ready).await?.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(self.wait.poll_interval()).await;
        }
    }

    /// Capture every dependency of the specification
    async fn snapshot(&mut self, happened: &str) -> Result<State, DriverError> {
        let dependencies = self.spec.dependencies();
        let mut state = State::new(happened);
        for selector in &dependencies.selectors {
            let found = self.driver.find_elements(selector).await?;
            let mut matches = Vec::with_capacity(found.len());
            for element in found {
                if state.element(&element).is_some() {
                    matches.push(element);
                    continue;
                }
                match self.driver.read_element(&element, &dependencies.styles).await {
                    Ok(snapshot) => {
                        state.capture_element(element.clone(), snapshot);
                        matches.push(element);
                    }
                    // Removed between the query and the read
                    Err(DriverError::StaleElement { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            state.capture_selector(selector.clone(), matches);
        }
        Ok(state)
    }

    fn resolve(state: &State, action: &Action) -> Option<Option<ElementRef>> {
        match &action.target {
            None => Some(None),
            Some(target) => state
                .query(&target.selector)
                .and_then(|matches| matches.get(target.index))
                .map(|element| Some(element.clone())),
        }
    }

    /// Perform `action` (the `index`-th of its sequence) from `current`; returns the next state
    pub async fn step(
        &mut self,
        index: usize,
        current: &State,
        action: &Action,
    ) -> Result<State, ExecutionError> {
        let failed = |reason: String| ExecutionError::ActionFailed {
            index,
            action: action.to_string(),
            reason,
        };
        if !is_valid(action, current, self.spec.actions()) {
            return Err(failed("not valid in the current state".to_string()));
        }
        let target = Self::resolve(current, action)
            .ok_or_else(|| failed("target element not found".to_string()))?;

        let signal = self.signal.clone();
        let limit = Some(self.wait.settle_timeout());
        let outcome = guarded(&signal, limit, async {
            self.driver.perform(action, target.as_ref()).await?;
            self.snapshot(action.label()).await
        })
        .await
        .map_err(|i| ExecutionError::interrupted(i, format!("action {index} to settle")))?;

        match outcome {
            Ok(state) => {
                debug!(
                    target: "conducta::executor",
                    index,
                    action = %action,
                    fingerprint = %state.fingerprint(),
                    "action performed"
                );
                Ok(state)
            }
            Err(e @ (DriverError::ActionRejected { .. } | DriverError::StaleElement { .. })) => {
                Err(failed(e.to_string()))
            }
            Err(e) => Err(ExecutionError::Driver(e)),
        }
    }

    /// Replay `actions` from a fresh navigation to `origin`
    pub async fn execute(
        &mut self,
        origin: &str,
        ready: &Selector,
        actions: &[Action],
    ) -> Result<Behavior, ExecutionFailure> {
        let initial = self.start(origin, ready).await.map_err(|error| ExecutionFailure {
            error,
            partial: None,
        })?;
        let mut behavior = Behavior::new(initial);
        for (index, action) in actions.iter().enumerate() {
            match self.step(index, behavior.last(), action).await {
                Ok(state) => behavior.push(state),
                Err(error) => {
                    warn!(target: "conducta::executor", index, error = %error, "execution stopped");
                    let partial = (error != ExecutionError::Aborted).then_some(behavior);
                    return Err(ExecutionFailure { error, partial });
                }
            }
        }
        Ok(behavior)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::{ActionTemplate, Interaction};
    use crate::driver::DriverError;
    use crate::formula::Formula;
    use crate::mock::{MockDriver, MockElement, MockPage};
    use crate::spec::Specification;
    use crate::state::ElementSnapshot;
    use crate::wait::AbortHandle;

    /// A toggle: clicking `#toggle` shows or hides `#panel`
    #[derive(Debug, Default)]
    struct Toggle {
        open: bool,
        ready: bool,
    }

    impl MockPage for Toggle {
        fn render(&self) -> Vec<MockElement> {
            let mut elements = vec![
                MockElement::new("toggle", ["#toggle"], ElementSnapshot::new("button", "Toggle")),
                MockElement::new(
                    "panel",
                    ["#panel"],
                    ElementSnapshot::new("div", "Panel").with_visible(self.open),
                ),
            ];
            if self.ready {
                elements.push(MockElement::new("app", ["#app"], ElementSnapshot::new("main", "")));
            }
            elements
        }

        fn handle(&mut self, _action: &Action, _element: &MockElement) -> Result<(), DriverError> {
            self.open = !self.open;
            Ok(())
        }
    }

    fn spec() -> ValidatedSpec {
        Specification::new("#app", Formula::truth())
            .with_action(ActionTemplate::click("#toggle"))
            .with_action(ActionTemplate::click("#panel"))
            .validate()
            .unwrap()
    }

    fn driver() -> MockDriver<Toggle> {
        MockDriver::new(|_| Toggle {
            open: false,
            ready: true,
        })
    }

    fn toggle() -> Action {
        Action::on(Interaction::Click, "#toggle", 0)
    }

    fn fast() -> WaitOptions {
        WaitOptions::new()
            .with_ready_timeout(100)
            .with_settle_timeout(100)
            .with_poll_interval(5)
    }

    #[tokio::test]
    async fn test_execute_records_one_state_per_action() {
        let spec = spec();
        let mut driver = driver();
        let mut executor = BehaviorExecutor::new(&mut driver, &spec).with_wait(fast());
        let behavior = executor
            .execute("http://app", spec.ready(), &[toggle(), toggle()])
            .await
            .unwrap();
        assert_eq!(behavior.len(), 3);
        assert_eq!(behavior.get(0).map(State::happened), Some(LOADED));
        assert_eq!(behavior.get(1).map(State::happened), Some("click"));
        let panel = |i: usize| {
            let state = behavior.get(i).unwrap();
            let element = &state.query(&Selector::new("#panel")).unwrap()[0];
            state.element(element).unwrap().visible
        };
        assert!(!panel(0));
        assert!(panel(1));
        assert!(!panel(2));
    }

    #[tokio::test]
    async fn test_invalid_action_fails_with_partial_behavior() {
        let spec = spec();
        let mut driver = driver();
        let mut executor = BehaviorExecutor::new(&mut driver, &spec).with_wait(fast());
        // The panel is hidden after two toggles, so clicking it is not valid
        let click_panel = Action::on(Interaction::Click, "#panel", 0);
        let failure = executor
            .execute("http://app", spec.ready(), &[toggle(), toggle(), click_panel])
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ExecutionError::ActionFailed { index: 2, .. }
        ));
        assert_eq!(failure.partial.map(|b| b.len()), Some(3));
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let spec = spec();
        let mut driver = MockDriver::new(|_| Toggle::default());
        let mut executor = BehaviorExecutor::new(&mut driver, &spec).with_wait(fast());
        let failure = executor
            .execute("http://app", spec.ready(), &[])
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ExecutionError::Timeout { ms: 100, .. }));
        assert!(failure.error.is_retryable());
        assert!(failure.partial.is_none());
    }

    #[tokio::test]
    async fn test_transient_driver_error_is_retryable() {
        let spec = spec();
        let mut driver = driver();
        driver.inject_failure("perform", DriverError::transient("socket reset"));
        let mut executor = BehaviorExecutor::new(&mut driver, &spec).with_wait(fast());
        let failure = executor
            .execute("http://app", spec.ready(), &[toggle()])
            .await
            .unwrap_err();
        assert!(failure.error.is_retryable());
        assert_eq!(failure.partial.map(|b| b.len()), Some(1));
    }

    #[tokio::test]
    async fn test_abort_discards_partial_behavior() {
        let spec = spec();
        let mut driver = driver();
        let handle = AbortHandle::new();
        handle.abort();
        let mut executor = BehaviorExecutor::new(&mut driver, &spec)
            .with_wait(fast())
            .with_abort(handle.signal());
        let failure = executor
            .execute("http://app", spec.ready(), &[toggle()])
            .await
            .unwrap_err();
        assert_eq!(failure.error, ExecutionError::Aborted);
        assert!(failure.partial.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_captures_only_dependencies() {
        let spec = spec();
        let mut driver = driver();
        let mut executor = BehaviorExecutor::new(&mut driver, &spec).with_wait(fast());
        let state = executor.start("http://app", spec.ready()).await.unwrap();
        let captured: Vec<_> = state.selectors().map(Selector::as_str).collect();
        assert_eq!(captured, vec!["#app", "#panel", "#toggle"]);
    }
}
