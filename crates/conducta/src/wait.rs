//! Wait Mechanisms
//!
//! Bounded waits and external cancellation for driver calls. Every call into
//! a [`crate::driver::BrowserDriver`] is a suspension point: it races the
//! abort signal and, for the ready condition and post-action settle, a
//! timeout. Nothing here retries; retry policy belongs to the driver and the
//! shrinker.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for the ready condition (30 seconds)
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for one action to settle (5 seconds)
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Timeouts applied by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// How long to poll for the ready condition, in milliseconds
    pub ready_timeout_ms: u64,
    /// How long one action plus its snapshot may take, in milliseconds
    pub settle_timeout_ms: u64,
    /// Polling interval for the ready condition, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ready timeout in milliseconds
    #[must_use]
    pub const fn with_ready_timeout(mut self, timeout_ms: u64) -> Self {
        self.ready_timeout_ms = timeout_ms;
        self
    }

    /// Set the settle timeout in milliseconds
    #[must_use]
    pub const fn with_settle_timeout(mut self, timeout_ms: u64) -> Self {
        self.settle_timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Ready timeout as Duration
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Settle timeout as Duration
    #[must_use]
    pub const fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Triggers an abort observed by every [`AbortSignal`] cloned from it
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Create a handle that has not fired
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort; takes effect at the next suspension point
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether abort was requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Signal observed by a run
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an [`AbortHandle`]
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether abort was requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once abort is requested; pending forever if it never is
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            // Handle dropped without aborting
            std::future::pending::<()>().await;
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Why a guarded call did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The abort signal fired
    Aborted,
    /// The time limit elapsed
    TimedOut {
        /// Limit that elapsed
        after: Duration,
    },
}

/// Run `future` until it completes, `signal` fires, or `limit` elapses
pub async fn guarded<F: Future>(
    signal: &AbortSignal,
    limit: Option<Duration>,
    future: F,
) -> Result<F::Output, Interrupt> {
    if signal.is_aborted() {
        return Err(Interrupt::Aborted);
    }
    let bounded = async {
        match limit {
            Some(after) => tokio::time::timeout(after, future)
                .await
                .map_err(|_| Interrupt::TimedOut { after }),
            None => Ok(future.await),
        }
    };
    tokio::select! {
        biased;
        () = signal.aborted() => Err(Interrupt::Aborted),
        result = bounded => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let options = WaitOptions::default();
            assert_eq!(options.ready_timeout(), Duration::from_secs(30));
            assert_eq!(options.settle_timeout(), Duration::from_secs(5));
            assert_eq!(options.poll_interval(), Duration::from_millis(50));
        }

        #[test]
        fn test_builders() {
            let options = WaitOptions::new()
                .with_ready_timeout(100)
                .with_settle_timeout(20)
                .with_poll_interval(5);
            assert_eq!(options.ready_timeout_ms, 100);
            assert_eq!(options.settle_timeout_ms, 20);
            assert_eq!(options.poll_interval_ms, 5);
        }
    }

    mod abort_tests {
        use super::*;

        #[test]
        fn test_abort_reaches_every_signal() {
            let handle = AbortHandle::new();
            let a = handle.signal();
            let b = a.clone();
            assert!(!a.is_aborted());
            handle.abort();
            assert!(a.is_aborted());
            assert!(b.is_aborted());
            assert!(handle.is_aborted());
        }

        #[test]
        fn test_never_signal() {
            assert!(!AbortSignal::never().is_aborted());
        }
    }

    mod guarded_tests {
        use super::*;

        #[tokio::test]
        async fn test_completes() {
            let result = guarded(&AbortSignal::never(), None, async { 7 }).await;
            assert_eq!(result, Ok(7));
        }

        #[tokio::test]
        async fn test_times_out() {
            let limit = Duration::from_millis(10);
            let result = guarded(
                &AbortSignal::never(),
                Some(limit),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await;
            assert_eq!(result, Err(Interrupt::TimedOut { after: limit }));
        }

        #[tokio::test]
        async fn test_already_aborted() {
            let handle = AbortHandle::new();
            handle.abort();
            let result = guarded(&handle.signal(), None, async { 1 }).await;
            assert_eq!(result, Err(Interrupt::Aborted));
        }

        #[tokio::test]
        async fn test_abort_interrupts_pending_call() {
            let handle = AbortHandle::new();
            let signal = handle.signal();
            let trigger = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                trigger.abort();
            });
            let result = guarded(&signal, None, tokio::time::sleep(Duration::from_secs(5))).await;
            assert_eq!(result, Err(Interrupt::Aborted));
        }
    }
}
