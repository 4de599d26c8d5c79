//! Delta-debugging shrinker.
//!
//! The search ([`ShrinkSearch`]) is pure: it proposes candidate subsequences
//! and is told whether each one still rejects. Deciding that is the job of an
//! [`Oracle`], which for real runs re-executes the candidate against a fresh
//! browser session. [`shrink`] ties the two together and owns the retry
//! policy for trials that could not be completed.
//!
//! ```text
//!   failing ──► ShrinkSearch ──candidate──► Oracle (replay + evaluate)
//!                    ▲                          │
//!                    └─────── rejects? ─────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default cap on oracle trials for one shrink
pub const DEFAULT_MAX_TRIALS: usize = 500;

/// Default number of re-attempts for a trial that could not complete
pub const DEFAULT_TRIAL_RETRIES: usize = 2;

/// Candidate-by-candidate ddmin search over a failing sequence.
///
/// Candidates are always order-preserving subsequences of the input. The
/// search removes contiguous chunks, starting with halves and refining down
/// to single elements, and stops at a fixed point where no single removal
/// still rejects. The empty sequence is proposed like any other candidate.
#[derive(Debug, Clone)]
pub struct ShrinkSearch<T> {
    current: Vec<T>,
    granularity: usize,
    chunk: usize,
    pending: Option<Vec<T>>,
    done: bool,
}

impl<T: Clone> ShrinkSearch<T> {
    /// Start from a sequence known to reject
    #[must_use]
    pub fn new(failing: Vec<T>) -> Self {
        let done = failing.is_empty();
        Self {
            current: failing,
            granularity: 2,
            chunk: 0,
            pending: None,
            done,
        }
    }

    fn chunks(&self) -> usize {
        self.granularity.min(self.current.len()).max(1)
    }

    /// Next candidate to try, `None` once the search is finished.
    ///
    /// Calling this again before [`Self::report`] returns the same candidate.
    pub fn next_candidate(&mut self) -> Option<Vec<T>> {
        if self.done {
            return None;
        }
        if let Some(pending) = &self.pending {
            return Some(pending.clone());
        }
        let len = self.current.len();
        let n = self.chunks();
        let start = self.chunk * len / n;
        let end = (self.chunk + 1) * len / n;
        let candidate: Vec<T> = self.current[..start]
            .iter()
            .chain(&self.current[end..])
            .cloned()
            .collect();
        self.pending = Some(candidate.clone());
        Some(candidate)
    }

    /// Record whether the last candidate still rejects
    pub fn report(&mut self, rejects: bool) {
        let Some(candidate) = self.pending.take() else {
            return;
        };
        if rejects {
            self.current = candidate;
            self.granularity = self.granularity.saturating_sub(1).max(2);
            self.chunk = 0;
            self.done = self.current.is_empty();
            return;
        }
        let n = self.chunks();
        self.chunk += 1;
        if self.chunk >= n {
            if n >= self.current.len() {
                self.done = true;
            } else {
                self.granularity = (n * 2).min(self.current.len());
                self.chunk = 0;
            }
        }
    }

    /// Smallest rejecting sequence found so far
    #[must_use]
    pub fn current(&self) -> &[T] {
        &self.current
    }

    /// Whether a fixed point was reached
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Consume the search, returning the smallest rejecting sequence
    #[must_use]
    pub fn into_result(self) -> Vec<T> {
        self.current
    }
}

/// What replaying one candidate showed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The candidate still rejects
    Rejects,
    /// The candidate ran but did not reject (accepted, or could not be replayed as written)
    NotRejected,
    /// The trial could not be completed; attempting it again may give an answer
    Incomplete {
        /// Why the trial stopped
        reason: String,
    },
    /// The run was aborted; no further trials should start
    Aborted,
}

/// Decides whether a candidate sequence still rejects
#[async_trait]
pub trait Oracle<T: Sync>: Send {
    /// Replay `candidate` and classify the result
    async fn trial(&mut self, candidate: &[T]) -> TrialOutcome;
}

/// Limits for one shrink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkOptions {
    /// Maximum number of oracle trials, retries included
    pub max_trials: usize,
    /// Re-attempts for a trial reported [`TrialOutcome::Incomplete`]
    pub retries: usize,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self {
            max_trials: DEFAULT_MAX_TRIALS,
            retries: DEFAULT_TRIAL_RETRIES,
        }
    }
}

/// Result of [`shrink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkOutcome<T> {
    /// Smallest sequence observed to reject
    pub minimal: Vec<T>,
    /// Oracle trials spent, retries included
    pub trials: usize,
    /// Whether the search reached its fixed point (false when a limit or abort cut it short)
    pub complete: bool,
}

/// Shrink `failing` against `oracle`.
///
/// A trial that stays incomplete after every retry counts as not rejecting,
/// so an unreliable session can only make the result less minimal, never
/// wrong.
pub async fn shrink<T, O>(
    failing: Vec<T>,
    oracle: &mut O,
    options: ShrinkOptions,
) -> ShrinkOutcome<T>
where
    T: Clone + Sync,
    O: Oracle<T> + ?Sized,
{
    let original_len = failing.len();
    let mut search = ShrinkSearch::new(failing);
    let mut trials = 0;
    let mut interrupted = false;

    'search: while let Some(candidate) = search.next_candidate() {
        let mut attempt = 0;
        let rejects = loop {
            if trials >= options.max_trials {
                info!(target: "conducta::shrink", trials, "trial budget exhausted");
                interrupted = true;
                break 'search;
            }
            trials += 1;
            match oracle.trial(&candidate).await {
                TrialOutcome::Rejects => break true,
                TrialOutcome::NotRejected => break false,
                TrialOutcome::Aborted => {
                    interrupted = true;
                    break 'search;
                }
                TrialOutcome::Incomplete { reason } if attempt < options.retries => {
                    attempt += 1;
                    warn!(
                        target: "conducta::shrink",
                        attempt,
                        reason = %reason,
                        "trial incomplete, retrying"
                    );
                }
                TrialOutcome::Incomplete { reason } => {
                    warn!(
                        target: "conducta::shrink",
                        reason = %reason,
                        "trial incomplete after retries, keeping current sequence"
                    );
                    break false;
                }
            }
        };
        debug!(
            target: "conducta::shrink",
            trial = trials,
            candidate_len = candidate.len(),
            rejects,
            "shrink trial"
        );
        search.report(rejects);
    }

    let complete = !interrupted && search.is_done();
    let minimal = search.into_result();
    info!(
        target: "conducta::shrink",
        from = original_len,
        to = minimal.len(),
        trials,
        complete,
        "shrink finished"
    );
    ShrinkOutcome {
        minimal,
        trials,
        complete,
    }
}
