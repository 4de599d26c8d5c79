//! Check reports.
//!
//! A [`Report`] is the structured result of one check: the verdict of every
//! test, and for a rejection the original and shrunk action sequences plus
//! the states recorded while replaying the shrunk one. It renders as a
//! human-readable trace, as JSON, or as JUnit XML for CI.

use crate::action::Action;
use crate::checker::CheckConfig;
use crate::generator::Seed;
use crate::result::ConductaResult;
use crate::state::Behavior;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::Path;
use uuid::Uuid;

/// Outcome of one test, or of a whole check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The proposition held over the recorded behavior
    Accepted,
    /// The proposition was false
    Rejected,
    /// Neither; the run could not be completed or decided
    Inconclusive,
}

impl Verdict {
    /// Check if verdict is an acceptance
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Check if verdict is a rejection
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Combine per-test verdicts: any rejection rejects, otherwise one acceptance accepts
    #[must_use]
    pub fn overall(verdicts: impl IntoIterator<Item = Self>) -> Self {
        let mut overall = Self::Inconclusive;
        for verdict in verdicts {
            match verdict {
                Self::Rejected => return Self::Rejected,
                Self::Accepted => overall = Self::Accepted,
                Self::Inconclusive => {}
            }
        }
        overall
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Inconclusive => "INCONCLUSIVE",
        };
        f.write_str(s)
    }
}

/// Why a test was inconclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// Execution stopped before the planned sequence completed
    Execution {
        /// Error message
        message: String,
    },
    /// The proposition could not be decided over the recorded behavior
    Evaluation {
        /// Error message
        message: String,
    },
    /// The check was aborted
    Aborted,
}

impl fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution { message } => write!(f, "execution failed: {message}"),
            Self::Evaluation { message } => write!(f, "evaluation failed: {message}"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Summary of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Test index within the check
    pub index: usize,
    /// Seed the actions were generated from
    pub seed: Seed,
    /// Test verdict
    pub verdict: Verdict,
    /// Number of actions executed
    pub actions: usize,
    /// Set when the verdict is inconclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<InconclusiveReason>,
    /// States recorded before an execution error stopped the test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<Behavior>,
}

/// A rejecting action sequence and its minimization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample {
    /// Test that rejected
    pub test: usize,
    /// Seed of that test
    pub seed: Seed,
    /// Sequence as generated
    pub original: Vec<Action>,
    /// Smallest rejecting subsequence found
    pub shrunk: Vec<Action>,
    /// Shrink trials spent
    pub trials: usize,
    /// Whether shrinking reached a fixed point
    pub shrink_complete: bool,
    /// States recorded while replaying `shrunk`
    pub behavior: Behavior,
}

/// Structured result of a check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Run id
    pub id: Uuid,
    /// When the check started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Configuration the check ran with
    pub config: CheckConfig,
    /// Per-test summaries, in order
    pub runs: Vec<RunSummary>,
    /// Overall verdict
    pub verdict: Verdict,
    /// Present when a test rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Counterexample>,
}

impl Report {
    /// Start an empty report
    #[must_use]
    pub fn new(config: CheckConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 0,
            config,
            runs: Vec::new(),
            verdict: Verdict::Inconclusive,
            counterexample: None,
        }
    }

    /// Record a test and refresh the overall verdict
    pub fn record(&mut self, run: RunSummary) {
        self.runs.push(run);
        self.verdict = Verdict::overall(self.runs.iter().map(|r| r.verdict));
    }

    /// Stamp the duration
    pub fn finish(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
    }

    /// Number of tests with the given verdict
    #[must_use]
    pub fn count(&self, verdict: Verdict) -> usize {
        self.runs.iter().filter(|r| r.verdict == verdict).count()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} accepted, {} rejected, {} inconclusive ({} tests)",
            self.verdict,
            self.count(Verdict::Accepted),
            self.count(Verdict::Rejected),
            self.count(Verdict::Inconclusive),
            self.runs.len()
        )
    }

    /// Human-readable report with the minimal failing trace
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "check {} started {}",
            self.id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "origin {} | seed {} | {} tests | up to {} actions",
            self.config.origin, self.config.seed, self.config.tests, self.config.max_actions
        );
        let _ = writeln!(out, "{}", self.summary());

        for run in self.runs.iter().filter(|r| r.reason.is_some()) {
            if let Some(reason) = &run.reason {
                let _ = writeln!(out, "  test {} (seed {}): {reason}", run.index, run.seed);
            }
            if let Some(partial) = &run.partial {
                render_trace(&mut out, &[], partial);
            }
        }

        if let Some(cex) = &self.counterexample {
            out.push('\n');
            let _ = writeln!(
                out,
                "counterexample from test {} (seed {}): {} action(s) shrunk to {} in {} trial(s){}",
                cex.test,
                cex.seed,
                cex.original.len(),
                cex.shrunk.len(),
                cex.trials,
                if cex.shrink_complete { "" } else { " (incomplete)" }
            );
            render_trace(&mut out, &cex.shrunk, &cex.behavior);
        }
        out
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> ConductaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report to `path`
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn save_json(&self, path: &Path) -> ConductaResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Render JUnit XML content, one test case per test
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        #[allow(clippy::cast_precision_loss)]
        let seconds = self.duration_ms as f64 / 1000.0;
        let _ = writeln!(
            xml,
            r#"<testsuite name="conducta" tests="{}" failures="{}" skipped="{}" time="{seconds:.3}">"#,
            self.runs.len(),
            self.count(Verdict::Rejected),
            self.count(Verdict::Inconclusive),
        );
        for run in &self.runs {
            let _ = writeln!(xml, r#"  <testcase name="seed {}">"#, run.seed);
            match run.verdict {
                Verdict::Accepted => {}
                Verdict::Rejected => {
                    let trace = self
                        .counterexample
                        .as_ref()
                        .filter(|c| c.test == run.index)
                        .map(|c| {
                            let mut trace = String::new();
                            render_trace(&mut trace, &c.shrunk, &c.behavior);
                            trace
                        })
                        .unwrap_or_default();
                    let _ = writeln!(
                        xml,
                        r#"    <failure message="proposition rejected">{}</failure>"#,
                        escape_xml(&trace)
                    );
                }
                Verdict::Inconclusive => {
                    let reason = run
                        .reason
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    let _ = writeln!(xml, r#"    <skipped message="{}"/>"#, escape_xml(&reason));
                }
            }
            xml.push_str("  </testcase>\n");
        }
        xml.push_str("</testsuite>\n");
        xml
    }

    /// Write the JUnit XML report to `path`
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn save_junit(&self, path: &Path) -> ConductaResult<()> {
        std::fs::write(path, self.render_junit())?;
        Ok(())
    }
}

/// One line per state; steps that left the observed DOM unchanged are marked
fn render_trace(out: &mut String, actions: &[Action], behavior: &Behavior) {
    let mut previous: Option<String> = None;
    for (position, state) in behavior.states().iter().enumerate() {
        let step = if position == 0 {
            state.happened().to_string()
        } else {
            actions
                .get(position - 1)
                .map_or_else(|| state.happened().to_string(), ToString::to_string)
        };
        let fingerprint = state.fingerprint();
        let unchanged = previous.as_deref() == Some(fingerprint.as_str());
        let _ = writeln!(
            out,
            "  {position:>3}. {step:<48} [{fingerprint}]{}",
            if unchanged { " unchanged" } else { "" }
        );
        previous = Some(fingerprint);
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
