//! Output formatting and progress reporting

use conducta::{CheckEvent, Report, RunSummary, ValidatedSpec, Verdict};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;

/// Progress reporter for a check
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` tests
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Event sink to hand to [`conducta::Checker::with_progress`]
    #[must_use]
    pub fn hook(&self) -> impl FnMut(&CheckEvent) + Send + 'static {
        let pb = self.progress_bar.clone();
        let use_color = self.use_color;
        move |event| {
            if let Some(pb) = &pb {
                apply_event(pb, use_color, event);
            }
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefix("✓", "PASS", Tone::Good), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.line(&self.prefix("✗", "FAIL", Tone::Bad), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefix("⚠", "WARN", Tone::Warn), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefix("ℹ", "INFO", Tone::Info), message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the overall verdict line of a report
    pub fn verdict(&self, report: &Report) {
        match report.verdict {
            Verdict::Accepted => self.success(&report.summary()),
            Verdict::Rejected => self.failure(&report.summary()),
            Verdict::Inconclusive => self.warning(&report.summary()),
        }
    }

    fn prefix(&self, symbol: &str, word: &str, tone: Tone) -> String {
        if self.use_color {
            tone.paint(symbol)
        } else {
            word.to_string()
        }
    }

    fn line(&self, prefix: &str, message: &str) {
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Good,
    Bad,
    Warn,
    Info,
}

impl Tone {
    fn paint(self, text: &str) -> String {
        let styled = style(text).bold();
        match self {
            Self::Good => styled.green(),
            Self::Bad => styled.red(),
            Self::Warn => styled.yellow(),
            Self::Info => styled.blue(),
        }
        .to_string()
    }
}

fn apply_event(pb: &ProgressBar, use_color: bool, event: &CheckEvent) {
    match event {
        CheckEvent::TestStarted { test, seed } => {
            pb.set_message(format!("test {test} (seed {seed})"));
        }
        CheckEvent::Phase { .. } => {}
        CheckEvent::ActionPerformed {
            test,
            index,
            action,
        } => {
            pb.set_message(format!("test {test}: #{index} {}", action.label()));
        }
        CheckEvent::TestFinished(summary) => {
            pb.inc(1);
            pb.println(run_line(summary, use_color));
        }
        CheckEvent::ShrinkTrial {
            trials,
            candidate_len,
            rejected,
        } => {
            pb.set_message(format!(
                "shrinking: trial {trials}, {candidate_len} action(s){}",
                if *rejected { ", still rejects" } else { "" }
            ));
        }
    }
}

/// One line per finished test
#[must_use]
pub fn run_line(summary: &RunSummary, use_color: bool) -> String {
    let verdict = summary.verdict.to_string();
    let verdict = if use_color {
        match summary.verdict {
            Verdict::Accepted => style(verdict).green().to_string(),
            Verdict::Rejected => style(verdict).red().bold().to_string(),
            Verdict::Inconclusive => style(verdict).yellow().to_string(),
        }
    } else {
        verdict
    };
    let mut line = format!(
        "test {:>3} seed {:<20} {:>3} action(s)  {verdict}",
        summary.index, summary.seed, summary.actions
    );
    if let Some(reason) = &summary.reason {
        let _ = write!(line, " ({reason})");
    }
    line
}

/// Plain-text description of a validated specification
#[must_use]
pub fn describe_spec(spec: &ValidatedSpec) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ready: {}", spec.ready());
    let _ = writeln!(out, "proposition: {}", spec.proposition());

    let deps = spec.dependencies();
    let _ = writeln!(out, "selectors ({}):", deps.selectors.len());
    for selector in &deps.selectors {
        let _ = writeln!(out, "  {selector}");
    }
    if !deps.styles.is_empty() {
        let styles: Vec<&str> = deps.styles.iter().map(String::as_str).collect();
        let _ = writeln!(out, "styles: {}", styles.join(", "));
    }

    let order = spec.operator_order();
    if order.is_empty() {
        let _ = writeln!(out, "operators: none");
    } else {
        let _ = writeln!(out, "operators: {}", order.join(" -> "));
    }

    let _ = writeln!(out, "actions ({}):", spec.actions().len());
    for template in spec.actions() {
        match &template.selector {
            Some(selector) => {
                let _ = writeln!(out, "  {} on {selector}", template.label());
            }
            None => {
                let _ = writeln!(out, "  {}", template.label());
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conducta::{ActionTemplate, Formula, Seed, Specification};

    fn summary(verdict: Verdict) -> RunSummary {
        RunSummary {
            index: 4,
            seed: Seed::from_u64(99),
            verdict,
            actions: 7,
            reason: None,
            partial: None,
        }
    }

    mod run_line_tests {
        use super::*;

        #[test]
        fn test_plain_run_line() {
            let line = run_line(&summary(Verdict::Accepted), false);
            assert!(line.contains("test   4"));
            assert!(line.contains("seed 99"));
            assert!(line.contains("7 action(s)"));
            assert!(line.ends_with("ACCEPTED"));
        }

        #[test]
        fn test_reason_is_appended() {
            let mut run = summary(Verdict::Inconclusive);
            run.reason = Some(conducta::InconclusiveReason::Aborted);
            let line = run_line(&run, false);
            assert!(line.contains("INCONCLUSIVE (aborted)"));
        }
    }

    mod describe_tests {
        use super::*;

        #[test]
        fn test_describe_lists_dependencies_and_operators() {
            let spec = Specification::new(
                "#app",
                Formula::always(Formula::constant("nonEmpty")),
            )
            .with_operator(conducta::OperatorDef::constant(
                "nonEmpty",
                Formula::exists("e", Formula::query(".item"), Formula::visible(Formula::var("e"))),
            ))
            .with_action(ActionTemplate::click("button"))
            .validate()
            .unwrap();

            let text = describe_spec(&spec);
            assert!(text.contains("ready: #app"));
            assert!(text.contains("  .item"));
            assert!(text.contains("operators: nonEmpty"));
            assert!(text.contains("click on button"));
        }
    }

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_quiet_reporter_has_no_bar() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(3, "checking");
            assert!(reporter.progress_bar.is_none());
            let mut hook = reporter.hook();
            hook(&CheckEvent::TestFinished(summary(Verdict::Accepted)));
            reporter.finish();
        }

        #[test]
        fn test_hook_advances_bar() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(2, "checking");
            let mut hook = reporter.hook();
            hook(&CheckEvent::TestFinished(summary(Verdict::Accepted)));
            assert_eq!(reporter.progress_bar.as_ref().unwrap().position(), 1);
            reporter.finish();
        }
    }
}
