//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use conducta::{
    CheckConfig, Seed, WaitOptions, Weighting, DEFAULT_MAX_ACTIONS, DEFAULT_MAX_TRIALS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_READY_TIMEOUT_MS, DEFAULT_SETTLE_TIMEOUT_MS, DEFAULT_TESTS,
    DEFAULT_TRIAL_RETRIES,
};
use std::path::PathBuf;

/// Conducta: specification-driven testing for web applications
#[derive(Parser, Debug)]
#[command(name = "conducta")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a web application against a specification
    ///
    /// Generates random action sequences, drives them through Chromium,
    /// and evaluates the specification's proposition over every recorded
    /// behavior. The first rejecting sequence is shrunk to a minimal
    /// counterexample.
    Check(CheckArgs),

    /// Validate a specification without running it
    Validate(ValidateArgs),

    /// Render a saved JSON report
    Report(ReportArgs),
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Specification document (YAML or JSON)
    pub spec: PathBuf,

    /// URL the application is served from
    #[arg(long, env = "CONDUCTA_ORIGIN")]
    pub origin: String,

    /// Maximum actions per test
    #[arg(long, default_value_t = DEFAULT_MAX_ACTIONS)]
    pub max_actions: usize,

    /// Number of tests to run
    #[arg(long, default_value_t = DEFAULT_TESTS)]
    pub tests: usize,

    /// Seed for action generation (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Report the first rejecting sequence as generated
    #[arg(long)]
    pub no_shrink: bool,

    /// Maximum replays spent shrinking
    #[arg(long, default_value_t = DEFAULT_MAX_TRIALS)]
    pub max_shrink_trials: usize,

    /// Extra attempts for a shrink replay that fails transiently
    #[arg(long, default_value_t = DEFAULT_TRIAL_RETRIES)]
    pub trial_retries: usize,

    /// Draw actions proportionally to their template weight
    #[arg(long)]
    pub weighted: bool,

    /// How long to wait for the ready selector, in milliseconds
    #[arg(long, default_value_t = DEFAULT_READY_TIMEOUT_MS)]
    pub ready_timeout: u64,

    /// How long one action may take to settle, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SETTLE_TIMEOUT_MS)]
    pub settle_timeout: u64,

    /// Polling interval for the ready selector, in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval: u64,

    /// Write the JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write a JUnit XML report to this file
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium executable to launch
    #[arg(long, env = "CONDUCTA_CHROMIUM")]
    pub chromium: Option<PathBuf>,
}

impl CheckArgs {
    /// Build the check configuration with the given seed
    #[must_use]
    pub fn to_check_config(&self, seed: Seed) -> CheckConfig {
        CheckConfig::new(self.origin.clone())
            .with_max_actions(self.max_actions)
            .with_tests(self.tests)
            .with_seed(seed)
            .with_shrink(!self.no_shrink)
            .with_max_shrink_trials(self.max_shrink_trials)
            .with_trial_retries(self.trial_retries)
            .with_weighting(if self.weighted {
                Weighting::Weighted
            } else {
                Weighting::Uniform
            })
            .with_wait(
                WaitOptions::new()
                    .with_ready_timeout(self.ready_timeout)
                    .with_settle_timeout(self.settle_timeout)
                    .with_poll_interval(self.poll_interval),
            )
    }
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Specification document (YAML or JSON)
    pub spec: PathBuf,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// JSON report written by `check --report`
    pub report: PathBuf,

    /// Also write a JUnit XML report to this file
    #[arg(long)]
    pub junit: Option<PathBuf>,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
