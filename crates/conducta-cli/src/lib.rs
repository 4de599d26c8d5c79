//! Conducta CLI library
//!
//! Command-line front end for checking web applications against
//! Conducta specifications.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    CheckArgs, Cli, ColorArg, Commands, LogFormatArg, ReportArgs, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{describe_spec, run_line, ProgressReporter};
