//! Conducta CLI: specification-driven testing for web applications
//!
//! ## Usage
//!
//! ```bash
//! conducta validate todo.yaml                               # Check a spec is well-formed
//! conducta check todo.yaml --origin http://localhost:8080   # Run 10 tests
//! conducta check todo.yaml --origin ... --seed 42 --report out.json
//! conducta report out.json --junit out.xml                  # Re-render a saved report
//! ```
//!
//! Exit codes: 0 accepted, 1 rejected, 2 usage or configuration error,
//! 3 malformed specification, 4 inconclusive, 5 any other error.

use clap::Parser;
use conducta_cli::{handlers, logging, Cli, CliConfig, CliResult, Commands, Verbosity};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> CliResult<u8> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli);
    logging::init(&config);

    match cli.command {
        Commands::Check(args) => {
            handlers::execute_check(&config, &args).map(handlers::verdict_exit_code)
        }
        Commands::Validate(args) => handlers::execute_validate(&config, &args).map(|()| 0),
        Commands::Report(args) => {
            handlers::execute_report(&config, &args).map(handlers::verdict_exit_code)
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_format(cli.log_format.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conducta_cli::{ColorChoice, LogFormat};

    #[test]
    fn test_build_config_from_flags() {
        let cli = Cli::parse_from([
            "conducta",
            "-q",
            "--color",
            "always",
            "--log-format",
            "json",
            "validate",
            "s.yaml",
        ]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Always);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
