//! Check command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::validate::load_spec;
use crate::CheckArgs;
use conducta::{Seed, Verdict};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Seed derived from the wall clock, for runs without `--seed`
#[must_use]
pub fn seed_from_clock() -> Seed {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    #[allow(clippy::cast_possible_truncation)]
    Seed::from_u64(nanos as u64)
}

/// Execute the check command
pub fn execute_check(config: &CliConfig, args: &CheckArgs) -> CliResult<Verdict> {
    let spec = load_spec(&args.spec)?;
    let seed = args.seed.map_or_else(seed_from_clock, Seed::from_u64);
    let check_config = args.to_check_config(seed);
    info!(
        target: "conducta::cli",
        origin = %check_config.origin,
        seed = %seed,
        tests = check_config.tests,
        "check configured"
    );
    run_check(config, args, &spec, check_config)
}

#[cfg(not(feature = "browser"))]
fn run_check(
    _config: &CliConfig,
    _args: &CheckArgs,
    _spec: &conducta::ValidatedSpec,
    _check_config: conducta::CheckConfig,
) -> CliResult<Verdict> {
    Err(crate::CliError::BrowserUnavailable {
        command: "check".to_string(),
    })
}

#[cfg(feature = "browser")]
fn run_check(
    config: &CliConfig,
    args: &CheckArgs,
    spec: &conducta::ValidatedSpec,
    check_config: conducta::CheckConfig,
) -> CliResult<Verdict> {
    use crate::output::ProgressReporter;
    use conducta::{AbortHandle, BrowserDriver, Checker, ChromiumDriver, DriverConfig};
    use std::time::Duration;
    use tracing::warn;

    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    reporter.info(&format!(
        "checking {} against {} (seed {})",
        check_config.origin,
        args.spec.display(),
        check_config.seed
    ));

    let mut driver_config = DriverConfig::new()
        .headless(!args.headed)
        .navigation_timeout(Duration::from_millis(check_config.wait.ready_timeout_ms));
    if let Some(path) = &args.chromium {
        driver_config = driver_config.executable_path(path.display().to_string());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let mut driver = ChromiumDriver::launch(driver_config).await?;

        let abort = AbortHandle::new();
        let on_interrupt = abort.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(target: "conducta::cli", "interrupted; stopping at the next step");
                on_interrupt.abort();
            }
        });

        reporter.start_progress(check_config.tests as u64, "starting");
        let report = Checker::new(&mut driver, spec, check_config)
            .with_abort(abort.signal())
            .with_progress(reporter.hook())
            .check()
            .await;
        reporter.finish();

        interrupt.abort();
        driver.close().await?;
        Ok::<_, conducta::ConductaError>(report)
    })?;

    if !config.verbosity.is_quiet() || report.verdict.is_rejected() {
        print!("{}", report.render());
    }
    super::write_outputs(&report, args.report.as_deref(), args.junit.as_deref())?;
    reporter.verdict(&report);
    Ok(report.verdict)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_clock_seeds_differ() {
        let first = seed_from_clock();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_ne!(first, seed_from_clock());
    }

    #[test]
    fn test_missing_spec_fails_before_driving() {
        let cli = Cli::parse_from([
            "conducta",
            "check",
            "/nonexistent/spec.yaml",
            "--origin",
            "http://localhost:1",
        ]);
        let Commands::Check(args) = cli.command else {
            unreachable!("parsed a check command");
        };
        let err = execute_check(&CliConfig::new(), &args).unwrap_err();
        assert!(err.to_string().contains("spec.yaml"));
    }
}
