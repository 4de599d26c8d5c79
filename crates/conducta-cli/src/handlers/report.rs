//! Report command handler and report file output

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::ReportArgs;
use conducta::{ConductaError, Report, Verdict};
use std::fs;
use std::path::Path;
use tracing::info;

/// Read a JSON report written by `check --report`
pub fn load_report(path: &Path) -> CliResult<Report> {
    let source = fs::read_to_string(path)?;
    serde_json::from_str(&source).map_err(|e| CliError::Conducta(ConductaError::Json(e)))
}

/// Write the JSON and JUnit outputs that were asked for
pub fn write_outputs(report: &Report, json: Option<&Path>, junit: Option<&Path>) -> CliResult<()> {
    if let Some(path) = json {
        ensure_parent(path)?;
        report
            .save_json(path)
            .map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))?;
        info!(target: "conducta::cli", path = %path.display(), "JSON report written");
    }
    if let Some(path) = junit {
        ensure_parent(path)?;
        report
            .save_junit(path)
            .map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))?;
        info!(target: "conducta::cli", path = %path.display(), "JUnit report written");
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> CliResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<Verdict> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let report = load_report(&args.report)?;
    if !config.verbosity.is_quiet() || report.verdict.is_rejected() {
        print!("{}", report.render());
    }
    write_outputs(&report, None, args.junit.as_deref())?;
    reporter.verdict(&report);
    Ok(report.verdict)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conducta::{CheckConfig, RunSummary, Seed};
    use tempfile::TempDir;

    fn sample_report() -> Report {
        let mut report = Report::new(CheckConfig::new("http://localhost:8080"));
        report.record(RunSummary {
            index: 0,
            seed: Seed::from_u64(1),
            verdict: Verdict::Accepted,
            actions: 3,
            reason: None,
            partial: None,
        });
        report.finish();
        report
    }

    #[test]
    fn test_outputs_round_trip_through_load() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("nested/out.json");
        let junit = dir.path().join("nested/out.xml");
        let report = sample_report();

        write_outputs(&report, Some(&json), Some(&junit)).unwrap();

        let loaded = load_report(&json).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.verdict, Verdict::Accepted);
        let xml = fs::read_to_string(&junit).unwrap();
        assert!(xml.contains("<testsuite"));
    }

    #[test]
    fn test_no_outputs_requested() {
        write_outputs(&sample_report(), None, None).unwrap();
    }

    #[test]
    fn test_malformed_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_report(&path).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }
}
