//! Validate command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::{describe_spec, ProgressReporter};
use crate::ValidateArgs;
use conducta::{Specification, ValidatedSpec};
use std::path::Path;
use tracing::debug;

/// Load a specification document and run every construction check
pub fn load_spec(path: &Path) -> CliResult<ValidatedSpec> {
    let spec = Specification::from_file(path)?;
    debug!(
        target: "conducta::cli",
        path = %path.display(),
        operators = spec.operators.len(),
        actions = spec.actions.len(),
        "specification loaded"
    );
    Ok(spec.validate()?)
}

/// Execute the validate command
pub fn execute_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let spec = load_spec(&args.spec)?;
    if !config.verbosity.is_quiet() {
        print!("{}", describe_spec(&spec));
    }
    reporter.success(&format!("{} is well-formed", args.spec.display()));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::CliError;
    use std::fs;
    use tempfile::TempDir;

    const GOOD: &str = r##"
ready: "#app"
proposition:
  op: always
  formula: { op: call, operator: nonEmpty, args: [] }
operators:
  - name: nonEmpty
    params: []
    body:
      op: exists
      var: item
      domain: { op: query, selector: ".item" }
      body: { op: visible, element: { op: var, name: item } }
actions:
  - kind: { type: click }
    selector: "button"
"##;

    #[test]
    fn test_load_valid_spec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, GOOD).unwrap();
        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.operator_order(), ["nonEmpty".to_string()]);
        assert_eq!(spec.actions().len(), 1);
    }

    #[test]
    fn test_construction_error_surfaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, GOOD.replace("operator: nonEmpty", "operator: missing")).unwrap();
        let err = load_spec(&path).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_spec(Path::new("/nonexistent/spec.yaml")).unwrap_err();
        assert!(matches!(err, CliError::Conducta(_)));
    }
}
