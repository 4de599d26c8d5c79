//! Log subscriber setup.
//!
//! `RUST_LOG`, when set, replaces the filter derived from `-v`/`-q`.

use crate::config::{CliConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Filter for `config`, honouring `RUST_LOG`
#[must_use]
pub fn env_filter(config: &CliConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()))
}

/// Install the global subscriber; a second call is a no-op
pub fn init(config: &CliConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color());
    let installed = match config.log_format {
        LogFormat::Text => builder.with_target(config.verbosity.is_verbose()).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Verbosity;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = CliConfig::new().with_verbosity(Verbosity::Quiet);
        init(&config);
        init(&config);
    }

    #[test]
    fn test_env_filter_builds_for_every_level() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Debug,
        ] {
            let filter = env_filter(&CliConfig::new().with_verbosity(verbosity));
            assert!(!filter.to_string().is_empty());
        }
    }
}
