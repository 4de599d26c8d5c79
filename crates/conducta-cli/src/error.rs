//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// The build lacks a capability the command needs
    #[error("{command} needs a browser driver; rebuild with `--features browser`")]
    BrowserUnavailable {
        /// Command that was refused
        command: String,
    },

    /// Report generation error
    #[error("Report generation failed: {message}")]
    ReportGeneration {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Conducta library error
    #[error(transparent)]
    Conducta(#[from] conducta::ConductaError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a report generation error
    #[must_use]
    pub fn report_generation(message: impl Into<String>) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Conducta(conducta::ConductaError::Construction(_)) => 3,
            Self::InvalidArgument { .. }
            | Self::Config { .. }
            | Self::BrowserUnavailable { .. } => 2,
            _ => 5,
        }
    }
}

impl From<conducta::SpecError> for CliError {
    fn from(err: conducta::SpecError) -> Self {
        Self::Conducta(err.into())
    }
}

impl From<conducta::ConstructionError> for CliError {
    fn from(err: conducta::ConstructionError) -> Self {
        Self::Conducta(err.into())
    }
}
