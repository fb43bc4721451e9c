//! CLI error handling

use std::fmt;

use apkm_errors::UserFacingError;
use apkm_types::InstallFailure;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(apkm_errors::ConfigError),
    /// Library error
    Ops(apkm_errors::Error),
    /// The install run ended in a failure phase
    Install(InstallFailure),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Install(failure) => {
                write!(f, "{}", failure.message)?;
                write!(f, "\n  Code: install.{}", failure.reason.code())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<apkm_errors::ConfigError> for CliError {
    fn from(e: apkm_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<apkm_errors::Error> for CliError {
    fn from(e: apkm_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<apkm_errors::PayloadError> for CliError {
    fn from(e: apkm_errors::PayloadError) -> Self {
        CliError::Ops(e.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
