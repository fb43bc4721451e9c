//! Installation session error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstallError {
    #[error("APK files missing: {paths}")]
    MissingPayload { paths: String },

    #[error("no payload files supplied for {package}")]
    NoPayload { package: String },

    #[error("an install session is already in progress (session {session_id})")]
    SessionBusy { session_id: String },

    #[error("Could not create install session: {message}")]
    SessionCreateFailed { message: String },

    #[error("Installation failed: could not write {name}: {message}")]
    WriteFailed { name: String, message: String },

    #[error("Installation failed: commit rejected: {message}")]
    CommitFailed { message: String },

    #[error("unknown install session: {session_id}")]
    UnknownSession { session_id: i32 },

    #[error("Could not show install confirmation: {message}")]
    ConfirmationFailed { message: String },

    #[error("Installation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("worker task failed: {message}")]
    TaskError { message: String },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingPayload { .. } => {
                Some("Re-select the archive so its payload files are extracted again.")
            }
            Self::SessionBusy { .. } => {
                Some("Wait for the running installation to finish or cancel it first.")
            }
            Self::Timeout { .. } => Some(
                "Check the device for a pending confirmation prompt; background scans can delay the verdict.",
            ),
            Self::ConfirmationFailed { .. } => {
                Some("Confirm the installation manually and retry.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionBusy { .. }
                | Self::SessionCreateFailed { .. }
                | Self::WriteFailed { .. }
                | Self::CommitFailed { .. }
                | Self::Timeout { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::MissingPayload { .. } => "install.missing_payload",
            Self::NoPayload { .. } => "install.no_payload",
            Self::SessionBusy { .. } => "install.session_busy",
            Self::SessionCreateFailed { .. } => "install.session_create_failed",
            Self::WriteFailed { .. } => "install.write_failed",
            Self::CommitFailed { .. } => "install.commit_failed",
            Self::UnknownSession { .. } => "install.unknown_session",
            Self::ConfirmationFailed { .. } => "install.confirmation_failed",
            Self::Timeout { .. } => "install.timeout",
            Self::TaskError { .. } => "install.task_error",
        };
        Some(code)
    }
}
