//! Archive extraction error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadError {
    #[error("not a valid archive: {path}: {message}")]
    NotAnArchive { path: String, message: String },

    #[error("No APK files found inside the .apkm archive")]
    NoInstallablePayload,

    #[error("archive holds more than one {name}")]
    DuplicatePayload { name: String },

    #[error("Package exceeds size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("invalid package metadata: {message}")]
    InvalidMetadata { message: String },

    #[error("I/O failure on {path}: {message}")]
    Io { path: String, message: String },
}

impl PayloadError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl UserFacingError for PayloadError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotAnArchive { .. }
            | Self::NoInstallablePayload
            | Self::DuplicatePayload { .. } => {
                Some("Select an .apkm bundle containing at least a base.apk.")
            }
            Self::SizeLimitExceeded { .. } => {
                Some("Raise payload.max_extract_bytes if the bundle is trusted.")
            }
            Self::Io { .. } => Some("Check free space in the extraction cache directory."),
            Self::InvalidMetadata { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotAnArchive { .. } => "payload.not_an_archive",
            Self::NoInstallablePayload => "payload.no_installable_payload",
            Self::DuplicatePayload { .. } => "payload.duplicate_payload",
            Self::SizeLimitExceeded { .. } => "payload.size_limit_exceeded",
            Self::InvalidMetadata { .. } => "payload.invalid_metadata",
            Self::Io { .. } => "payload.io",
        };
        Some(code)
    }
}
