use apkm_errors::UserFacingError;
use apkm_types::{FailureReason, InstallFailure};
use serde::{Deserialize, Serialize};

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Optional stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }

    /// Build failure context from a terminal install phase.
    #[must_use]
    pub fn from_install_failure(failure: &InstallFailure) -> Self {
        let hint = match failure.reason {
            FailureReason::Timeout => {
                Some("Check the device for a pending confirmation prompt and retry.")
            }
            FailureReason::Busy => Some("Wait for the running installation to finish."),
            FailureReason::Input => Some("Re-select the archive to extract it again."),
            _ => None,
        };
        let retryable = !matches!(failure.reason, FailureReason::Input);
        Self::new(
            Some(format!("install.{}", failure.reason.code())),
            failure.message.clone(),
            hint,
            retryable,
        )
    }
}

// Declare all domain modules
pub mod general;
pub mod install;
pub mod payload;
pub mod session;

// Re-export all domain events
pub use general::*;
pub use install::*;
pub use payload::*;
pub use session::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Archive extraction events
    Payload(PayloadEvent),

    /// Installer session events (gateway and completion relay)
    Session(SessionEvent),

    /// Install pipeline events
    Install(InstallEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Payload(PayloadEvent::ExtractionFailed { .. }) => Level::ERROR,

            Self::Install(InstallEvent::Failed { failure, .. }) => {
                if failure.code.as_deref() == Some("install.cancelled") {
                    Level::WARN
                } else {
                    Level::ERROR
                }
            }

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::Install(InstallEvent::TimedOut { .. })
            | Self::Session(SessionEvent::Rejected { .. } | SessionEvent::Abandoned { .. }) => {
                Level::WARN
            }

            // Debug-level events (progress updates, internal state)
            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Payload(PayloadEvent::EntryExtracted { .. })
            | Self::Session(
                SessionEvent::PayloadWritten { .. } | SessionEvent::NotificationDropped { .. },
            )
            | Self::Install(InstallEvent::PhaseChanged { .. }) => Level::DEBUG,

            // Trace-level events (very detailed internal operations)
            Self::Session(SessionEvent::Progress { .. }) => Level::TRACE,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "apkm::events::general",
            Self::Payload(_) => "apkm::events::payload",
            Self::Session(_) => "apkm::events::session",
            Self::Install(_) => "apkm::events::install",
        }
    }

    /// Get structured fields for logging
    #[must_use]
    pub fn log_fields(&self) -> String {
        match self {
            Self::Install(InstallEvent::PhaseChanged { package_id, phase }) => {
                format!("package={package_id} phase={phase}")
            }
            Self::Session(SessionEvent::NotificationDropped {
                session_id,
                status,
                active,
            }) => match active {
                Some(active) => {
                    format!("session={session_id} status={status} active={active}")
                }
                None => format!("session={session_id} status={status} active=none"),
            },
            _ => serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}")),
        }
    }
}
