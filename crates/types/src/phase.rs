//! Observable lifecycle of one install run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ServiceStatus;

/// Install lifecycle phase.
///
/// Phases are emitted in order: `Idle → Extracting → Verifying → Installing →
/// {PendingUserAction, Finalizing}* → (Success | Failure)`. Non-terminal phases
/// may repeat or be skipped; nothing follows a terminal phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Extracting,
    Verifying,
    Installing,
    PendingUserAction,
    Finalizing,
    Success { package_id: String },
    Failure(InstallFailure),
}

impl Phase {
    /// Build a terminal failure phase
    pub fn failure(reason: FailureReason, message: impl Into<String>) -> Self {
        Self::Failure(InstallFailure::new(reason, message))
    }

    /// Build a terminal success phase
    pub fn success(package_id: impl Into<String>) -> Self {
        Self::Success {
            package_id: package_id.into(),
        }
    }

    /// The user-cancelled terminal phase
    #[must_use]
    pub fn cancelled() -> Self {
        Self::failure(FailureReason::Cancelled, "cancelled")
    }

    /// Whether no further phase may follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failure(_))
    }

    /// Failure details, if this is a failure phase
    #[must_use]
    pub fn as_failure(&self) -> Option<&InstallFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Short lowercase label used in logs and status lines
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Verifying => "verifying",
            Self::Installing => "installing",
            Self::PendingUserAction => "pending_user_action",
            Self::Finalizing => "finalizing",
            Self::Success { .. } => "success",
            Self::Failure(_) => "failure",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { package_id } => write!(f, "success ({package_id})"),
            Self::Failure(failure) => write!(f, "failure: {failure}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Terminal failure with its cause category and diagnostic text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl InstallFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Whether the user asked for this outcome
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason == FailureReason::Cancelled
    }
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Missing or unreadable payload; no session was opened
    Input,
    /// Session creation, payload write or commit failed
    Submission,
    /// The installer service reported a non-success verdict
    Service { status: ServiceStatus },
    /// The client-side wait expired
    Timeout,
    /// The user cancelled
    Cancelled,
    /// Another session was already in flight
    Busy,
}

impl FailureReason {
    /// Stable code used in structured output
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Submission => "submission",
            Self::Service { .. } => "service",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Busy => "busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(Phase::success("com.example").is_terminal());
        assert!(Phase::cancelled().is_terminal());
        assert!(!Phase::Finalizing.is_terminal());
        assert!(!Phase::PendingUserAction.is_terminal());
    }

    #[test]
    fn cancelled_phase_shape() {
        let phase = Phase::cancelled();
        let failure = phase.as_failure().unwrap();
        assert!(failure.is_cancelled());
        assert_eq!(failure.message, "cancelled");
    }

    #[test]
    fn failure_serializes_with_reason() {
        let phase = Phase::failure(
            FailureReason::Service {
                status: ServiceStatus::Storage,
            },
            "not enough space",
        );
        let json = serde_json::to_value(&phase).unwrap();
        assert_eq!(json["phase"], "failure");
        assert_eq!(json["reason"]["kind"], "service");
        assert_eq!(json["message"], "not enough space");
    }
}
