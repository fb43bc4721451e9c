//! Installer service session identifiers and completion notifications

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the installer service assigns to a session at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status codes reported by the installer service.
///
/// The numeric values follow the platform package installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    PendingUserAction,
    Success,
    Failure,
    Blocked,
    Aborted,
    Invalid,
    Conflict,
    Storage,
    Incompatible,
    Timeout,
}

impl ServiceStatus {
    /// Map a raw status code; unknown codes are generic failures
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::PendingUserAction,
            0 => Self::Success,
            2 => Self::Blocked,
            3 => Self::Aborted,
            4 => Self::Invalid,
            5 => Self::Conflict,
            6 => Self::Storage,
            7 => Self::Incompatible,
            8 => Self::Timeout,
            _ => Self::Failure,
        }
    }

    /// Raw status code
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::PendingUserAction => -1,
            Self::Success => 0,
            Self::Failure => 1,
            Self::Blocked => 2,
            Self::Aborted => 3,
            Self::Invalid => 4,
            Self::Conflict => 5,
            Self::Storage => 6,
            Self::Incompatible => 7,
            Self::Timeout => 8,
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::PendingUserAction | Self::Success)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PendingUserAction => "pending user action",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
            Self::Aborted => "aborted",
            Self::Invalid => "invalid package",
            Self::Conflict => "conflicting package",
            Self::Storage => "insufficient storage",
            Self::Incompatible => "incompatible update",
            Self::Timeout => "service timeout",
        };
        f.write_str(text)
    }
}

/// Follow-up action the service asks the user to confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAction {
    pub session_id: SessionId,
    pub package_id: Option<String>,
    /// Prompt text to present
    pub prompt: String,
}

/// Asynchronous status message delivered out of band by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotification {
    pub session_id: SessionId,
    pub status: ServiceStatus,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Present on `PendingUserAction` notifications
    #[serde(default)]
    pub user_action: Option<UserAction>,
}

impl CompletionNotification {
    pub fn new(session_id: SessionId, status: ServiceStatus) -> Self {
        Self {
            session_id,
            status,
            package_id: None,
            message: None,
            user_action: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_package(mut self, package_id: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self
    }

    #[must_use]
    pub fn with_user_action(mut self, action: UserAction) -> Self {
        self.user_action = Some(action);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_both_ways() {
        for code in -1..=8 {
            assert_eq!(ServiceStatus::from_code(code).code(), code);
        }
        assert_eq!(ServiceStatus::from_code(42), ServiceStatus::Failure);
    }

    #[test]
    fn only_verdicts_are_failures() {
        assert!(!ServiceStatus::Success.is_failure());
        assert!(!ServiceStatus::PendingUserAction.is_failure());
        assert!(ServiceStatus::Incompatible.is_failure());
    }
}
