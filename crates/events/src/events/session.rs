use apkm_types::{ServiceStatus, SessionId};
use serde::{Deserialize, Serialize};

/// Installer session events emitted by the gateway and the completion relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The service assigned a session
    Created {
        session_id: SessionId,
        package_id: String,
    },

    /// A payload file was streamed into the session
    PayloadWritten {
        session_id: SessionId,
        name: String,
        bytes: u64,
    },

    /// The session was committed and now awaits its verdict
    Committed { session_id: SessionId },

    /// Progress reported by the session observer
    Progress { session_id: SessionId, progress: f32 },

    /// A completion notification reached the active session
    NotificationReceived {
        session_id: SessionId,
        status: ServiceStatus,
        message: Option<String>,
    },

    /// A notification was dropped because it targets no active session
    NotificationDropped {
        session_id: SessionId,
        status: ServiceStatus,
        active: Option<SessionId>,
    },

    /// The service needs the user to confirm the install
    UserActionRequested { session_id: SessionId, prompt: String },

    /// A begin request was refused because another session is in flight
    Rejected {
        package_id: String,
        active: Option<SessionId>,
    },

    /// The session was abandoned
    Abandoned {
        session_id: SessionId,
        reason: String,
    },
}
