//! Structured logging integration for events
//!
//! Converts domain events into tracing records with structured fields. The
//! level of every record comes from `AppEvent::log_level`.

use apkm_events::{AppEvent, InstallEvent, PayloadEvent, SessionEvent};
use tracing::Level;

/// Emit a record at a level only known at runtime
macro_rules! log_at {
    ($level:expr, target: $target:literal, $($rest:tt)+) => {{
        let level: Level = $level;
        if level == Level::ERROR {
            tracing::error!(target: $target, $($rest)+);
        } else if level == Level::WARN {
            tracing::warn!(target: $target, $($rest)+);
        } else if level == Level::INFO {
            tracing::info!(target: $target, $($rest)+);
        } else if level == Level::DEBUG {
            tracing::debug!(target: $target, $($rest)+);
        } else {
            tracing::trace!(target: $target, $($rest)+);
        }
    }};
}

/// Log an `AppEvent` using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    let level = event.log_level();

    match event {
        AppEvent::Session(session_event) => match session_event {
            SessionEvent::Created {
                session_id,
                package_id,
            } => {
                log_at!(level, target: "apkm::events::session",
                    session = %session_id,
                    package = %package_id,
                    "Install session created"
                );
            }
            SessionEvent::PayloadWritten {
                session_id,
                name,
                bytes,
            } => {
                log_at!(level, target: "apkm::events::session",
                    session = %session_id,
                    payload = %name,
                    bytes = bytes,
                    "Payload written"
                );
            }
            SessionEvent::NotificationReceived {
                session_id,
                status,
                message,
            } => {
                log_at!(level, target: "apkm::events::session",
                    session = %session_id,
                    status = %status,
                    message = ?message,
                    "Completion notification received"
                );
            }
            SessionEvent::NotificationDropped {
                session_id,
                status,
                active,
            } => {
                log_at!(level, target: "apkm::events::session",
                    session = %session_id,
                    status = %status,
                    active = ?active,
                    "Dropped notification for inactive session"
                );
            }
            SessionEvent::Abandoned { session_id, reason } => {
                log_at!(level, target: "apkm::events::session",
                    session = %session_id,
                    reason = %reason,
                    "Install session abandoned"
                );
            }
            other => {
                log_at!(level, target: "apkm::events::session",
                    fields = %event.log_fields(),
                    "{}", session_label(other)
                );
            }
        },

        AppEvent::Install(install_event) => match install_event {
            InstallEvent::Started {
                package_id,
                version_name,
                payloads,
            } => {
                log_at!(level, target: "apkm::events::install",
                    package = %package_id,
                    version = %version_name,
                    payloads = payloads,
                    "Install started"
                );
            }
            InstallEvent::PhaseChanged { package_id, phase } => {
                log_at!(level, target: "apkm::events::install",
                    package = %package_id,
                    phase = %phase,
                    "Install phase changed"
                );
            }
            InstallEvent::Completed {
                package_id,
                elapsed,
            } => {
                log_at!(level, target: "apkm::events::install",
                    package = %package_id,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Install completed"
                );
            }
            InstallEvent::Failed {
                package_id,
                failure,
                elapsed,
            } => {
                log_at!(level, target: "apkm::events::install",
                    package = %package_id,
                    code = ?failure.code,
                    message = %failure.message,
                    retryable = failure.retryable,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Install failed"
                );
            }
            InstallEvent::TimedOut {
                package_id,
                timeout,
            } => {
                log_at!(level, target: "apkm::events::install",
                    package = %package_id,
                    timeout_secs = timeout.as_secs(),
                    "Install timed out"
                );
            }
        },

        AppEvent::Payload(payload_event) => match payload_event {
            PayloadEvent::ExtractionFailed { archive, failure } => {
                log_at!(level, target: "apkm::events::payload",
                    archive = %archive.display(),
                    code = ?failure.code,
                    message = %failure.message,
                    "Extraction failed"
                );
            }
            _ => {
                log_at!(level, target: "apkm::events::payload",
                    fields = %event.log_fields(),
                    "Payload event"
                );
            }
        },

        AppEvent::General(_) => {
            log_at!(level, target: "apkm::events::general",
                fields = %event.log_fields(),
                "General event"
            );
        }
    }
}

fn session_label(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Created { .. } => "Install session created",
        SessionEvent::PayloadWritten { .. } => "Payload written",
        SessionEvent::Committed { .. } => "Install session committed",
        SessionEvent::Progress { .. } => "Install progress",
        SessionEvent::NotificationReceived { .. } => "Completion notification received",
        SessionEvent::NotificationDropped { .. } => "Dropped notification for inactive session",
        SessionEvent::UserActionRequested { .. } => "Confirmation requested",
        SessionEvent::Rejected { .. } => "Install session rejected: another session is active",
        SessionEvent::Abandoned { .. } => "Install session abandoned",
    }
}
