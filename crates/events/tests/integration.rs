//! Integration tests for events

#[cfg(test)]
mod tests {
    use apkm_errors::InstallError;
    use apkm_events::*;
    use apkm_types::{FailureReason, InstallFailure, Phase, ServiceStatus, SessionId};

    #[tokio::test]
    async fn test_event_sender_emit() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, AppEvent::General(GeneralEvent::Error { .. })));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_optional_sender_is_silent_when_absent() {
        let none: Option<EventSender> = None;
        none.emit_warning("nobody listens");
    }

    #[test]
    fn test_log_levels() {
        let dropped = AppEvent::Session(SessionEvent::NotificationDropped {
            session_id: SessionId(3),
            status: ServiceStatus::Success,
            active: None,
        });
        assert_eq!(dropped.log_level(), tracing::Level::DEBUG);
        assert_eq!(dropped.log_target(), "apkm::events::session");

        let cancelled = AppEvent::Install(InstallEvent::Failed {
            package_id: "com.example".into(),
            failure: FailureContext::from_install_failure(&InstallFailure::new(
                FailureReason::Cancelled,
                "cancelled",
            )),
            elapsed: std::time::Duration::from_secs(1),
        });
        assert_eq!(cancelled.log_level(), tracing::Level::WARN);

        let phase = AppEvent::Install(InstallEvent::PhaseChanged {
            package_id: "com.example".into(),
            phase: Phase::Finalizing,
        });
        assert_eq!(phase.log_fields(), "package=com.example phase=finalizing");
    }

    #[test]
    fn test_failure_context_from_error() {
        let ctx = FailureContext::from_error(&InstallError::Timeout { seconds: 5 });
        assert_eq!(ctx.code.as_deref(), Some("install.timeout"));
        assert!(ctx.retryable);
        assert!(ctx.hint.is_some());
    }

    #[test]
    fn test_app_event_serialization_is_tagged() {
        let event = AppEvent::Session(SessionEvent::Committed {
            session_id: SessionId(12),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "session");
        assert_eq!(json["event"]["type"], "Committed");
        assert_eq!(json["event"]["session_id"], 12);
    }
}
