//! Completion relay
//!
//! Receives the service's asynchronous completion notifications and routes
//! them to the active session's phase channel. Notifications for any other
//! session are dropped.

use std::sync::Arc;

use apkm_errors::{Error, InstallError};
use apkm_events::{EventEmitter, EventSender, SessionEvent};
use apkm_types::{CompletionNotification, FailureReason, Phase, ServiceStatus, UserAction};

use crate::service::CompletionSink;
use crate::session::SessionSlot;

/// Presents a confirmation request to the user
///
/// Must return promptly; the answer travels back to the service out of band.
pub trait UserActionHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the request cannot be shown at all.
    fn request_confirmation(&self, action: UserAction) -> Result<(), Error>;
}

/// Handler for front ends that cannot show confirmations
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUserAction;

impl UserActionHandler for NoUserAction {
    fn request_confirmation(&self, _action: UserAction) -> Result<(), Error> {
        Err(Error::internal("no confirmation handler is attached"))
    }
}

/// What the relay did with a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Forwarded as a non-terminal phase
    Progressed,
    /// Completed the active session
    Completed,
    /// Not for the active session, or the session already had its outcome
    Dropped,
}

#[derive(Clone)]
pub struct CompletionRelay {
    slot: Arc<SessionSlot>,
    user_actions: Arc<dyn UserActionHandler>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for CompletionRelay {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl std::fmt::Debug for CompletionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRelay")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl CompletionRelay {
    pub(crate) fn new(
        slot: Arc<SessionSlot>,
        user_actions: Arc<dyn UserActionHandler>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            slot,
            user_actions,
            event_sender,
        }
    }

    /// Route one notification
    pub fn deliver(&self, notification: CompletionNotification) -> Delivery {
        let session_id = notification.session_id;
        let status = notification.status;

        let active = self.slot.active_id();
        if active != Some(session_id) {
            self.emit_session(SessionEvent::NotificationDropped {
                session_id,
                status,
                active,
            });
            return Delivery::Dropped;
        }

        self.emit_session(SessionEvent::NotificationReceived {
            session_id,
            status,
            message: notification.message.clone(),
        });

        match status {
            ServiceStatus::PendingUserAction => self.request_user_action(notification),
            ServiceStatus::Success => {
                let completed = self.slot.complete_with(session_id, |active| {
                    Phase::success(active.package_id.clone())
                });
                delivered(completed.is_some(), Delivery::Completed)
            }
            failed => {
                let message = notification
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Installation failed (status={})", failed.code()));
                let phase = Phase::failure(FailureReason::Service { status: failed }, message);
                delivered(
                    self.slot.complete(session_id, phase).is_some(),
                    Delivery::Completed,
                )
            }
        }
    }

    fn request_user_action(&self, notification: CompletionNotification) -> Delivery {
        let session_id = notification.session_id;
        if !self.slot.push(session_id, Phase::PendingUserAction) {
            return Delivery::Dropped;
        }

        let action = notification.user_action.unwrap_or_else(|| UserAction {
            session_id,
            package_id: notification.package_id.clone(),
            prompt: format!(
                "Install {}?",
                notification.package_id.as_deref().unwrap_or("this package")
            ),
        });
        self.emit_session(SessionEvent::UserActionRequested {
            session_id,
            prompt: action.prompt.clone(),
        });

        if let Err(err) = self.user_actions.request_confirmation(action) {
            let message = InstallError::ConfirmationFailed {
                message: err.to_string(),
            }
            .to_string();
            let phase = Phase::failure(FailureReason::Submission, message);
            return delivered(
                self.slot.complete(session_id, phase).is_some(),
                Delivery::Completed,
            );
        }
        Delivery::Progressed
    }
}

fn delivered(accepted: bool, outcome: Delivery) -> Delivery {
    if accepted {
        outcome
    } else {
        Delivery::Dropped
    }
}

impl CompletionSink for CompletionRelay {
    fn on_notification(&self, notification: CompletionNotification) {
        self.deliver(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkm_types::SessionId;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingHandler {
        actions: Mutex<Vec<UserAction>>,
    }

    impl UserActionHandler for RecordingHandler {
        fn request_confirmation(&self, action: UserAction) -> Result<(), Error> {
            self.actions.lock().unwrap().push(action);
            Ok(())
        }
    }

    fn active_slot(
        session_id: SessionId,
    ) -> (Arc<SessionSlot>, mpsc::UnboundedReceiver<Phase>) {
        let slot = Arc::new(SessionSlot::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let ticket = slot.reserve("com.example", tx).unwrap();
        assert!(slot.activate(ticket, session_id));
        (slot, rx)
    }

    #[test]
    fn success_uses_active_package_id() {
        let (slot, mut rx) = active_slot(SessionId(4));
        let relay = CompletionRelay::new(slot, Arc::new(NoUserAction), None);

        let delivery = relay.deliver(CompletionNotification::new(SessionId(4), ServiceStatus::Success));
        assert_eq!(delivery, Delivery::Completed);
        assert_eq!(rx.try_recv().unwrap(), Phase::success("com.example"));
    }

    #[test]
    fn failure_without_message_names_status() {
        let (slot, mut rx) = active_slot(SessionId(4));
        let relay = CompletionRelay::new(slot, Arc::new(NoUserAction), None);

        relay.deliver(
            CompletionNotification::new(SessionId(4), ServiceStatus::Storage).with_message("  "),
        );
        let phase = rx.try_recv().unwrap();
        let failure = phase.as_failure().unwrap();
        assert_eq!(failure.message, "Installation failed (status=6)");
        assert_eq!(
            failure.reason,
            FailureReason::Service {
                status: ServiceStatus::Storage
            }
        );
    }

    #[test]
    fn mismatched_session_is_dropped() {
        let (slot, mut rx) = active_slot(SessionId(9));
        let (events, mut event_rx) = apkm_events::channel();
        let relay = CompletionRelay::new(slot.clone(), Arc::new(NoUserAction), Some(events));

        let delivery = relay.deliver(CompletionNotification::new(SessionId(8), ServiceStatus::Failure));
        assert_eq!(delivery, Delivery::Dropped);
        assert!(rx.try_recv().is_err());
        assert!(slot.is_active(SessionId(9)));
        assert!(matches!(
            event_rx.try_recv().unwrap(),
            apkm_events::AppEvent::Session(SessionEvent::NotificationDropped {
                active: Some(SessionId(9)),
                ..
            })
        ));
    }

    #[test]
    fn pending_user_action_forwards_and_prompts() {
        let (slot, mut rx) = active_slot(SessionId(5));
        let handler = Arc::new(RecordingHandler::default());
        let relay = CompletionRelay::new(slot.clone(), handler.clone(), None);

        let delivery = relay.deliver(
            CompletionNotification::new(SessionId(5), ServiceStatus::PendingUserAction)
                .with_package("com.example"),
        );
        assert_eq!(delivery, Delivery::Progressed);
        assert_eq!(rx.try_recv().unwrap(), Phase::PendingUserAction);
        assert!(slot.is_active(SessionId(5)));

        let actions = handler.actions.lock().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].prompt, "Install com.example?");
    }

    #[test]
    fn confirmation_failure_ends_session() {
        let (slot, mut rx) = active_slot(SessionId(6));
        let relay = CompletionRelay::new(slot.clone(), Arc::new(NoUserAction), None);

        relay.deliver(CompletionNotification::new(
            SessionId(6),
            ServiceStatus::PendingUserAction,
        ));
        assert_eq!(rx.try_recv().unwrap(), Phase::PendingUserAction);
        let phase = rx.try_recv().unwrap();
        assert!(phase
            .as_failure()
            .unwrap()
            .message
            .starts_with("Could not show install confirmation: "));
        assert!(slot.is_empty());
    }
}
