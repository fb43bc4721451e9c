//! Install session gateway
//!
//! Opens a session with the installer service, streams the payload files
//! into it, commits it and exposes the resulting phases. Only one session
//! may be in flight; `begin` while busy is rejected without touching the
//! active session.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apkm_errors::{Error, InstallError, UserFacingError};
use apkm_events::{EventEmitter, EventSender, SessionEvent};
use apkm_types::{FailureReason, Phase, ServiceStatus, SessionId};
use tokio::sync::mpsc;

use crate::relay::{CompletionRelay, UserActionHandler};
use crate::service::{CompletionSink, InstallerService, SessionObserver, SessionParams};
use crate::session::{Evicted, SessionSlot, SessionTicket};
use crate::stream::PhaseStream;

/// Phases of one `begin` call plus the handle needed to cancel it
#[derive(Debug)]
pub struct SessionHandle {
    /// `None` when the call was rejected before reserving the slot
    pub ticket: Option<SessionTicket>,
    pub phases: PhaseStream,
}

pub struct InstallGateway {
    service: Arc<dyn InstallerService>,
    slot: Arc<SessionSlot>,
    relay: CompletionRelay,
    event_sender: Option<EventSender>,
}

impl EventEmitter for InstallGateway {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl std::fmt::Debug for InstallGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallGateway")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl InstallGateway {
    #[must_use]
    pub fn new(
        service: Arc<dyn InstallerService>,
        user_actions: Arc<dyn UserActionHandler>,
        event_sender: Option<EventSender>,
    ) -> Self {
        let slot = Arc::new(SessionSlot::default());
        let relay = CompletionRelay::new(slot.clone(), user_actions, event_sender.clone());
        Self {
            service,
            slot,
            relay,
            event_sender,
        }
    }

    /// The relay the service must deliver completion notifications to
    #[must_use]
    pub fn relay(&self) -> &CompletionRelay {
        &self.relay
    }

    /// Id of the session in flight, if one has been created
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        self.slot.active_id()
    }

    /// Whether no session is in flight or being created
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.slot.is_empty()
    }

    /// Start a session for `payloads` and return its phase stream
    ///
    /// Must be called from within a tokio runtime. Submission runs on a
    /// blocking worker; the returned stream yields `Finalizing` as the
    /// session is committed, then exactly one terminal phase.
    pub fn begin(&self, params: SessionParams, payloads: Vec<PathBuf>) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let phases = PhaseStream::new(rx);

        if payloads.is_empty() {
            let message = InstallError::NoPayload {
                package: params.package_id.clone(),
            };
            let _ = tx.send(Phase::failure(FailureReason::Input, message.to_string()));
            return SessionHandle {
                ticket: None,
                phases,
            };
        }

        let ticket = match self.slot.reserve(&params.package_id, tx.clone()) {
            Ok(ticket) => ticket,
            Err(active) => {
                self.emit_session(SessionEvent::Rejected {
                    package_id: params.package_id.clone(),
                    active,
                });
                let message = InstallError::SessionBusy {
                    session_id: active.map_or_else(|| "pending".to_string(), |id| id.to_string()),
                };
                let _ = tx.send(Phase::failure(FailureReason::Busy, message.to_string()));
                return SessionHandle {
                    ticket: None,
                    phases,
                };
            }
        };
        // Only the slot keeps a sender, so the stream ends with the session
        drop(tx);

        let worker = SubmissionWorker {
            service: self.service.clone(),
            slot: self.slot.clone(),
            relay: self.relay.clone(),
            event_sender: self.event_sender.clone(),
            params,
            payloads,
            ticket,
        };
        let handle = tokio::task::spawn_blocking(move || worker.run());

        let slot = self.slot.clone();
        let service = self.service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.await {
                let message = InstallError::TaskError {
                    message: err.to_string(),
                };
                let phase = Phase::failure(FailureReason::Submission, message.to_string());
                if let Some(Some(session_id)) = slot.fail_ticket(ticket, phase) {
                    let _ = service.abandon(session_id);
                }
            }
        });

        SessionHandle {
            ticket: Some(ticket),
            phases,
        }
    }

    /// Cancel whatever session is in flight
    ///
    /// Idempotent: returns false and does nothing when there is none. The
    /// cancelled stream ends with `Failure(cancelled)`.
    pub fn cancel(&self) -> bool {
        match self.slot.evict() {
            Some(evicted) => {
                self.finish_cancel(evicted);
                true
            }
            None => false,
        }
    }

    /// Cancel the session started by a particular `begin` call
    ///
    /// Does nothing when that session already ended.
    pub fn cancel_ticket(&self, ticket: SessionTicket) -> bool {
        match self.slot.evict_ticket(ticket) {
            Some(evicted) => {
                self.finish_cancel(evicted);
                true
            }
            None => false,
        }
    }

    fn finish_cancel(&self, evicted: Evicted) {
        if let Evicted::Active(active) = &evicted {
            self.service.unregister_observer(active.session_id);
            if let Err(err) = self.service.abandon(active.session_id) {
                self.emit_warning_with_context(
                    format!("failed to abandon session {}", active.session_id),
                    err.user_message(),
                );
            }
            self.emit_session(SessionEvent::Abandoned {
                session_id: active.session_id,
                reason: "cancelled".to_string(),
            });
        }
        // A reservation without a session is abandoned by its worker once
        // the service hands out the id
        let _ = evicted.phases().send(Phase::cancelled());
    }
}

/// Blocking half of `begin`
struct SubmissionWorker {
    service: Arc<dyn InstallerService>,
    slot: Arc<SessionSlot>,
    relay: CompletionRelay,
    event_sender: Option<EventSender>,
    params: SessionParams,
    payloads: Vec<PathBuf>,
    ticket: SessionTicket,
}

impl EventEmitter for SubmissionWorker {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl SubmissionWorker {
    fn run(self) {
        let session_id = match self.service.create_session(&self.params) {
            Ok(id) => id,
            Err(err) => {
                let message = InstallError::SessionCreateFailed {
                    message: err.user_message().into_owned(),
                };
                let phase = Phase::failure(FailureReason::Submission, message.to_string());
                self.slot.fail_ticket(self.ticket, phase);
                return;
            }
        };

        if !self.slot.activate(self.ticket, session_id) {
            let _ = self.service.abandon(session_id);
            self.emit_session(SessionEvent::Abandoned {
                session_id,
                reason: "cancelled before submission".to_string(),
            });
            return;
        }
        self.emit_session(SessionEvent::Created {
            session_id,
            package_id: self.params.package_id.clone(),
        });

        for (index, path) in self.payloads.iter().enumerate() {
            // Cancelled or timed out while streaming
            if !self.slot.is_active(session_id) {
                return;
            }
            if let Err(err) = self.write_payload(session_id, index, path) {
                self.fail(session_id, &err);
                return;
            }
        }

        let observer = Arc::new(ProgressObserver {
            slot: self.slot.clone(),
            package_id: self.params.package_id.clone(),
            event_sender: self.event_sender.clone(),
        });
        self.service.register_observer(session_id, observer);

        // Queued ahead of any verdict the commit itself may deliver
        if !self.slot.push(session_id, Phase::Finalizing) {
            self.service.unregister_observer(session_id);
            return;
        }

        let sink: Arc<dyn CompletionSink> = Arc::new(self.relay.clone());
        match self.service.commit(session_id, sink) {
            Ok(()) => self.emit_session(SessionEvent::Committed { session_id }),
            Err(err) => {
                self.service.unregister_observer(session_id);
                self.fail(
                    session_id,
                    &InstallError::CommitFailed {
                        message: err.user_message().into_owned(),
                    },
                );
            }
        }
    }

    fn write_payload(
        &self,
        session_id: SessionId,
        index: usize,
        path: &Path,
    ) -> Result<(), InstallError> {
        let name = format!("split_{index}.apk");
        let write_failed = |message: String| InstallError::WriteFailed {
            name: name.clone(),
            message,
        };

        let mut file =
            File::open(path).map_err(|e| write_failed(format!("{}: {e}", path.display())))?;
        let length = file
            .metadata()
            .map_err(|e| write_failed(format!("{}: {e}", path.display())))?
            .len();

        let mut out = self
            .service
            .open_write(session_id, &name, length)
            .map_err(|e: Error| write_failed(e.user_message().into_owned()))?;
        let bytes = io::copy(&mut file, &mut out).map_err(|e| write_failed(e.to_string()))?;
        out.flush().map_err(|e| write_failed(e.to_string()))?;

        self.emit_session(SessionEvent::PayloadWritten {
            session_id,
            name: name.clone(),
            bytes,
        });
        Ok(())
    }

    fn fail(&self, session_id: SessionId, err: &InstallError) {
        let phase = Phase::failure(FailureReason::Submission, err.to_string());
        if self.slot.complete(session_id, phase).is_some() {
            let _ = self.service.abandon(session_id);
            self.emit_session(SessionEvent::Abandoned {
                session_id,
                reason: err.to_string(),
            });
        }
    }
}

/// Per-session observer; reports the verdict as soon as the service has one
struct ProgressObserver {
    slot: Arc<SessionSlot>,
    package_id: String,
    event_sender: Option<EventSender>,
}

impl EventEmitter for ProgressObserver {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl SessionObserver for ProgressObserver {
    fn on_progress(&self, session_id: SessionId, progress: f32) {
        self.emit_session(SessionEvent::Progress {
            session_id,
            progress,
        });
    }

    fn on_finished(&self, session_id: SessionId, success: bool) {
        let phase = if success {
            Phase::success(self.package_id.clone())
        } else {
            Phase::failure(
                FailureReason::Service {
                    status: ServiceStatus::Failure,
                },
                "Installation failed (session finished unsuccessfully)",
            )
        };
        self.slot.complete(session_id, phase);
    }
}
