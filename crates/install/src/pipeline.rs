//! Install pipeline
//!
//! Turns a package descriptor into the ordered phase stream a front end
//! observes: verify the payload files, hand them to the gateway, relay its
//! phases and bound the wait for a verdict with a wall-clock timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use apkm_config::TimeoutScope;
use apkm_errors::InstallError;
use apkm_events::{EventEmitter, EventSender, FailureContext, InstallEvent};
use apkm_types::{FailureReason, PackageDescriptor, Phase};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::config::InstallConfig;
use crate::gateway::InstallGateway;
use crate::service::SessionParams;
use crate::session::SessionTicket;
use crate::stream::PhaseStream;

/// Cancellation state shared between a run and `InstallPipeline::cancel`
#[derive(Debug, Default)]
struct RunControl {
    state: Mutex<RunState>,
}

#[derive(Debug, Default)]
struct RunState {
    cancelled: bool,
    ticket: Option<SessionTicket>,
}

impl RunControl {
    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Mark cancelled; returns the session ticket to cancel, if any
    fn cancel(&self) -> Option<SessionTicket> {
        let mut state = self.lock();
        state.cancelled = true;
        state.ticket
    }

    /// Record the session ticket; returns true when a cancel already arrived
    fn attach(&self, ticket: SessionTicket) -> bool {
        let mut state = self.lock();
        state.ticket = Some(ticket);
        state.cancelled
    }
}

pub struct InstallPipeline {
    gateway: Arc<InstallGateway>,
    config: InstallConfig,
    current: Mutex<Option<Arc<RunControl>>>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for InstallPipeline {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl std::fmt::Debug for InstallPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallPipeline")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InstallPipeline {
    #[must_use]
    pub fn new(gateway: Arc<InstallGateway>, config: InstallConfig) -> Self {
        Self {
            gateway,
            config,
            current: Mutex::new(None),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<InstallGateway> {
        &self.gateway
    }

    #[must_use]
    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Run one install and return its phase stream
    ///
    /// Must be called from within a tokio runtime. The stream yields
    /// `Extracting`, `Verifying`, `Installing`, the gateway's phases and ends
    /// with exactly one terminal phase.
    pub fn run(self: &Arc<Self>, descriptor: PackageDescriptor) -> PhaseStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(RunControl::default());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(control.clone());

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let package_id = descriptor.package_id.clone();
            let outcome = pipeline.drive(&descriptor, &control, &tx).await;
            pipeline.report(&package_id, &outcome, started);
            let _ = tx.send(outcome);
        });

        PhaseStream::new(rx)
    }

    /// Cancel the most recent run
    ///
    /// Idempotent. A run that has not opened its session yet stops before
    /// opening one.
    pub fn cancel(&self) {
        let control = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(control) = control {
            if let Some(ticket) = control.cancel() {
                self.gateway.cancel_ticket(ticket);
            }
        }
    }

    /// Everything up to the terminal phase, which is returned
    async fn drive(
        &self,
        descriptor: &PackageDescriptor,
        control: &RunControl,
        tx: &UnboundedSender<Phase>,
    ) -> Phase {
        let package_id = &descriptor.package_id;
        self.emit_install(InstallEvent::Started {
            package_id: package_id.clone(),
            version_name: descriptor.version_name.clone(),
            payloads: descriptor.payload_count(),
        });

        // Payloads were produced by the payload source before this run
        self.forward(package_id, tx, Phase::Extracting);
        self.forward(package_id, tx, Phase::Verifying);

        let missing = descriptor.missing_payloads();
        if !missing.is_empty() {
            let names: Vec<String> = missing
                .iter()
                .map(|path| {
                    path.file_name()
                        .unwrap_or(path.as_os_str())
                        .to_string_lossy()
                        .into_owned()
                })
                .collect();
            let error = InstallError::MissingPayload {
                paths: names.join(", "),
            };
            return Phase::failure(FailureReason::Input, error.to_string());
        }

        if control.is_cancelled() {
            return Phase::cancelled();
        }

        self.forward(package_id, tx, Phase::Installing);
        let mut deadline = match self.config.timeout_scope {
            TimeoutScope::WholeSession => Some(tokio::time::Instant::now() + self.config.timeout),
            TimeoutScope::AwaitOutcome => None,
        };

        let handle = self.gateway.begin(
            SessionParams::from(descriptor),
            descriptor.payload_paths.clone(),
        );
        if let Some(ticket) = handle.ticket {
            if control.attach(ticket) {
                self.gateway.cancel_ticket(ticket);
            }
        }
        let mut phases = handle.phases;

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, phases.next_phase()).await {
                    Ok(next) => next,
                    Err(_) => return self.time_out(package_id, handle.ticket, &mut phases, tx),
                },
                None => phases.next_phase().await,
            };

            let Some(phase) = next else {
                return Phase::failure(
                    FailureReason::Submission,
                    "install session ended without a result",
                );
            };
            if phase.is_terminal() {
                return phase;
            }
            if phase == Phase::Finalizing && deadline.is_none() {
                deadline = Some(tokio::time::Instant::now() + self.config.timeout);
            }
            self.forward(package_id, tx, phase);
        }
    }

    fn time_out(
        &self,
        package_id: &str,
        ticket: Option<SessionTicket>,
        phases: &mut PhaseStream,
        tx: &UnboundedSender<Phase>,
    ) -> Phase {
        let cancelled = ticket.is_some_and(|ticket| self.gateway.cancel_ticket(ticket));
        if !cancelled {
            // The session settled as the deadline passed; its verdict is queued
            while let Some(phase) = phases.try_next_phase() {
                if phase.is_terminal() {
                    return phase;
                }
                self.forward(package_id, tx, phase);
            }
        }
        self.emit_install(InstallEvent::TimedOut {
            package_id: package_id.to_string(),
            timeout: self.config.timeout,
        });
        let error = InstallError::Timeout {
            seconds: self.config.timeout.as_secs(),
        };
        Phase::failure(
            FailureReason::Timeout,
            format!(
                "{error}. The install session was cancelled; check the device for a pending confirmation prompt and try again."
            ),
        )
    }

    fn forward(&self, package_id: &str, tx: &UnboundedSender<Phase>, phase: Phase) {
        self.emit_install(InstallEvent::PhaseChanged {
            package_id: package_id.to_string(),
            phase: phase.clone(),
        });
        let _ = tx.send(phase);
    }

    fn report(&self, package_id: &str, outcome: &Phase, started: Instant) {
        let elapsed = started.elapsed();
        match outcome {
            Phase::Failure(failure) => self.emit_install(InstallEvent::Failed {
                package_id: package_id.to_string(),
                failure: FailureContext::from_install_failure(failure),
                elapsed,
            }),
            _ => self.emit_install(InstallEvent::Completed {
                package_id: package_id.to_string(),
                elapsed,
            }),
        }
    }
}
