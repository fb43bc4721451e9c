//! Presentation-side install state machine
//!
//! Holds the current phase for a front end to observe and accepts the user's
//! install, cancel, retry and reset intents.

use std::sync::{Arc, Mutex, PoisonError};

use apkm_types::{PackageDescriptor, Phase};
use tokio::sync::watch;

use crate::pipeline::InstallPipeline;

#[derive(Debug)]
pub struct InstallController {
    pipeline: Arc<InstallPipeline>,
    state: Arc<watch::Sender<Phase>>,
    last: Mutex<Option<PackageDescriptor>>,
}

impl InstallController {
    #[must_use]
    pub fn new(pipeline: Arc<InstallPipeline>) -> Self {
        let (state, _) = watch::channel(Phase::Idle);
        Self {
            pipeline,
            state: Arc::new(state),
            last: Mutex::new(None),
        }
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> Phase {
        self.state.borrow().clone()
    }

    /// Observe phase changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.state.subscribe()
    }

    /// Start installing `descriptor`
    ///
    /// Ignored, returning false, unless the controller is idle.
    pub fn install(&self, descriptor: PackageDescriptor) -> bool {
        let started = self.state.send_if_modified(|phase| {
            if *phase == Phase::Idle {
                *phase = Phase::Extracting;
                true
            } else {
                false
            }
        });
        if started {
            self.start(descriptor);
        }
        started
    }

    /// Re-run the last install after a failure
    pub fn retry(&self) -> bool {
        let descriptor = self
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(descriptor) = descriptor else {
            return false;
        };
        let restarted = self.state.send_if_modified(|phase| {
            if matches!(phase, Phase::Failure(_)) {
                *phase = Phase::Extracting;
                true
            } else {
                false
            }
        });
        if restarted {
            self.start(descriptor);
        }
        restarted
    }

    /// Cancel the running install, if any
    pub fn cancel(&self) {
        let phase = self.state.borrow().clone();
        if !phase.is_terminal() && phase != Phase::Idle {
            self.pipeline.cancel();
        }
    }

    /// Return to idle after a terminal phase
    pub fn reset(&self) -> bool {
        self.state.send_if_modified(|phase| {
            if phase.is_terminal() {
                *phase = Phase::Idle;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the current run has delivered its terminal phase
    ///
    /// Cancel safe. Only meaningful after `install` or `retry`; while idle it
    /// waits for the next run to finish.
    pub async fn settled(&self) -> Phase {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(Phase::is_terminal).await.map(|phase| phase.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    fn start(&self, descriptor: PackageDescriptor) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(descriptor.clone());

        let mut phases = self.pipeline.run(descriptor);
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(phase) = phases.next_phase().await {
                let terminal = phase.is_terminal();
                state.send_replace(phase);
                if terminal {
                    break;
                }
            }
        });
    }
}
