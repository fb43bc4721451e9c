//! Receiving end of a phase channel

use apkm_types::Phase;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;

/// Ordered phases of one install session or run
///
/// Ends after the terminal phase.
#[derive(Debug)]
pub struct PhaseStream {
    rx: UnboundedReceiver<Phase>,
}

impl PhaseStream {
    pub(crate) fn new(rx: UnboundedReceiver<Phase>) -> Self {
        Self { rx }
    }

    /// Wait for the next phase; `None` once the stream has ended
    pub async fn next_phase(&mut self) -> Option<Phase> {
        self.rx.recv().await
    }

    /// Next phase already queued, without waiting
    pub(crate) fn try_next_phase(&mut self) -> Option<Phase> {
        self.rx.try_recv().ok()
    }

    /// Drain the stream and return its terminal phase
    pub async fn outcome(mut self) -> Option<Phase> {
        let mut last = None;
        while let Some(phase) = self.rx.recv().await {
            let terminal = phase.is_terminal();
            last = Some(phase);
            if terminal {
                break;
            }
        }
        last.filter(Phase::is_terminal)
    }

    /// Collect every phase until the stream ends
    pub async fn collect_all(mut self) -> Vec<Phase> {
        let mut phases = Vec::new();
        while let Some(phase) = self.rx.recv().await {
            let terminal = phase.is_terminal();
            phases.push(phase);
            if terminal {
                break;
            }
        }
        phases
    }
}

impl Stream for PhaseStream {
    type Item = Phase;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Phase>> {
        self.rx.poll_recv(cx)
    }
}
