//! The single active-session slot
//!
//! At most one session is in flight. The slot owns the sender half of that
//! session's phase channel; a terminal phase is only ever sent while taking
//! the session out of the slot, under the same lock, so each session sees
//! exactly one terminal phase and a late report for an old session can never
//! complete a newer one.

use apkm_types::{Phase, SessionId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

pub(crate) type PhaseSender = UnboundedSender<Phase>;

/// Identifies one `begin` call for the lifetime of its reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTicket(u64);

/// What the slot currently holds
#[derive(Debug)]
enum SlotState {
    Empty,
    /// Reserved while the service is creating the session
    Starting {
        ticket: SessionTicket,
        package_id: String,
        phases: PhaseSender,
    },
    Active(ActiveSession),
}

#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub ticket: SessionTicket,
    pub session_id: SessionId,
    pub package_id: String,
    pub phases: PhaseSender,
}

/// Session removed from the slot by a cancel request
#[derive(Debug)]
pub(crate) enum Evicted {
    Starting { phases: PhaseSender },
    Active(ActiveSession),
}

impl Evicted {
    pub fn phases(&self) -> &PhaseSender {
        match self {
            Self::Starting { phases } => phases,
            Self::Active(session) => &session.phases,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SessionSlot {
    state: Mutex<SlotState>,
    next_ticket: AtomicU64,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
            next_ticket: AtomicU64::new(1),
        }
    }
}

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panic while holding the lock cannot leave the state half-updated
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Reserve the slot for a new session
    ///
    /// Fails with the id of the session in flight (if it already has one)
    /// when the slot is taken.
    pub fn reserve(
        &self,
        package_id: &str,
        phases: PhaseSender,
    ) -> Result<SessionTicket, Option<SessionId>> {
        let mut state = self.lock();
        match &*state {
            SlotState::Empty => {
                let ticket = SessionTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
                *state = SlotState::Starting {
                    ticket,
                    package_id: package_id.to_string(),
                    phases,
                };
                Ok(ticket)
            }
            SlotState::Starting { .. } => Err(None),
            SlotState::Active(active) => Err(Some(active.session_id)),
        }
    }

    /// Attach the service-assigned id to a reservation
    ///
    /// Returns false when the reservation was cancelled in the meantime.
    pub fn activate(&self, ticket: SessionTicket, session_id: SessionId) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Empty) {
            SlotState::Starting {
                ticket: reserved,
                package_id,
                phases,
            } if reserved == ticket => {
                *state = SlotState::Active(ActiveSession {
                    ticket,
                    session_id,
                    package_id,
                    phases,
                });
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    pub fn active_id(&self) -> Option<SessionId> {
        match &*self.lock() {
            SlotState::Active(active) => Some(active.session_id),
            _ => None,
        }
    }

    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.active_id() == Some(session_id)
    }

    pub fn is_empty(&self) -> bool {
        matches!(&*self.lock(), SlotState::Empty)
    }

    /// Send a non-terminal phase to the active session
    ///
    /// Returns false, sending nothing, when `session_id` is not active.
    pub fn push(&self, session_id: SessionId, phase: Phase) -> bool {
        debug_assert!(!phase.is_terminal());
        match &*self.lock() {
            SlotState::Active(active) if active.session_id == session_id => {
                let _ = active.phases.send(phase);
                true
            }
            _ => false,
        }
    }

    /// Take the active session out of the slot and send its terminal phase
    ///
    /// The phase is built from the session being completed. Returns the
    /// session when it was active, `None` when the report was stale.
    pub fn complete_with<F>(&self, session_id: SessionId, build: F) -> Option<ActiveSession>
    where
        F: FnOnce(&ActiveSession) -> Phase,
    {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Empty) {
            SlotState::Active(active) if active.session_id == session_id => {
                let phase = build(&active);
                debug_assert!(phase.is_terminal());
                let _ = active.phases.send(phase);
                Some(active)
            }
            other => {
                *state = other;
                None
            }
        }
    }

    pub fn complete(&self, session_id: SessionId, phase: Phase) -> Option<ActiveSession> {
        self.complete_with(session_id, |_| phase)
    }

    /// Fail whatever the reservation `ticket` turned into
    ///
    /// Used when the submission worker dies or the service refuses to create
    /// the session. Returns the session id when one had been assigned.
    pub fn fail_ticket(&self, ticket: SessionTicket, phase: Phase) -> Option<Option<SessionId>> {
        let evicted = self.evict_ticket(ticket)?;
        let _ = evicted.phases().send(phase);
        Some(match evicted {
            Evicted::Starting { .. } => None,
            Evicted::Active(active) => Some(active.session_id),
        })
    }

    /// Remove whatever the slot holds
    pub fn evict(&self) -> Option<Evicted> {
        let mut state = self.lock();
        Self::take(&mut state)
    }

    /// Remove the slot's content only if it belongs to `ticket`
    pub fn evict_ticket(&self, ticket: SessionTicket) -> Option<Evicted> {
        let mut state = self.lock();
        let owned = match &*state {
            SlotState::Starting { ticket: held, .. } => *held == ticket,
            SlotState::Active(active) => active.ticket == ticket,
            SlotState::Empty => false,
        };
        if owned {
            Self::take(&mut state)
        } else {
            None
        }
    }

    fn take(state: &mut SlotState) -> Option<Evicted> {
        match std::mem::replace(state, SlotState::Empty) {
            SlotState::Empty => None,
            SlotState::Starting { phases, .. } => Some(Evicted::Starting { phases }),
            SlotState::Active(active) => Some(Evicted::Active(active)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkm_types::{FailureReason, ServiceStatus};
    use tokio::sync::mpsc;

    #[test]
    fn reserve_is_exclusive() {
        let slot = SessionSlot::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ticket = slot.reserve("a", tx.clone()).unwrap();
        assert_eq!(slot.reserve("b", tx.clone()), Err(None));

        assert!(slot.activate(ticket, SessionId(7)));
        assert_eq!(slot.reserve("b", tx), Err(Some(SessionId(7))));
    }

    #[test]
    fn terminal_phase_sent_once() {
        let slot = SessionSlot::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = slot.reserve("a", tx).unwrap();
        slot.activate(ticket, SessionId(1));

        assert!(slot.complete(SessionId(1), Phase::success("a")).is_some());
        assert!(slot.complete(SessionId(1), Phase::success("a")).is_none());
        assert!(!slot.push(SessionId(1), Phase::Finalizing));

        assert_eq!(rx.try_recv().unwrap(), Phase::success("a"));
        // The slot dropped its sender, so the channel is closed
        assert!(rx.try_recv().is_err());
        assert!(slot.is_empty());
    }

    #[test]
    fn stale_completion_leaves_active_session() {
        let slot = SessionSlot::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = slot.reserve("a", tx).unwrap();
        slot.activate(ticket, SessionId(2));

        let stale = Phase::failure(
            FailureReason::Service {
                status: ServiceStatus::Failure,
            },
            "old",
        );
        assert!(slot.complete(SessionId(1), stale).is_none());
        assert!(slot.is_active(SessionId(2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn activation_after_eviction_fails() {
        let slot = SessionSlot::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ticket = slot.reserve("a", tx).unwrap();
        assert!(matches!(slot.evict(), Some(Evicted::Starting { .. })));
        assert!(!slot.activate(ticket, SessionId(3)));
        assert!(slot.is_empty());
    }

    #[test]
    fn evict_ticket_ignores_other_reservations() {
        let slot = SessionSlot::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = slot.reserve("a", tx.clone()).unwrap();
        slot.activate(first, SessionId(1));
        slot.complete(SessionId(1), Phase::cancelled());

        let second = slot.reserve("b", tx).unwrap();
        assert!(slot.evict_ticket(first).is_none());
        assert!(slot.evict_ticket(second).is_some());
    }
}
