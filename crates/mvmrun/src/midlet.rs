//! # Application Peer State Machine
//!
//! Per-application lifecycle state, exclusively owned by the hosting isolate
//! and guarded by one shared lock. The transition table collapses a rapid
//! pause-then-resume (or resume-then-pause) issued before the corresponding
//! callback ran, so that the callback is never invoked at all; this is a
//! correctness rule, not an optimization artifact, and the early-return arms
//! never write the other half of the pair.

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use mvmrpc::WindowId;

/// Lifecycle states in ascending priority order. The priority is what the
/// orchestrator uses to decide which application most urgently needs action
/// when scanning all peers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MidletState {
    Paused,
    Active,
    ActivePending,
    PausePending,
    DestroyPending,
    Destroyed,
}

impl MidletState {
    /// Scheduling priority; higher means more urgent.
    pub fn priority(self) -> u8 {
        match self {
            Self::Paused => 0,
            Self::Active => 1,
            Self::ActivePending => 2,
            Self::PausePending => 3,
            Self::DestroyPending => 4,
            Self::Destroyed => 5,
        }
    }
}

impl std::fmt::Display for MidletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Paused => "paused",
            Self::Active => "active",
            Self::ActivePending => "active-pending",
            Self::PausePending => "pause-pending",
            Self::DestroyPending => "destroy-pending",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

struct Inner {
    state: MidletState,
}

/// The state holder for one running application.
///
/// All mutation happens while holding the shared lock, and every successful
/// mutation wakes all threads waiting on it. There is no error path inside
/// [`MidletPeer::request_state`]: the table yields a defined result for every
/// pair, including "ignored".
pub struct MidletPeer {
    display_id: WindowId,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl MidletPeer {
    /// Creates a peer in `ActivePending`: newly created applications are
    /// scheduled to start soon.
    pub fn new(display_id: WindowId) -> Self {
        Self {
            display_id,
            inner: Mutex::new(Inner { state: MidletState::ActivePending }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The window this application drives.
    pub fn display_id(&self) -> WindowId {
        self.display_id
    }

    /// A snapshot of the current state; may be stale the moment it returns.
    pub fn state(&self) -> MidletState {
        self.lock().state
    }

    /// Applies the transition table and returns the resulting state.
    ///
    /// The "ignored" arms return without mutating and without notifying; the
    /// collapsing arms jump directly to the settled state so the cancelled
    /// pending state never materializes.
    pub fn request_state(&self, requested: MidletState) -> MidletState {
        use MidletState::*;

        let mut inner = self.lock();
        let current = inner.state;
        let next = match (current, requested) {
            (Destroyed, _) => return current,
            (DestroyPending, Destroyed) => Destroyed,
            (DestroyPending, _) => return current,
            (Paused, PausePending) => return current,
            (PausePending, ActivePending) => Active,
            (Active, ActivePending) => return current,
            (ActivePending, PausePending) => Paused,
            (_, requested) => requested,
        };
        inner.state = next;
        self.changed.notify_all();
        next
    }

    /// Blocks the calling thread until `pred` holds for the state or the
    /// deadline passes, in the platform's bounded wait/notify style.
    /// Returns the state observed last.
    pub fn wait_for(
        &self,
        mut pred: impl FnMut(MidletState) -> bool,
        timeout: Duration,
    ) -> MidletState {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| !pred(inner.state))
            .unwrap_or_else(PoisonError::into_inner);
        guard.state
    }
}
