//! Blocking arbiter for OS threads.
//!
//! Monitor discipline: one `Mutex<ArbiterState>` guards every read and write,
//! `enter` waits on a `Condvar` (releasing the lock while parked) and
//! re-checks its predicate after each wake-up, and every successful `leave`
//! wakes all waiters.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{CrossingError, Result};
use crate::passage::{Channel, Passage};
use crate::side::Side;
use crate::snapshot::ArbiterSnapshot;
use crate::state::ArbiterState;

/// Direction-arbitrated channel for crossers running on OS threads.
pub struct Arbiter {
    state: Mutex<ArbiterState>,
    changed: Condvar,
}

impl Arbiter {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(ArbiterState::new(capacity)?),
            changed: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        self.lock().snapshot()
    }

    /// Block until `origin` may step onto the channel, then count it as an
    /// occupant.
    pub fn enter(&self, origin: Side) {
        let admitted = self.wait_for_admission(origin, None);
        debug_assert!(admitted, "enter without deadline cannot time out");
    }

    /// Like [`enter`](Self::enter), but give up after `timeout`.
    ///
    /// A crosser that gives up was never an occupant. A timeout too large to
    /// express as an `Instant` waits without a deadline.
    pub fn enter_timeout(&self, origin: Side, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        if self.wait_for_admission(origin, started.checked_add(timeout)) {
            Ok(())
        } else {
            Err(CrossingError::TimedOut {
                side: origin,
                waited: started.elapsed(),
            })
        }
    }

    /// Enter only if no wait rule holds right now.
    pub fn try_enter(&self, origin: Side) -> Result<()> {
        let mut state = self.lock();
        state
            .try_admit(origin)
            .map_err(|reason| CrossingError::WouldBlock {
                side: origin,
                reason,
            })?;
        tracing::trace!(side = %origin, occupants = state.occupants(), "Crosser admitted");
        let recheck = state.opposite_side_must_recheck(origin);
        drop(state);
        if recheck {
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Step off the channel.
    pub fn leave(&self, origin: Side) -> Result<()> {
        let release = self.lock().release(origin)?;
        tracing::trace!(side = %origin, ?release, "Crosser left");
        self.changed.notify_all();
        Ok(())
    }

    /// [`enter`](Self::enter) and return a guard that leaves on drop.
    pub fn cross(&self, origin: Side) -> Passage<'_> {
        self.enter(origin);
        Passage::new(self, origin)
    }

    /// [`enter_timeout`](Self::enter_timeout) and return a guard that leaves on drop.
    pub fn cross_timeout(&self, origin: Side, timeout: Duration) -> Result<Passage<'_>> {
        self.enter_timeout(origin, timeout)?;
        Ok(Passage::new(self, origin))
    }

    /// Returns `false` if `deadline` passed first.
    fn wait_for_admission(&self, origin: Side, deadline: Option<Instant>) -> bool {
        let mut state = self.lock();
        let mut registered = false;

        loop {
            let reason = match state.admit_or_wait(origin, &mut registered) {
                Ok(()) => {
                    tracing::trace!(side = %origin, occupants = state.occupants(), "Crosser admitted");
                    let recheck = state.opposite_side_must_recheck(origin);
                    drop(state);
                    if recheck {
                        self.changed.notify_all();
                    }
                    return true;
                }
                Err(reason) => reason,
            };
            tracing::trace!(side = %origin, %reason, "Crosser waiting");

            state = match deadline {
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.withdraw(origin);
                        drop(state);
                        tracing::debug!(side = %origin, "Crosser gave up waiting");
                        // The withdrawal may have unblocked the other side.
                        self.changed.notify_all();
                        return false;
                    }
                    self.changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    // Transitions never panic under the lock, so a poisoned state is still valid.
    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Channel for Arbiter {
    fn release(&self, origin: Side) -> Result<()> {
        self.leave(origin)
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("state", &self.snapshot())
            .finish()
    }
}
