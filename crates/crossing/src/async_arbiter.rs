//! Async arbiter for tokio tasks.
//!
//! Same transition rules as the blocking [`Arbiter`](crate::Arbiter). The state
//! sits behind a std mutex whose guard never lives across an `.await`; waiting
//! tasks park on a `Notify` that every `leave` broadcasts to. Each waiter
//! enables its `Notified` future before checking the predicate, so a `leave`
//! racing with the check cannot be missed.
//!
//! `enter` is cancel-safe: dropping the future while it waits withdraws the
//! crosser, which was never counted as an occupant.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{CrossingError, Result};
use crate::passage::{Channel, Passage};
use crate::side::Side;
use crate::snapshot::ArbiterSnapshot;
use crate::state::ArbiterState;

/// Direction-arbitrated channel for crossers running as tokio tasks.
pub struct AsyncArbiter {
    state: Mutex<ArbiterState>,
    changed: Notify,
}

/// Waiter registration that is withdrawn if the `enter` future is dropped.
struct WaitRegistration<'a> {
    arbiter: &'a AsyncArbiter,
    origin: Side,
    registered: bool,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        self.arbiter.lock().withdraw(self.origin);
        tracing::debug!(side = %self.origin, "Crosser gave up waiting");
        self.arbiter.changed.notify_waiters();
    }
}

impl AsyncArbiter {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(ArbiterState::new(capacity)?),
            changed: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        self.lock().snapshot()
    }

    /// Wait until `origin` may step onto the channel, then count it as an
    /// occupant.
    pub async fn enter(&self, origin: Side) {
        let mut waiter = WaitRegistration {
            arbiter: self,
            origin,
            registered: false,
        };

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                match state.admit_or_wait(origin, &mut waiter.registered) {
                    Ok(()) => {
                        tracing::trace!(side = %origin, occupants = state.occupants(), "Crosser admitted");
                        if state.opposite_side_must_recheck(origin) {
                            self.changed.notify_waiters();
                        }
                        return;
                    }
                    Err(reason) => {
                        tracing::trace!(side = %origin, %reason, "Crosser waiting");
                    }
                }
            }

            notified.await;
        }
    }

    /// Like [`enter`](Self::enter), but give up after `timeout`.
    pub async fn enter_timeout(&self, origin: Side, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        tokio::time::timeout(timeout, self.enter(origin))
            .await
            .map_err(|_| CrossingError::TimedOut {
                side: origin,
                waited: started.elapsed(),
            })
    }

    /// Like [`enter`](Self::enter), but give up once `cancel` fires.
    pub async fn enter_cancellable(&self, origin: Side, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = self.enter(origin) => Ok(()),
            () = cancel.cancelled() => Err(CrossingError::Cancelled { side: origin }),
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
            self.changed.notify_waiters();
        }
        Ok(())
    }

    /// Step off the channel.
    pub fn leave(&self, origin: Side) -> Result<()> {
        let release = self.lock().release(origin)?;
        tracing::trace!(side = %origin, ?release, "Crosser left");
        self.changed.notify_waiters();
        Ok(())
    }

    /// [`enter`](Self::enter) and return a guard that leaves on drop.
    pub async fn cross(&self, origin: Side) -> Passage<'_> {
        self.enter(origin).await;
        Passage::new(self, origin)
    }

    /// [`enter_timeout`](Self::enter_timeout) and return a guard that leaves on drop.
    pub async fn cross_timeout(&self, origin: Side, timeout: Duration) -> Result<Passage<'_>> {
        self.enter_timeout(origin, timeout).await?;
        Ok(Passage::new(self, origin))
    }

    // Transitions never panic under the lock, so a poisoned state is still valid.
    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Channel for AsyncArbiter {
    fn release(&self, origin: Side) -> Result<()> {
        self.leave(origin)
    }
}

impl std::fmt::Debug for AsyncArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncArbiter")
            .field("state", &self.snapshot())
            .finish()
    }
}
