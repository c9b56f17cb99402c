//! Channel state and its transition rules.
//!
//! `ArbiterState` is plain data: it never blocks and never locks. The blocking
//! [`Arbiter`](crate::Arbiter) and the async [`AsyncArbiter`](crate::AsyncArbiter)
//! keep one behind a mutex and apply these transitions while holding it, so every
//! `enter`/`leave` is atomic with respect to other crossers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CrossingError, Result};
use crate::side::Side;
use crate::snapshot::{ArbiterSnapshot, Phase};

/// Why a crosser cannot step onto the channel right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Every slot is taken.
    AtCapacity,
    /// The channel carries traffic in the other direction.
    OppositeDirection,
    /// A reversal toward the other side is pending; the current direction is
    /// not renewed.
    ReversalPending,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockReason::AtCapacity => "channel at capacity",
            BlockReason::OppositeDirection => "channel carries opposite traffic",
            BlockReason::ReversalPending => "reversal pending for the other side",
        })
    }
}

/// Outcome of a successful `leave`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other crossers are still on the channel.
    Occupied { remaining: usize },
    /// The channel emptied. The direction goes back to undetermined unless
    /// waiters of an adopted reversal are still owed their turn.
    Emptied,
    /// The channel emptied and the pending reversal was adopted.
    Reversed { next: Side },
}

/// Cumulative counters, kept for reporting and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingStats {
    pub admitted_east: u64,
    pub admitted_west: u64,
    /// Reversals adopted when the channel emptied.
    pub reversals: u64,
    /// Times a blocked crosser marked a reversal as pending.
    pub reversal_requests: u64,
    /// Waits given up through timeout, cancellation or a dropped future.
    pub abandoned: u64,
    pub peak_occupancy: usize,
}

impl CrossingStats {
    pub fn admitted(&self, side: Side) -> u64 {
        match side {
            Side::East => self.admitted_east,
            Side::West => self.admitted_west,
        }
    }

    fn record_admission(&mut self, side: Side, occupants: usize) {
        match side {
            Side::East => self.admitted_east += 1,
            Side::West => self.admitted_west += 1,
        }
        self.peak_occupancy = self.peak_occupancy.max(occupants);
    }
}

/// Shared state of one channel.
#[derive(Debug, Clone)]
pub struct ArbiterState {
    capacity: usize,
    direction: Option<Side>,
    occupants: usize,
    /// `Some(side)` while a reversal toward `side` is pending.
    pending: Option<Side>,
    /// Crossers blocked in `enter`, per side.
    waiting: [usize; 2],
    /// Waiters of the adopted direction that have not boarded since the
    /// reversal was adopted. No new reversal is requested while non-zero.
    boarding: usize,
    stats: CrossingStats,
}

impl ArbiterState {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CrossingError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            direction: None,
            occupants: 0,
            pending: None,
            waiting: [0; 2],
            boarding: 0,
            stats: CrossingStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupants(&self) -> usize {
        self.occupants
    }

    pub fn direction(&self) -> Option<Side> {
        self.direction
    }

    pub fn pending(&self) -> Option<Side> {
        self.pending
    }

    pub fn waiting(&self, side: Side) -> usize {
        self.waiting[side.index()]
    }

    pub fn boarding(&self) -> usize {
        self.boarding
    }

    pub fn stats(&self) -> &CrossingStats {
        &self.stats
    }

    /// The first wait rule that stops `origin` from entering, if any.
    pub fn blocker(&self, origin: Side) -> Option<BlockReason> {
        if self.pending.is_some_and(|next| next != origin) {
            return Some(BlockReason::ReversalPending);
        }
        if let Some(current) = self.direction
            && current != origin
            && !self.direction_is_stale(current)
        {
            return Some(BlockReason::OppositeDirection);
        }
        if self.occupants == self.capacity {
            return Some(BlockReason::AtCapacity);
        }
        None
    }

    /// An empty channel whose direction nobody is waiting to use is idle.
    ///
    /// The direction survives an empty channel only after a reversal was
    /// adopted; the crossers it was adopted for go first.
    fn direction_is_stale(&self, current: Side) -> bool {
        self.occupants == 0 && self.pending.is_none() && self.waiting[current.index()] == 0
    }

    /// Admit `origin` if no wait rule holds. Never registers a waiter and never
    /// requests a reversal.
    pub fn try_admit(&mut self, origin: Side) -> std::result::Result<(), BlockReason> {
        if let Some(reason) = self.blocker(origin) {
            return Err(reason);
        }
        self.direction = Some(origin);
        self.occupants += 1;
        self.stats.record_admission(origin, self.occupants);
        debug_assert!(self.is_consistent());
        Ok(())
    }

    /// One evaluation of the wait loop inside `enter`.
    ///
    /// `registered` tracks whether this crosser is counted as waiting. On
    /// admission the registration is dropped; on a block the crosser is
    /// registered (once) and requests a reversal if the opposite direction
    /// holds an occupied channel.
    pub fn admit_or_wait(
        &mut self,
        origin: Side,
        registered: &mut bool,
    ) -> std::result::Result<(), BlockReason> {
        match self.try_admit(origin) {
            Ok(()) => {
                if *registered {
                    self.waiting[origin.index()] -= 1;
                    *registered = false;
                    self.boarding = self.boarding.saturating_sub(1);
                }
                Ok(())
            }
            Err(reason) => {
                if !*registered {
                    self.waiting[origin.index()] += 1;
                    *registered = true;
                }
                self.request_reversal(origin);
                Err(reason)
            }
        }
    }

    /// True when crossers from the other side wait and could now request a
    /// reversal they were held back from: the channel was empty, or the
    /// adopted direction was still boarding its waiters.
    pub fn opposite_side_must_recheck(&self, origin: Side) -> bool {
        self.pending.is_none()
            && self.boarding == 0
            && self.occupants > 0
            && self.direction == Some(origin)
            && self.waiting[origin.opposite().index()] > 0
    }

    /// Mark a reversal toward `origin` as pending.
    ///
    /// Only applies while the channel is occupied in the other direction, no
    /// reversal is pending yet and the waiters of the last adopted reversal
    /// have all boarded. Returns whether a new request was recorded.
    pub fn request_reversal(&mut self, origin: Side) -> bool {
        let opposed = self.direction.is_some_and(|current| current != origin);
        if self.pending.is_some() || self.boarding > 0 || self.occupants == 0 || !opposed {
            return false;
        }
        self.pending = Some(origin);
        self.stats.reversal_requests += 1;
        tracing::debug!(side = %origin, occupants = self.occupants, "Reversal requested");
        debug_assert!(self.is_consistent());
        true
    }

    /// A registered waiter gives up without entering.
    ///
    /// When the last waiter of a pending reversal leaves, the reversal request
    /// goes with it so the current direction is renewed again.
    pub fn withdraw(&mut self, origin: Side) {
        let slot = &mut self.waiting[origin.index()];
        debug_assert!(*slot > 0, "withdraw without a registered waiter");
        *slot = slot.saturating_sub(1);
        self.stats.abandoned += 1;

        let left = *slot;

        if self.pending == Some(origin) && left == 0 {
            self.pending = None;
            tracing::debug!(side = %origin, "Reversal request withdrawn");
        }
        if self.direction == Some(origin) {
            self.boarding = self.boarding.min(left);
        }
        debug_assert!(self.is_consistent());
    }

    /// Apply `leave(origin)`.
    ///
    /// Calling this without a matching admission is a contract violation and
    /// leaves the state untouched.
    pub fn release(&mut self, origin: Side) -> Result<Release> {
        if self.occupants == 0 {
            return Err(CrossingError::NotOnChannel { side: origin });
        }
        match self.direction {
            Some(current) if current != origin => {
                return Err(CrossingError::WrongDirection {
                    side: origin,
                    current,
                });
            }
            _ => {}
        }

        self.occupants -= 1;
        let release = if self.occupants > 0 {
            Release::Occupied {
                remaining: self.occupants,
            }
        } else if let Some(next) = self.pending.take() {
            self.direction = Some(next);
            self.boarding = self.waiting[next.index()];
            self.stats.reversals += 1;
            tracing::debug!(from = %origin, to = %next, boarding = self.boarding, "Reversal adopted");
            Release::Reversed { next }
        } else {
            if self.boarding == 0 {
                self.direction = None;
            }
            Release::Emptied
        };

        debug_assert!(self.is_consistent());
        Ok(release)
    }

    /// Check the invariants that hold whenever the lock is free.
    pub fn is_consistent(&self) -> bool {
        let bounded = self.occupants <= self.capacity;
        let directed = self.occupants == 0 || self.direction.is_some();
        let pending_ok = match self.pending {
            Some(next) => {
                self.occupants > 0 && self.direction != Some(next) && self.boarding == 0
            }
            None => true,
        };
        let boarding_ok = self.boarding == 0
            || self
                .direction
                .is_some_and(|current| self.boarding <= self.waiting[current.index()]);
        bounded && directed && pending_ok && boarding_ok
    }

    pub fn phase(&self) -> Phase {
        self.snapshot().phase()
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            capacity: self.capacity,
            occupants: self.occupants,
            direction: self.direction,
            pending_reversal: self.pending.is_some(),
            pending_direction: self.pending,
            waiting_east: self.waiting[Side::East.index()],
            waiting_west: self.waiting[Side::West.index()],
            stats: self.stats,
        }
    }
}
