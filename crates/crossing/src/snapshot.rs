//! Point-in-time view of a channel, for reporting and tests.

use serde::{Deserialize, Serialize};

use crate::side::Side;
use crate::state::CrossingStats;

/// Channel phase derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Nobody on the channel and no reversal pending.
    Idle,
    /// Crossers on the channel, current direction renewable.
    Active { direction: Side },
    /// Crossers on the channel, direction flips to `next` once it empties.
    Reversing { direction: Side, next: Side },
}

/// Consistent copy of an arbiter's state, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterSnapshot {
    pub capacity: usize,
    pub occupants: usize,
    pub direction: Option<Side>,
    pub pending_reversal: bool,
    pub pending_direction: Option<Side>,
    pub waiting_east: usize,
    pub waiting_west: usize,
    pub stats: CrossingStats,
}

impl ArbiterSnapshot {
    pub fn waiting(&self, side: Side) -> usize {
        match side {
            Side::East => self.waiting_east,
            Side::West => self.waiting_west,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }

    pub fn phase(&self) -> Phase {
        match (self.occupants, self.direction, self.pending_direction) {
            (0, _, _) | (_, None, _) => Phase::Idle,
            (_, Some(direction), None) => Phase::Active { direction },
            (_, Some(direction), Some(next)) => Phase::Reversing { direction, next },
        }
    }
}
