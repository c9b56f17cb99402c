//! The two banks a crosser can start from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CrossingError;

/// Side of the channel a crosser starts from.
///
/// The side a crosser starts from is also the direction it travels in, so the
/// same type names the direction currently in force on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    East,
    West,
}

impl Side {
    /// Both sides, in index order.
    pub const ALL: [Side; 2] = [Side::East, Side::West];

    pub fn opposite(self) -> Side {
        match self {
            Side::East => Side::West,
            Side::West => Side::East,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::East => "east",
            Side::West => "west",
        }
    }

    /// Stable slot for per-side counters.
    pub(crate) fn index(self) -> usize {
        match self {
            Side::East => 0,
            Side::West => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = CrossingError;

    /// Accepts `east`/`west`, their initials, and the generic `a`/`b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "east" | "e" | "a" => Ok(Side::East),
            "west" | "w" | "b" => Ok(Side::West),
            _ => Err(CrossingError::InvalidSide(s.to_string())),
        }
    }
}
