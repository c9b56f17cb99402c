use std::time::Duration;

use thiserror::Error;

use crate::side::Side;
use crate::state::BlockReason;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrossingError {
    #[error("capacity must be at least 1")]
    ZeroCapacity,

    #[error("invalid side '{0}', expected east or west")]
    InvalidSide(String),

    #[error("leave({side}) called while the channel is empty")]
    NotOnChannel { side: Side },

    #[error("leave({side}) called while the channel carries {current} traffic")]
    WrongDirection { side: Side, current: Side },

    #[error("enter({side}) would block: {reason}")]
    WouldBlock { side: Side, reason: BlockReason },

    #[error("enter({side}) timed out after {waited:?}")]
    TimedOut { side: Side, waited: Duration },

    #[error("enter({side}) cancelled")]
    Cancelled { side: Side },
}

impl CrossingError {
    /// True for errors caused by calling `leave` without a matching `enter`.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CrossingError::NotOnChannel { .. } | CrossingError::WrongDirection { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CrossingError>;
