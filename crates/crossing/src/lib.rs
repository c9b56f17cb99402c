//! crossing: a direction-constrained, capacity-limited crossing arbiter.
//!
//! A single channel carries traffic in one direction at a time, holds at most
//! `capacity` crossers, and flips direction once it empties if a crosser from
//! the other side asked for it. Crossers call `enter(side)` before using the
//! channel and `leave(side)` afterwards, or hold a [`Passage`] that leaves on
//! drop.
//!
//! - [`Arbiter`] blocks OS threads (mutex + condition variable).
//! - [`AsyncArbiter`] suspends tokio tasks (mutex + `Notify`).

mod arbiter;
mod async_arbiter;
mod error;
mod passage;
mod side;
mod snapshot;

pub mod state;

pub use arbiter::Arbiter;
pub use async_arbiter::AsyncArbiter;
pub use error::{CrossingError, Result};
pub use passage::Passage;
pub use side::Side;
pub use snapshot::{ArbiterSnapshot, Phase};
pub use state::{ArbiterState, BlockReason, CrossingStats, Release};
pub use tokio_util::sync::CancellationToken;
