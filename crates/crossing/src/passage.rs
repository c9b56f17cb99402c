//! RAII proof of occupancy.
//!
//! A `Passage` is handed out by `cross`/`cross_timeout` once the crosser is on
//! the channel. Leaving happens exactly once: explicitly through
//! [`Passage::leave`], or implicitly when the passage is dropped.

use crate::error::Result;
use crate::side::Side;

/// Something a crosser can step off of.
pub(crate) trait Channel: Sync {
    fn release(&self, origin: Side) -> Result<()>;
}

/// A crosser currently on the channel.
#[must_use = "dropping a Passage leaves the channel immediately"]
pub struct Passage<'a> {
    channel: &'a (dyn Channel + Sync),
    origin: Side,
    on_channel: bool,
}

impl<'a> Passage<'a> {
    pub(crate) fn new(channel: &'a (dyn Channel + Sync), origin: Side) -> Self {
        Self {
            channel,
            origin,
            on_channel: true,
        }
    }

    pub fn origin(&self) -> Side {
        self.origin
    }

    /// Leave the channel and report the outcome.
    pub fn leave(mut self) -> Result<()> {
        self.on_channel = false;
        self.channel.release(self.origin)
    }
}

impl Drop for Passage<'_> {
    fn drop(&mut self) {
        if self.on_channel
            && let Err(e) = self.channel.release(self.origin)
        {
            tracing::error!(side = %self.origin, error = %e, "Passage dropped but leave failed");
        }
    }
}

impl std::fmt::Debug for Passage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passage")
            .field("origin", &self.origin)
            .field("on_channel", &self.on_channel)
            .finish()
    }
}
