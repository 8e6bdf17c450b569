//! Loop region and loop decision.
//!
//! The [`Cab`] is the user-defined loop region of a vamp. [`should_loop`]
//! decides, on each playback tick, whether playback has run past the end of
//! the cab and must wrap back to its start. The decision is advisory: the
//! caller performs the seek.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::timing::Time;

/// The loop region of a vamp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cab {
    /// Loop start, in seconds. Never negative.
    pub start: Time,
    /// Loop end, in seconds. `None` until the region has been closed.
    #[serde(default)]
    pub end: Option<Time>,
    /// Whether playback wraps at `end`.
    #[serde(default)]
    pub loops: bool,
}

impl Default for Cab {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
            loops: false,
        }
    }
}

impl Cab {
    /// Create a cab, checking its invariants.
    pub fn new(start: Time, end: Option<Time>, loops: bool) -> Result<Self> {
        let cab = Self { start, end, loops };
        cab.validate()?;
        Ok(cab)
    }

    /// Check `start >= 0` and, for a looping cab with an end, `end >= start`.
    pub fn validate(&self) -> Result<()> {
        let start_ok = self.start.is_finite() && self.start >= 0.0;
        let end_ok = match self.end {
            Some(end) if self.loops => end.is_finite() && end >= self.start,
            Some(end) => end.is_finite(),
            None => true,
        };
        if start_ok && end_ok {
            Ok(())
        } else {
            Err(Error::InvalidCab {
                start: self.start,
                end: self.end,
            })
        }
    }

    /// Length of the region, if it has a positive one.
    pub fn length(&self) -> Option<Time> {
        self.end
            .map(|end| end - self.start)
            .filter(|len| *len > 0.0)
    }

    /// Whether this cab describes a region that can actually be looped.
    pub fn is_loopable(&self) -> bool {
        self.loops && self.length().is_some()
    }
}

/// Decide whether playback should wrap back to `cab.start`.
///
/// True only when playing, the cab loops, the cab has a positive length,
/// `true_time` has reached the cab end, and the workspace holds clips.
/// A zero-length cab never loops, so a degenerate region cannot cause a
/// seek on every tick.
pub fn should_loop(true_time: Time, cab: &Cab, playing: bool, empty: bool) -> bool {
    if !playing || empty || !cab.is_loopable() {
        return false;
    }
    match cab.end {
        Some(end) => true_time >= end,
        None => false,
    }
}
