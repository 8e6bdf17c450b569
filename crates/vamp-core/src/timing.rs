//! Timing primitives for playback.
//!
//! This module provides the clock side of the engine:
//!
//! - [`Time`] / [`Timestamp`] - seconds on the session timeline vs. wall-clock milliseconds
//! - [`true_time`] - the derived playback position
//! - [`ClockSource`] - where `now()` comes from ([`SystemClock`], [`ManualClock`])

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::playback::PlaybackState;

/// A position on the session timeline, in seconds.
pub type Time = f64;

/// A wall-clock reading in milliseconds since an arbitrary monotonic epoch.
pub type Timestamp = f64;

/// Tick interval for loop detection.
pub const PLAYBACK_TICK_MS: u64 = 5;

/// Tick interval for visual consumers.
pub const DISPLAY_TICK_MS: u64 = 200;

/// Convert a millisecond span to seconds.
#[inline]
pub fn ms_to_seconds(ms: f64) -> Time {
    ms / 1000.0
}

/// Calculate the true playback time at `now`.
///
/// While stopped this is exactly `play_position`. While playing it is
/// `play_position` plus the wall-clock time elapsed since playback started.
/// A `now` earlier than the start instant counts as zero elapsed time, and
/// the result is never negative.
pub fn true_time(state: &PlaybackState, now: Timestamp) -> Time {
    match (state.playing, state.play_start_time) {
        (true, Some(started)) => {
            let elapsed = ms_to_seconds((now - started).max(0.0));
            (state.play_position + elapsed).max(0.0)
        }
        _ => state.play_position.max(0.0),
    }
}

/// Source of wall-clock timestamps.
///
/// Readings are assumed monotonic non-decreasing. No skew correction is
/// performed here.
pub trait ClockSource: Send + Sync {
    /// Current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Create a clock whose epoch is the moment of creation.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same reading, so a test (or the replay driver) can hold
/// one copy while the engine reads another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock at the given timestamp.
    pub fn at(now: Timestamp) -> Self {
        let clock = Self::default();
        clock.set(now);
        clock
    }

    /// Set the current reading. Earlier readings are ignored.
    pub fn set(&self, now: Timestamp) {
        // Err means a later reading won the race
        let _ = self
            .millis
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (now >= f64::from_bits(bits)).then_some(now.to_bits())
            });
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: f64) {
        self.set(self.now() + ms.max(0.0));
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Timestamp {
        f64::from_bits(self.millis.load(Ordering::Acquire))
    }
}
