//! Playback state machine.
//!
//! [`PlaybackState`] keeps a frozen position plus the instant playback
//! started; the live position is derived by [`crate::timing::true_time`].
//! Recording is a flag on top of playing, not a separate state, so a
//! recording can never be active while stopped.

use serde::{Deserialize, Serialize};

use crate::timing::{self, Time, Timestamp};

/// Coarse view of the playback state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Stopped,
    Playing,
    Recording,
}

/// Transport state of a vamp.
///
/// Invariants: `recording` implies `playing`, and `play_start_time` is set
/// exactly when `playing` is true.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Whether the transport is running.
    pub playing: bool,
    /// Whether a take is being recorded.
    pub recording: bool,
    /// Position at the last play/seek/stop, in seconds.
    pub play_position: Time,
    /// Wall-clock instant at which `play_position` was anchored.
    pub play_start_time: Option<Timestamp>,
}

impl PlaybackState {
    /// Current mode.
    pub fn mode(&self) -> PlaybackMode {
        match (self.playing, self.recording) {
            (true, true) => PlaybackMode::Recording,
            (true, false) => PlaybackMode::Playing,
            _ => PlaybackMode::Stopped,
        }
    }

    /// True time at `now`.
    pub fn true_time(&self, now: Timestamp) -> Time {
        timing::true_time(self, now)
    }

    /// Start playback from the current position.
    ///
    /// Returns false (and changes nothing) if already playing.
    pub fn play(&mut self, now: Timestamp) -> bool {
        if self.playing {
            return false;
        }
        self.playing = true;
        self.play_start_time = Some(now);
        true
    }

    /// Stop playback, freezing the position at the current true time.
    ///
    /// Also ends any recording. Returns false if already stopped.
    pub fn stop(&mut self, now: Timestamp) -> bool {
        if !self.playing {
            return false;
        }
        self.play_position = self.true_time(now);
        self.play_start_time = None;
        self.playing = false;
        self.recording = false;
        true
    }

    /// Move the position to `time`.
    ///
    /// Valid in any state. While playing the anchor instant is reset so that
    /// true time continues smoothly from `time`. Bounds are not clamped to the
    /// cab; only negative targets are raised to zero.
    pub fn seek(&mut self, time: Time, now: Timestamp) {
        self.play_position = time.max(0.0);
        if self.playing {
            self.play_start_time = Some(now);
        }
    }

    /// Start recording, starting playback first if needed.
    ///
    /// Returns false if a recording is already running.
    pub fn start_recording(&mut self, now: Timestamp) -> bool {
        if self.recording {
            return false;
        }
        self.play(now);
        self.recording = true;
        true
    }

    /// Stop recording while leaving playback running.
    ///
    /// Returns false if nothing was being recorded.
    pub fn end_recording(&mut self) -> bool {
        if !self.recording {
            return false;
        }
        self.recording = false;
        true
    }

    /// Check the state invariants.
    pub fn is_consistent(&self) -> bool {
        (!self.recording || self.playing) && (self.playing == self.play_start_time.is_some())
    }
}
