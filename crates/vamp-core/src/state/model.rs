//! State model types for a Vamp session.
//!
//! [`SessionState`] holds everything the engine mutates: the transport, the
//! cab, the confirmed clips and the speculative client clips. It is owned by
//! whoever drives the engine (the runtime thread, a test, the replay driver)
//! and passed around by reference; there is no global instance.

use serde::{Deserialize, Serialize};

use crate::clips::{clips_to_play, ClientClipStore, ConfirmedClips, PlayableClip};
use crate::error::Result;
use crate::looping::Cab;
use crate::playback::PlaybackState;
use crate::timing::{Time, Timestamp};

/// Identity of the current user and vamp.
///
/// Supplied from outside; the core reads it but never changes it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionIdentity {
    pub user_id: String,
    pub vamp_id: String,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>, vamp_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            vamp_id: vamp_id.into(),
        }
    }
}

/// The take currently being recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTake {
    /// Key of the matching client clip.
    pub audio_store_key: String,
    /// Wall-clock instant recording began.
    pub started_at: Timestamp,
}

/// Central state of one loaded vamp.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Monotonically increasing version for change detection.
    pub version: u64,
    /// Identity this session belongs to.
    pub identity: SessionIdentity,
    /// Transport state.
    pub playback: PlaybackState,
    /// Loop region.
    pub cab: Cab,
    /// Server-confirmed clips.
    pub clips: ConfirmedClips,
    /// Local takes awaiting confirmation.
    pub client_clips: ClientClipStore,
    /// The take being recorded, if any.
    pub active_take: Option<ActiveTake>,
    /// Key of the most recently started take, kept after it ends.
    pub last_take: Option<String>,
    /// True time as of the last display tick.
    pub display_time: Time,
    /// Timestamp of the last playback tick.
    pub last_tick: Option<Timestamp>,
}

impl SessionState {
    /// Create an empty, stopped session.
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    /// Increment the version counter.
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// True time at `now`.
    pub fn true_time(&self, now: Timestamp) -> Time {
        self.playback.true_time(now)
    }

    /// Whether the workspace holds no clips at all, confirmed or local.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty() && self.client_clips.is_empty()
    }

    /// Enable or disable looping.
    ///
    /// Turning looping on is rejected if the current bounds are invalid for
    /// a looping cab.
    pub fn set_loop(&mut self, loops: bool) -> Result<()> {
        let cab = Cab { loops, ..self.cab };
        cab.validate()?;
        self.cab = cab;
        self.bump_version();
        Ok(())
    }

    /// Replace the cab bounds, keeping the loop flag.
    pub fn set_cab_bounds(&mut self, start: Time, end: Option<Time>) -> Result<()> {
        let cab = Cab::new(start, end, self.cab.loops)?;
        self.cab = cab;
        self.bump_version();
        Ok(())
    }

    /// Confirmed clips plus unconfirmed takes.
    pub fn clips_to_play(&self) -> Vec<PlayableClip> {
        clips_to_play(&self.clips, &self.client_clips)
    }
}
