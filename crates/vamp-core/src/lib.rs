//! Vamp Core - Playback synchronization and looping for collaborative vamps.
//!
//! This crate provides the engine behind a Vamp workspace:
//!
//! - **Timing** - True time derived from an anchor position and a wall clock
//! - **Looping** - The cab (loop region) and the loop decision
//! - **Playback** - Stopped / playing / recording transitions
//! - **Clips** - Confirmed clips, speculative client takes, and their union
//! - **Subscription** - Reconciliation of server clip pushes with local takes
//! - **Engine** - Applies commands and ticks to a session state
//! - **Runtime** - Runs the engine and its ticks on a dedicated thread
//!
//! # Architecture
//!
//! All user-driven mutations flow through the [`PlaybackCommand`] enum and
//! all server pushes through [`ClipEvent`]. A single owner applies both to a
//! [`SessionState`], forwarding transport operations to a
//! [`TransportClient`]. The [`Runtime`] is one such owner; tests and the
//! replay driver own an [`Engine`] directly.

pub mod clips;
pub mod config;
pub mod engine;
pub mod error;
pub mod looping;
pub mod playback;
pub mod runtime;
pub mod state;
pub mod subscription;
pub mod timing;
pub mod transport;

pub use clips::{
    clips_to_play, generate_audio_store_key, AudioRef, ClientClip, ClientClipStore, Clip, ClipId,
    ConfirmedClips, PlayableClip, Upsert, UNKNOWN_DURATION,
};
pub use config::RuntimeConfig;
pub use engine::{Engine, TickOutcome};
pub use error::{Error, Result};
pub use looping::{should_loop, Cab};
pub use playback::{PlaybackMode, PlaybackState};
pub use runtime::{Runtime, RuntimeHandle};
pub use state::{ActiveTake, PlaybackCommand, SessionIdentity, SessionState, StateManager};
pub use subscription::{ClipEvent, ClipMutation, MergeEffect, MergeOutcome, SubscriptionMerger};
pub use timing::{
    true_time, ClockSource, ManualClock, SystemClock, Time, Timestamp, DISPLAY_TICK_MS,
    PLAYBACK_TICK_MS,
};
pub use transport::{NullTransport, RecordingTransport, TransportClient, TransportError, TransportOp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_compose() {
        let mut state = SessionState::new(SessionIdentity::new("u1", "v1"));
        let mut engine = Engine::default();
        engine
            .handle_command(&mut state, PlaybackCommand::Play, 0.0)
            .unwrap();
        assert_eq!(state.playback.mode(), PlaybackMode::Playing);
        assert!(state.clips_to_play().is_empty());
    }
}
