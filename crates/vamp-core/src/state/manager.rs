//! State manager for shared read access.
//!
//! The [`StateManager`] wraps a [`SessionState`] so the runtime thread can
//! write while UI-side readers take snapshots. Only the runtime thread
//! mutates through it.

use std::sync::{Arc, PoisonError, RwLock};

use super::model::{SessionIdentity, SessionState};
use crate::clips::PlayableClip;
use crate::playback::PlaybackState;
use crate::timing::Time;

/// Thread-safe handle to a session state.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<SessionState>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(SessionIdentity::default())
    }
}

impl StateManager {
    /// Create a state manager with an empty session.
    pub fn new(identity: SessionIdentity) -> Self {
        Self::with_state(SessionState::new(identity))
    }

    /// Create a state manager with a specific initial state.
    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Read the state with a closure.
    ///
    /// A poisoned lock is recovered; every command leaves the state valid.
    pub fn with_state_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Write to the state with a closure.
    ///
    /// Crate-private: outside callers change state by sending commands.
    pub(crate) fn with_state_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Get a clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.with_state_read(|s| s.clone())
    }

    /// Get a copy of the transport state.
    pub fn playback(&self) -> PlaybackState {
        self.with_state_read(|s| s.playback.clone())
    }

    /// True time as of the last display tick.
    pub fn display_time(&self) -> Time {
        self.with_state_read(|s| s.display_time)
    }

    /// Confirmed clips plus unconfirmed takes.
    pub fn clips_to_play(&self) -> Vec<PlayableClip> {
        self.with_state_read(|s| s.clips_to_play())
    }

    /// Get the state version.
    pub fn version(&self) -> u64 {
        self.with_state_read(|s| s.version)
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
