//! Runtime configuration.
//!
//! Tick intervals for the runtime thread. Deserializes from the `[runtime]`
//! table of a TOML config file; missing keys take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::timing::{DISPLAY_TICK_MS, PLAYBACK_TICK_MS};

/// Runtime thread settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval between loop-detection ticks, in milliseconds.
    pub playback_tick_ms: u64,
    /// Interval between display ticks, in milliseconds.
    pub display_tick_ms: u64,
    /// Sleep between runtime loop iterations, in milliseconds.
    pub idle_sleep_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            playback_tick_ms: PLAYBACK_TICK_MS,
            display_tick_ms: DISPLAY_TICK_MS,
            idle_sleep_ms: 1,
        }
    }
}

impl RuntimeConfig {
    /// Reject zero tick intervals.
    pub fn validate(&self) -> Result<()> {
        if self.playback_tick_ms == 0 {
            return Err(Error::Config("playback_tick_ms must be at least 1".to_string()));
        }
        if self.display_tick_ms == 0 {
            return Err(Error::Config("display_tick_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn playback_tick(&self) -> Duration {
        Duration::from_millis(self.playback_tick_ms)
    }

    pub fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}
