//! Session scripts for `vamp replay`.
//!
//! A script is a TOML file with an optional starting cab and a list of
//! timed steps. Each step carries either a playback command or a clip event
//! as it would arrive from the subscription stream:
//!
//! ```toml
//! end_ms = 6000
//!
//! [cab]
//! start = 0.0
//! end = 4.0
//! loops = true
//!
//! [[step]]
//! at_ms = 0
//! command = { type = "record" }
//!
//! [[step]]
//! at_ms = 2500
//! event = { mutation = "ADDED", referenceId = "@last-take", updatedClip = { id = "c1", start = 0.0, audio = { id = "a1" } } }
//! ```
//!
//! Take keys are generated at record time, so a script refers to the most
//! recent take as [`LAST_TAKE`] wherever a key or reference id is expected.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use vamp_core::{Cab, ClipEvent, PlaybackCommand, SessionIdentity};

/// Placeholder for the key of the most recently started take.
pub const LAST_TAKE: &str = "@last-take";

/// A parsed session script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Identity to replay as; falls back to the config file.
    #[serde(default)]
    pub session: Option<SessionIdentity>,
    /// Cab in place before the first step.
    #[serde(default)]
    pub cab: Option<Cab>,
    /// Keep ticking until this offset. Defaults to the last step.
    #[serde(default)]
    pub end_ms: Option<u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One timed input.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Offset from the start of the replay, in milliseconds.
    pub at_ms: u64,
    #[serde(default)]
    pub command: Option<PlaybackCommand>,
    #[serde(default)]
    pub event: Option<ClipEvent>,
}

/// What a step delivers.
#[derive(Debug, Clone)]
pub enum StepAction {
    Command(PlaybackCommand),
    Event(ClipEvent),
}

impl Step {
    /// The step's payload. Exactly one of `command` and `event` is set
    /// once the script has been validated.
    pub fn action(&self) -> Option<StepAction> {
        match (&self.command, &self.event) {
            (Some(cmd), None) => Some(StepAction::Command(cmd.clone())),
            (None, Some(event)) => Some(StepAction::Event(event.clone())),
            _ => None,
        }
    }
}

impl Script {
    /// Read and validate a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid script: {}", path.display()))
    }

    /// Parse and validate script text. Steps are ordered by `at_ms`, keeping
    /// file order for equal offsets.
    pub fn parse(content: &str) -> Result<Self> {
        let mut script: Script = toml::from_str(content)?;
        for (i, step) in script.steps.iter().enumerate() {
            if step.action().is_none() {
                bail!(
                    "step {} (at_ms = {}) needs exactly one of `command` or `event`",
                    i + 1,
                    step.at_ms
                );
            }
        }
        if let Some(cab) = &script.cab {
            cab.validate()?;
        }
        script.steps.sort_by_key(|step| step.at_ms);
        Ok(script)
    }

    /// Offset at which the replay stops.
    pub fn end_ms(&self) -> u64 {
        let last = self.steps.last().map_or(0, |step| step.at_ms);
        self.end_ms.unwrap_or(last).max(last)
    }
}
