//! Commands accepted by the playback state machine.
//!
//! All user-driven changes to a session are expressed as
//! [`PlaybackCommand`] variants and applied one at a time by the engine.

use serde::{Deserialize, Serialize};

use crate::timing::Time;
use crate::transport::TransportOp;

/// Commands sent to the engine to mutate session state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackCommand {
    // === Transport ===
    /// Start playback from the current position.
    Play,

    /// Freeze playback at the current position.
    Pause,

    /// Stop playback at the current position.
    Stop,

    /// Move the playhead.
    Seek { time: Time },

    /// Start recording a new take (starts playback if stopped).
    Record,

    /// Finish the take being recorded.
    EndRecord,

    // === Cab ===
    /// Toggle looping.
    SetLoop { loops: bool },

    /// Set the cab bounds.
    SetCab {
        start: Time,
        #[serde(default)]
        end: Option<Time>,
    },

    // === Takes ===
    /// Link a take to the clip the server created for it.
    ConfirmTake {
        audio_store_key: String,
        real_clip_id: String,
    },

    /// Drop a take without waiting for the server.
    DiscardTake { audio_store_key: String },
}

impl PlaybackCommand {
    /// Get a short description of this command type.
    pub fn type_name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play => "Play",
            PlaybackCommand::Pause => "Pause",
            PlaybackCommand::Stop => "Stop",
            PlaybackCommand::Seek { .. } => "Seek",
            PlaybackCommand::Record => "Record",
            PlaybackCommand::EndRecord => "EndRecord",
            PlaybackCommand::SetLoop { .. } => "SetLoop",
            PlaybackCommand::SetCab { .. } => "SetCab",
            PlaybackCommand::ConfirmTake { .. } => "ConfirmTake",
            PlaybackCommand::DiscardTake { .. } => "DiscardTake",
        }
    }

    /// The backend operation mirroring this command, if any.
    pub fn transport_op(&self) -> Option<TransportOp> {
        match self {
            PlaybackCommand::Play => Some(TransportOp::Play),
            PlaybackCommand::Pause => Some(TransportOp::Pause),
            PlaybackCommand::Stop => Some(TransportOp::Stop),
            PlaybackCommand::Seek { time } => Some(TransportOp::Seek { time: *time }),
            PlaybackCommand::Record => Some(TransportOp::Record),
            PlaybackCommand::SetLoop { loops } => Some(TransportOp::SetLoop { loops: *loops }),
            PlaybackCommand::EndRecord
            | PlaybackCommand::SetCab { .. }
            | PlaybackCommand::ConfirmTake { .. }
            | PlaybackCommand::DiscardTake { .. } => None,
        }
    }
}
