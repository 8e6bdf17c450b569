//! Outbound transport interface.
//!
//! Playback commands are mirrored to the backend as named operations. The
//! core only looks at success or failure; a failed call is logged and the
//! optimistic local state is kept.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::timing::Time;

/// Named backend operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransportOp {
    Seek { time: Time },
    Play,
    Pause,
    Stop,
    Record,
    SetLoop { loops: bool },
}

impl TransportOp {
    /// Operation name as the backend knows it.
    pub fn name(&self) -> &'static str {
        match self {
            TransportOp::Seek { .. } => "seek",
            TransportOp::Play => "play",
            TransportOp::Pause => "pause",
            TransportOp::Stop => "stop",
            TransportOp::Record => "record",
            TransportOp::SetLoop { .. } => "setLoop",
        }
    }
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportOp::Seek { time } => write!(f, "seek({time:.3})"),
            TransportOp::SetLoop { loops } => write!(f, "setLoop({loops})"),
            other => write!(f, "{}()", other.name()),
        }
    }
}

/// Failure reported by a transport implementation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed: {reason}")]
pub struct TransportError {
    pub op: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(op: &TransportOp, reason: impl Into<String>) -> Self {
        Self {
            op: op.name().to_string(),
            reason: reason.into(),
        }
    }
}

/// Request/response channel to the backend.
pub trait TransportClient: Send {
    /// Issue one operation.
    fn call(&mut self, op: TransportOp) -> Result<(), TransportError>;
}

/// Transport that accepts every call and does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl TransportClient for NullTransport {
    fn call(&mut self, _op: TransportOp) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Transport that records every call, optionally failing them.
///
/// Clones share the same log, so one copy can be handed to the engine while
/// another is inspected.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    calls: Arc<Mutex<Vec<TransportOp>>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose calls are recorded and then rejected.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Calls seen so far.
    pub fn calls(&self) -> Vec<TransportOp> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TransportClient for RecordingTransport {
    fn call(&mut self, op: TransportOp) -> Result<(), TransportError> {
        log::info!("[TRANSPORT] {}", op);
        let result = if self.fail {
            Err(TransportError::new(&op, "rejected"))
        } else {
            Ok(())
        };
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
        result
    }
}
