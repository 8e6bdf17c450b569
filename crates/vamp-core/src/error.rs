//! Error types for the Vamp core.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Vamp core.
///
/// None of these are fatal to the engine: callers log them and keep playing.
#[derive(Debug, Error)]
pub enum Error {
    /// A command no longer applies to the current state.
    #[error("Stale command: {0}")]
    StaleCommand(String),

    /// A recording began with an audio store key that is already in use.
    #[error("Duplicate audio store key: {0}")]
    DuplicateKey(String),

    /// A subscription reference matched no live client clip.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// A cab update would break the cab invariants.
    #[error("Invalid cab: start={start}, end={end:?}")]
    InvalidCab { start: f64, end: Option<f64> },

    /// An outbound transport call failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The runtime thread is no longer receiving.
    #[error("Runtime channel closed")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
