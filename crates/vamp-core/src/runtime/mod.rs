//! Vamp runtime - drives the engine on a dedicated thread.
//!
//! The runtime manages:
//! - The playback tick that detects loop crossings
//! - The display tick that refreshes the shown position
//! - Message passing between callers and the engine

pub mod thread;

pub use thread::{Runtime, RuntimeHandle};
