//! State management for a Vamp session.
//!
//! All user-driven mutations are expressed as [`PlaybackCommand`] values and
//! applied by a single owner, so ordering is explicit and testable.
//!
//! # Architecture
//!
//! - [`SessionState`] - The complete session state
//! - [`PlaybackCommand`] - All possible user-driven mutations
//! - [`StateManager`] - Thread-safe shared access for readers

mod manager;
mod messages;
mod model;

pub use manager::StateManager;
pub use messages::PlaybackCommand;
pub use model::{ActiveTake, SessionIdentity, SessionState};
