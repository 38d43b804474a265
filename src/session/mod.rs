//! Tutoring session management
//!
//! This module provides the `SessionController` that runs the voice
//! conversation loop:
//! - Speech capture and utterance finalization
//! - Tutor exchange with bounded history
//! - Reply playback and the settle delay before listening again
//! - Cancellation, stale-event filtering and wake lock handling

mod config;
mod controller;
mod state;
mod stats;

pub use config::{EndpointPolicy, SessionConfig};
pub use controller::{Collaborators, SessionController};
pub use state::{PendingUtterance, SessionNotice, SessionSnapshot, SessionState};
pub use stats::SessionStats;
