//! Conversation transcript
//!
//! An ordered, append-only log of committed turns. Only the session
//! controller writes to it; everyone else reads snapshots.

mod store;
mod turn;

pub use store::TranscriptStore;
pub use turn::{Correction, Speaker, Turn};
