//! Speech synthesis
//!
//! The [`SynthesisAdapter`] trait is the playback contract the session
//! controller drives. [`NatsSynthesis`] binds it to the loqa TTS service.

mod adapter;
mod nats;

pub use adapter::SynthesisAdapter;
pub use nats::{NatsSynthesis, VoiceSettings};
