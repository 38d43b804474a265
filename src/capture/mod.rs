//! Speech capture
//!
//! The [`CaptureAdapter`] trait is the contract the session controller
//! drives. [`NatsCapture`] binds it to the loqa STT bus.

mod adapter;
mod nats;

pub use adapter::{CaptureAdapter, CaptureEvent};
pub use nats::NatsCapture;
