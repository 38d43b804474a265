//! Tutor exchange
//!
//! [`TutorClient`] is the contract the controller uses to get a reply for a
//! user utterance. [`HttpTutorClient`] talks to any OpenAI-compatible chat
//! completions endpoint.

mod client;
mod http;

pub use client::{TutorClient, TutorReply};
pub use http::{HttpTutorClient, TutorSettings, DEFAULT_SYSTEM_PROMPT};
