//! HTTP API server for external control (web or desktop front end)
//!
//! This module provides a REST API over the session controller:
//! - POST /session/start - Start a tutoring session
//! - POST /session/stop - Stop the session
//! - POST /session/text - Submit a typed utterance
//! - POST /session/listen - Start capture, interrupting playback
//! - POST /session/finish - Finish the current utterance
//! - POST /session/retry - Retry a failed tutor exchange
//! - GET /session/status - Query session status
//! - GET /session/transcript - Get the conversation so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
