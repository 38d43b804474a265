pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod session;
pub mod synthesis;
pub mod transcript;
pub mod tutor;
pub mod wakelock;

pub use audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource};
pub use capture::{CaptureAdapter, CaptureEvent, NatsCapture};
pub use config::Config;
pub use error::{CaptureError, ErrorKind, ExchangeError, SessionError, SynthesisError};
pub use http::{create_router, AppState};
pub use nats::NatsClient;
pub use session::{Collaborators, SessionConfig, SessionController, SessionSnapshot, SessionState, SessionStats};
pub use synthesis::{NatsSynthesis, SynthesisAdapter};
pub use transcript::{Correction, Speaker, Turn};
pub use tutor::{HttpTutorClient, TutorClient, TutorReply};
pub use wakelock::{KeepAwakeLock, NoopWakeLock, WakeLock};
