use crate::error::SynthesisError;

/// Text-to-speech engine wrapper
#[async_trait::async_trait]
pub trait SynthesisAdapter: Send + Sync {
    /// Speak `text`, resolving once playback completes or fails
    async fn speak(&self, text: &str) -> Result<(), SynthesisError>;

    /// Stop any in-progress utterance immediately
    async fn cancel(&self);

    /// Prime audio output before the first real utterance
    ///
    /// Some platforms only allow audible output after a silent utterance
    /// issued during a user gesture. Called once, on the first session start.
    async fn unlock(&self) -> Result<(), SynthesisError> {
        Ok(())
    }

    /// Adapter name for logging
    fn name(&self) -> &str;
}
