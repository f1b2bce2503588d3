//! Assistant speech output.
//!
//! The platform text-to-speech engine sits behind [`SpeechSynthesizer`];
//! [`SpeakQueue`] serializes every request onto it.

pub mod queue;

pub use queue::SpeakQueue;

use crate::error::Result;
use async_trait::async_trait;

/// One utterance to synthesize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    /// Locale tag, e.g. `es-ES`.
    pub lang: String,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: lang.into(),
        }
    }
}

/// Platform text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether the engine is currently producing speech, from any caller.
    fn is_speaking(&self) -> bool;

    /// Speak one utterance, resolving when it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects or aborts the utterance.
    async fn speak(&self, request: &SpeechRequest) -> Result<()>;
}
