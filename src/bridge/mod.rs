//! Speech/AI bridge
//!
//! Transcription, chat completion, speech synthesis and post-session
//! feedback analysis against an OpenAI-compatible provider:
//! - `POST {base}/audio/transcriptions` (multipart)
//! - `POST {base}/chat/completions`
//! - `POST {base}/audio/speech`
//!
//! Without a credential every call answers locally from `fallback`.

pub mod cancel;
pub mod client;
pub mod fallback;
pub mod messages;

use async_trait::async_trait;

use crate::audio::AudioBlob;
use crate::error::VoiceResult;

pub use cancel::{AbortHandle, RequestGuard};
pub use client::{BridgeConfig, SpeechBridge};
pub use messages::{ChatMessage, ChatRole, FeedbackAnalysis, Voice};

/// Credential value shipped in sample env files; treated as absent
pub const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

/// Provider seam used by the turn sequencer
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Speech to text. Failures degrade to a placeholder transcript.
    async fn transcribe(&self, audio: &AudioBlob) -> String;

    /// Next partner reply for the conversation so far
    ///
    /// Only `VoiceError::Cancelled` is returned as an error.
    async fn respond(
        &self,
        history: &[ChatMessage],
        topic: &str,
        abort: &AbortHandle,
    ) -> VoiceResult<String>;

    /// Text to speech; `None` means skip playback
    ///
    /// Only `VoiceError::Cancelled` is returned as an error.
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        abort: &AbortHandle,
    ) -> VoiceResult<Option<AudioBlob>>;

    /// Scores and comments for a finished conversation
    async fn analyze_feedback(
        &self,
        transcript: &str,
        duration_minutes: u32,
        topic: &str,
    ) -> FeedbackAnalysis;

    /// Whether calls go to the network
    fn is_online(&self) -> bool;
}
