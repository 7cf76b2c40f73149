pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod feedback;
pub mod http;
pub mod session;
pub mod store;

pub use audio::{
    AudioBlob, AudioChunk, AudioFile, AudioFrame, AudioLevelMeter, AudioSink, CaptureConstraints,
    CaptureDevice, CaptureSource, ChunkMetadata, MediaCapture, Recorder,
};
pub use bridge::{AbortHandle, BridgeConfig, SpeechBridge, SpeechService, Voice};
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use feedback::{FeedbackReport, ProgressUpdate};
pub use http::{create_router, AppState};
pub use session::{
    ConversationSession, SessionConfig, SessionMode, SessionServices, SessionStatus,
    SessionSummary, Turn, TurnOutcome, TurnState,
};
pub use store::{MemoryStore, Store};
