//! Conversation session management
//!
//! `ConversationSession` sequences one practice conversation:
//! - Turn taking over a single transition function (`state`)
//! - Microphone capture, recording and level metering
//! - Transcription, replies and speech through the `SpeechService`
//! - Feedback, progress and persistence when the session ends

mod config;
mod context;
mod session;
mod state;
mod stats;
mod turn;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use session::{ConversationSession, SessionServices};
pub use state::{transition, TurnEvent, TurnState};
pub use stats::{SessionStatus, SessionSummary, TurnOutcome};
pub use turn::{SessionMode, SpeakerKind, Turn};
