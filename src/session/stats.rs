use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::TurnState;
use super::turn::{SessionMode, Turn};
use crate::feedback::{FeedbackReport, ProgressUpdate};

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,

    pub match_id: Uuid,

    pub mode: SessionMode,

    #[serde(flatten)]
    pub state: TurnState,

    pub topic: String,

    /// When `begin` was called
    pub started_at: Option<DateTime<Utc>>,

    pub elapsed_secs: u64,

    pub turn_count: usize,

    /// Most recent input level, 0-100
    pub audio_level: f32,

    /// Whether the speech bridge talks to the network
    pub online: bool,

    /// Time limit has passed but `end` has not run yet
    pub expired: bool,
}

/// Result of `end`: the conversation and what was learned from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,

    pub match_id: Uuid,

    pub topic: String,

    pub duration_secs: u64,

    pub turns: Vec<Turn>,

    pub feedback: FeedbackReport,

    /// Profile counters after this session, when the profile could be updated
    pub progress: Option<ProgressUpdate>,

    /// Stored conversation id; `None` when persistence failed
    pub conversation_id: Option<Uuid>,
}

impl SessionSummary {
    pub fn persisted(&self) -> bool {
        self.conversation_id.is_some()
    }
}

/// What a stop-listening call produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Nothing was being captured
    Ignored,
    /// Partner mode: the learner's turn was transcribed
    UserTurn { user: Turn },
    /// Solo mode: learner turn plus the AI reply
    Exchange {
        user: Turn,
        reply: Turn,
        /// Whether the reply was voiced
        spoken: bool,
    },
}
