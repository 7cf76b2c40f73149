use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::turn::SessionMode;
use crate::audio::{DEFAULT_FORMAT_PREFERENCES, DEFAULT_FRAME_INTERVAL};
use crate::bridge::Voice;

/// Configuration for a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Learner the session belongs to
    pub user_id: Uuid,

    /// Speaker label used for the learner's turns
    pub user_name: String,

    /// Speaker label used for AI turns
    pub ai_name: String,

    pub mode: SessionMode,

    /// Voice used for synthesized replies
    pub voice: Voice,

    /// Session ends itself once this much time has passed
    pub time_limit: Option<Duration>,

    /// Opening line spoken by the AI in solo mode (off when `None`)
    pub greeting: Option<String>,

    /// Container preference order for recording
    pub format_preferences: Vec<String>,

    /// Level meter cadence
    pub meter_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            user_name: "You".to_string(),
            ai_name: "AI Assistant".to_string(),
            mode: SessionMode::Solo,
            voice: Voice::default(),
            time_limit: None,
            greeting: None,
            format_preferences: DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            meter_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}
