use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SpeakerKind;

/// Lifecycle of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    InProgress,
    Completed,
}

/// Two participants (or one plus the AI agent) and their topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub user1_id: Uuid,
    /// `None` when practising with the AI agent
    pub user2_id: Option<Uuid>,
    pub conversation_topic: String,
    pub suggested_keywords: Vec<String>,
    pub status: MatchStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(user1_id: Uuid, user2_id: Option<Uuid>, topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user1_id,
            user2_id,
            conversation_topic: topic.into(),
            suggested_keywords: Vec::new(),
            status: MatchStatus::Matched,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// The other participant from `user_id`'s point of view
    ///
    /// `None` for AI matches and for users outside the match.
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            self.user2_id
        } else if self.user2_id == Some(user_id) {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// Learner profile with aggregate progress counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub target_language: String,
    pub native_language: String,
    pub elo_rating: i32,
    pub total_conversations: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_conversation_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub const STARTING_ELO: i32 = 1000;

    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            target_language: "English".to_string(),
            native_language: String::new(),
            elo_rating: Self::STARTING_ELO,
            total_conversations: 0,
            current_streak: 0,
            longest_streak: 0,
            last_conversation_date: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub match_id: Uuid,
    /// `Speaker: text` lines
    pub transcript: String,
    pub duration_minutes: u32,
    pub accuracy_percentage: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurnRecord {
    pub conversation_id: Uuid,
    pub speaker_name: String,
    pub speaker_type: SpeakerKind,
    pub message_text: String,
    /// 1-based position in the conversation
    pub turn_number: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub vocabulary_mastery: u8,
    pub pronunciation_score: u8,
    pub fluency_score: u8,
    pub tone_score: u8,
    pub fluency_comment: String,
    pub vocabulary_comment: String,
    pub tone_comment: String,
    pub improvement_notes: String,
    pub improvement_score: i32,
    pub overall_rating: f32,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Mean of the four scores
    pub fn average_score(&self) -> f32 {
        (self.vocabulary_mastery as f32
            + self.pronunciation_score as f32
            + self.fluency_score as f32
            + self.tone_score as f32)
            / 4.0
    }
}
