//! Persistence seam
//!
//! The hosted relational store (profiles, matches, conversations,
//! conversation_turns, feedback) sits behind the `Store` trait. `MemoryStore`
//! backs the HTTP API and tests.

mod memory;
mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::VoiceResult;

pub use memory::MemoryStore;
pub use records::{
    ConversationRecord, ConversationTurnRecord, FeedbackRecord, MatchRecord, MatchStatus, Profile,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_match(&self, record: MatchRecord) -> VoiceResult<MatchRecord>;

    async fn get_match(&self, id: Uuid) -> VoiceResult<Option<MatchRecord>>;

    /// Set the status; `InProgress` stamps `started_at`, `Completed` stamps `completed_at`
    async fn update_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        at: DateTime<Utc>,
    ) -> VoiceResult<()>;

    async fn update_match_topic(
        &self,
        id: Uuid,
        topic: &str,
        keywords: &[String],
    ) -> VoiceResult<()>;

    async fn insert_conversation(&self, record: ConversationRecord)
        -> VoiceResult<ConversationRecord>;

    async fn insert_turns(&self, turns: Vec<ConversationTurnRecord>) -> VoiceResult<()>;

    async fn conversation_turns(
        &self,
        conversation_id: Uuid,
    ) -> VoiceResult<Vec<ConversationTurnRecord>>;

    /// One record per (conversation, user)
    async fn insert_feedback(&self, record: FeedbackRecord) -> VoiceResult<FeedbackRecord>;

    /// Most recent first
    async fn recent_feedback(&self, user_id: Uuid, limit: usize)
        -> VoiceResult<Vec<FeedbackRecord>>;

    async fn get_profile(&self, id: Uuid) -> VoiceResult<Option<Profile>>;

    async fn upsert_profile(&self, profile: Profile) -> VoiceResult<()>;
}
