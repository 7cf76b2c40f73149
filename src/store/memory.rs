use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::records::{
    ConversationRecord, ConversationTurnRecord, FeedbackRecord, MatchRecord, MatchStatus, Profile,
};
use super::Store;
use crate::error::{VoiceError, VoiceResult};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    matches: HashMap<Uuid, MatchRecord>,
    conversations: HashMap<Uuid, ConversationRecord>,
    turns: Vec<ConversationTurnRecord>,
    feedback: Vec<FeedbackRecord>,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversations_for_match(&self, match_id: Uuid) -> Vec<ConversationRecord> {
        let tables = self.tables.read().await;
        tables
            .conversations
            .values()
            .filter(|c| c.match_id == match_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_match(&self, record: MatchRecord) -> VoiceResult<MatchRecord> {
        let mut tables = self.tables.write().await;
        tables.matches.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_match(&self, id: Uuid) -> VoiceResult<Option<MatchRecord>> {
        Ok(self.tables.read().await.matches.get(&id).cloned())
    }

    async fn update_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        at: DateTime<Utc>,
    ) -> VoiceResult<()> {
        let mut tables = self.tables.write().await;
        let record = tables
            .matches
            .get_mut(&id)
            .ok_or_else(|| VoiceError::Store(format!("match {id} not found")))?;

        record.status = status;
        match status {
            MatchStatus::InProgress => record.started_at = Some(at),
            MatchStatus::Completed => record.completed_at = Some(at),
            MatchStatus::Matched => {}
        }
        Ok(())
    }

    async fn update_match_topic(
        &self,
        id: Uuid,
        topic: &str,
        keywords: &[String],
    ) -> VoiceResult<()> {
        let mut tables = self.tables.write().await;
        let record = tables
            .matches
            .get_mut(&id)
            .ok_or_else(|| VoiceError::Store(format!("match {id} not found")))?;

        record.conversation_topic = topic.to_string();
        record.suggested_keywords = keywords.to_vec();
        Ok(())
    }

    async fn insert_conversation(
        &self,
        record: ConversationRecord,
    ) -> VoiceResult<ConversationRecord> {
        let mut tables = self.tables.write().await;
        if !tables.matches.contains_key(&record.match_id) {
            return Err(VoiceError::Store(format!(
                "match {} not found",
                record.match_id
            )));
        }
        tables.conversations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_turns(&self, turns: Vec<ConversationTurnRecord>) -> VoiceResult<()> {
        let mut tables = self.tables.write().await;
        tables.turns.extend(turns);
        Ok(())
    }

    async fn conversation_turns(
        &self,
        conversation_id: Uuid,
    ) -> VoiceResult<Vec<ConversationTurnRecord>> {
        let tables = self.tables.read().await;
        let mut turns: Vec<_> = tables
            .turns
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect();
        turns.sort_by_key(|t| t.turn_number);
        Ok(turns)
    }

    async fn insert_feedback(&self, record: FeedbackRecord) -> VoiceResult<FeedbackRecord> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .feedback
            .iter()
            .any(|f| f.conversation_id == record.conversation_id && f.user_id == record.user_id);
        if duplicate {
            return Err(VoiceError::Store(format!(
                "feedback for conversation {} and user {} already exists",
                record.conversation_id, record.user_id
            )));
        }
        tables.feedback.push(record.clone());
        Ok(record)
    }

    async fn recent_feedback(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> VoiceResult<Vec<FeedbackRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .feedback
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_profile(&self, id: Uuid) -> VoiceResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn upsert_profile(&self, profile: Profile) -> VoiceResult<()> {
        let mut tables = self.tables.write().await;
        tables.profiles.insert(profile.id, profile);
        Ok(())
    }
}
