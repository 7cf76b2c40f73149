// Integration tests for conversation sessions
//
// These tests drive full turn cycles against synthetic capture and scripted
// speech services, then check feedback, progress and persistence at the end.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingualeap::audio::{
    AudioSink, CaptureConstraints, MediaCapture, NullSink, SyntheticCapture,
};
use lingualeap::bridge::{AbortHandle, BridgeConfig, ChatMessage, FeedbackAnalysis, SpeechBridge, Voice};
use lingualeap::session::{
    ConversationSession, SessionConfig, SessionMode, SessionServices, SpeakerKind, TurnOutcome,
    TurnState,
};
use lingualeap::store::{
    ConversationRecord, ConversationTurnRecord, FeedbackRecord, MatchRecord, MatchStatus,
    MemoryStore, Profile, Store,
};
use lingualeap::{AudioBlob, SpeechService, VoiceError, VoiceResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TURN: Duration = Duration::from_millis(250);

fn offline_speech() -> Arc<dyn SpeechService> {
    Arc::new(SpeechBridge::new(BridgeConfig::default()))
}

fn capture() -> MediaCapture {
    MediaCapture::new(
        Box::new(SyntheticCapture::tone(440.0, 0.5)),
        CaptureConstraints {
            buffer_duration_ms: 50,
            ..Default::default()
        },
    )
}

fn session_config(user_id: Uuid, mode: SessionMode) -> SessionConfig {
    SessionConfig {
        user_id,
        user_name: "Ada".to_string(),
        mode,
        meter_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

/// Store with a learner profile and a fresh match
async fn seeded_store(topic: &str) -> Result<(Arc<MemoryStore>, Uuid, MatchRecord)> {
    let store = Arc::new(MemoryStore::new());
    let profile = Profile::new("Ada");
    let user_id = profile.id;
    store.upsert_profile(profile).await?;
    let record = store
        .create_match(MatchRecord::new(user_id, None, topic))
        .await?;
    Ok((store, user_id, record))
}

fn build_session(
    config: SessionConfig,
    record: MatchRecord,
    speech: Arc<dyn SpeechService>,
    store: Arc<dyn Store>,
    sink: Arc<dyn AudioSink>,
) -> ConversationSession {
    ConversationSession::new(
        config,
        record,
        capture(),
        SessionServices {
            speech,
            store,
            sink,
        },
    )
}

async fn solo_session(topic: &str) -> Result<(ConversationSession, Arc<MemoryStore>, Uuid)> {
    let (store, user_id, record) = seeded_store(topic).await?;
    let session = build_session(
        session_config(user_id, SessionMode::Solo),
        record,
        offline_speech(),
        store.clone(),
        Arc::new(NullSink),
    );
    Ok((session, store, user_id))
}

async fn wait_for_cancel(session_canceller: &lingualeap::session::SessionContext) {
    for _ in 0..400 {
        if session_canceller.cancel() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("nothing ever became cancellable");
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Replies only after cancellation or a long wait on its first call
struct SlowSpeech {
    first_call: AtomicBool,
    voiced: bool,
}

impl SlowSpeech {
    fn new(voiced: bool) -> Self {
        Self {
            first_call: AtomicBool::new(true),
            voiced,
        }
    }
}

#[async_trait]
impl SpeechService for SlowSpeech {
    async fn transcribe(&self, _audio: &AudioBlob) -> String {
        "I would like to order a coffee".to_string()
    }

    async fn respond(
        &self,
        _history: &[ChatMessage],
        _topic: &str,
        abort: &AbortHandle,
    ) -> VoiceResult<String> {
        let guard = abort.begin();
        if self.voiced || !self.first_call.swap(false, Ordering::SeqCst) {
            return Ok("Sure, anything else?".to_string());
        }
        tokio::select! {
            _ = guard.token().cancelled() => Err(VoiceError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok("Too late".to_string()),
        }
    }

    async fn synthesize(
        &self,
        _text: &str,
        _voice: Voice,
        _abort: &AbortHandle,
    ) -> VoiceResult<Option<AudioBlob>> {
        Ok(self
            .voiced
            .then(|| AudioBlob::new("audio/mpeg", vec![1, 2, 3])))
    }

    async fn analyze_feedback(
        &self,
        _transcript: &str,
        _duration_minutes: u32,
        _topic: &str,
    ) -> FeedbackAnalysis {
        FeedbackAnalysis {
            fluency: 90.0,
            vocabulary: 80.0,
            tone: 85.0,
            fluency_comment: String::new(),
            vocabulary_comment: String::new(),
            tone_comment: String::new(),
            overall_notes: String::new(),
        }
    }

    fn is_online(&self) -> bool {
        true
    }
}

/// Holds playback open until stopped
struct BlockingSink;

#[async_trait]
impl AudioSink for BlockingSink {
    async fn play(&self, _audio: &AudioBlob, stop: CancellationToken) -> VoiceResult<()> {
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "blocking"
    }
}

/// Every write fails
struct FailingStore;

fn unavailable<T>() -> VoiceResult<T> {
    Err(VoiceError::Store("database unavailable".to_string()))
}

#[async_trait]
impl Store for FailingStore {
    async fn create_match(&self, _record: MatchRecord) -> VoiceResult<MatchRecord> {
        unavailable()
    }

    async fn get_match(&self, _id: Uuid) -> VoiceResult<Option<MatchRecord>> {
        unavailable()
    }

    async fn update_match_status(
        &self,
        _id: Uuid,
        _status: MatchStatus,
        _at: DateTime<Utc>,
    ) -> VoiceResult<()> {
        unavailable()
    }

    async fn update_match_topic(
        &self,
        _id: Uuid,
        _topic: &str,
        _keywords: &[String],
    ) -> VoiceResult<()> {
        unavailable()
    }

    async fn insert_conversation(
        &self,
        _record: ConversationRecord,
    ) -> VoiceResult<ConversationRecord> {
        unavailable()
    }

    async fn insert_turns(&self, _turns: Vec<ConversationTurnRecord>) -> VoiceResult<()> {
        unavailable()
    }

    async fn conversation_turns(
        &self,
        _conversation_id: Uuid,
    ) -> VoiceResult<Vec<ConversationTurnRecord>> {
        unavailable()
    }

    async fn insert_feedback(&self, _record: FeedbackRecord) -> VoiceResult<FeedbackRecord> {
        unavailable()
    }

    async fn recent_feedback(
        &self,
        _user_id: Uuid,
        _limit: usize,
    ) -> VoiceResult<Vec<FeedbackRecord>> {
        unavailable()
    }

    async fn get_profile(&self, _id: Uuid) -> VoiceResult<Option<Profile>> {
        unavailable()
    }

    async fn upsert_profile(&self, _profile: Profile) -> VoiceResult<()> {
        unavailable()
    }
}

// ============================================================================
// Turn cycles
// ============================================================================

#[tokio::test]
async fn test_solo_cycle_adds_user_then_ai_turn() -> Result<()> {
    let (mut session, store, _) = solo_session("Weekend plans").await?;

    session.begin().await?;
    assert_eq!(session.transcript().len(), 0);
    assert_eq!(
        store.get_match(session.match_id()).await?.map(|m| m.status),
        Some(MatchStatus::InProgress)
    );

    assert!(session.start_listening().await?);
    assert_eq!(session.state(), TurnState::Listening);
    tokio::time::sleep(TURN).await;

    let outcome = session.stop_listening().await?;
    let TurnOutcome::Exchange { user, reply, spoken } = outcome else {
        panic!("solo turn should produce an exchange, got {:?}", outcome);
    };
    assert!(!spoken, "Offline synthesis skips playback");
    assert_eq!(user.speaker, "Ada");

    let turns = session.transcript();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].kind, SpeakerKind::User);
    assert_eq!(turns[1].kind, SpeakerKind::Ai);
    assert_eq!(turns[1].text, reply.text);
    assert_eq!(session.state(), TurnState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_start_listening_while_busy_is_noop() -> Result<()> {
    let (mut session, _, _) = solo_session("Food").await?;

    assert!(session.start_listening().await?, "Begins implicitly");
    assert!(!session.start_listening().await?);
    assert_eq!(session.state(), TurnState::Listening);
    assert!(session.transcript().is_empty());

    // Stopping twice only runs one pipeline
    session.stop_listening().await?;
    assert!(matches!(session.stop_listening().await?, TurnOutcome::Ignored));
    assert_eq!(session.transcript().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_partner_mode_only_records_learner() -> Result<()> {
    let (store, user_id, _) = seeded_store("Music").await?;
    let record = store
        .create_match(MatchRecord::new(user_id, Some(Uuid::new_v4()), "Music"))
        .await?;
    let mut session = build_session(
        session_config(user_id, SessionMode::Partner),
        record,
        offline_speech(),
        store.clone(),
        Arc::new(NullSink),
    );

    session.begin().await?;
    session.start_listening().await?;
    tokio::time::sleep(TURN).await;

    let outcome = session.stop_listening().await?;
    assert!(matches!(outcome, TurnOutcome::UserTurn { .. }));
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.state(), TurnState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_greeting_opens_solo_session() -> Result<()> {
    let (store, user_id, record) = seeded_store("Travel").await?;
    let config = SessionConfig {
        greeting: Some("Hi! Where did you travel last?".to_string()),
        ..session_config(user_id, SessionMode::Solo)
    };
    let mut session = build_session(config, record, offline_speech(), store, Arc::new(NullSink));

    session.begin().await?;
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].kind, SpeakerKind::Ai);
    assert_eq!(session.state(), TurnState::Idle);

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;
    session.stop_listening().await?;
    assert_eq!(session.transcript().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_level_is_reported_while_listening() -> Result<()> {
    let (mut session, _, _) = solo_session("Sports").await?;

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;
    let level = session.status().audio_level;
    assert!((0.0..=100.0).contains(&level));

    session.stop_listening().await?;
    assert_eq!(session.status().audio_level, 0.0);

    Ok(())
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_while_thinking_returns_to_idle() -> Result<()> {
    let (store, user_id, record) = seeded_store("Cafe").await?;
    let mut session = build_session(
        session_config(user_id, SessionMode::Solo),
        record,
        Arc::new(SlowSpeech::new(false)),
        store,
        Arc::new(NullSink),
    );
    let canceller = session.canceller();

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;

    let (result, _) = tokio::join!(session.stop_listening(), wait_for_cancel(&canceller));
    assert_eq!(result.unwrap_err(), VoiceError::Cancelled);
    assert_eq!(session.state(), TurnState::Idle);
    assert_eq!(session.transcript().len(), 1, "User turn is kept");

    // The next cycle runs normally
    assert!(session.start_listening().await?);
    tokio::time::sleep(TURN).await;
    assert!(matches!(
        session.stop_listening().await?,
        TurnOutcome::Exchange { .. }
    ));
    assert_eq!(session.transcript().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_cancel_while_speaking_stops_playback() -> Result<()> {
    let (store, user_id, record) = seeded_store("Cafe").await?;
    let mut session = build_session(
        session_config(user_id, SessionMode::Solo),
        record,
        Arc::new(SlowSpeech::new(true)),
        store,
        Arc::new(BlockingSink),
    );
    let canceller = session.canceller();

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;

    let (result, _) = tokio::join!(session.stop_listening(), wait_for_cancel(&canceller));
    assert_eq!(result.unwrap_err(), VoiceError::Cancelled);
    assert_eq!(session.state(), TurnState::Idle);
    assert_eq!(session.transcript().len(), 2, "Reply was recorded before playback");
    assert!(!canceller.is_busy());

    Ok(())
}

// ============================================================================
// Ending
// ============================================================================

#[tokio::test]
async fn test_end_at_zero_duration_has_finite_scores() -> Result<()> {
    let (mut session, store, user_id) = solo_session("Books").await?;

    let summary = session.end().await;
    let feedback = &summary.feedback;

    assert_eq!(summary.duration_secs, 0);
    assert_eq!(feedback.duration_minutes, 1);
    assert_eq!(feedback.words_spoken, 0);
    assert!(feedback.overall_rating.is_finite());
    assert!((0.0..=10.0).contains(&feedback.overall_rating));
    for score in [feedback.fluency, feedback.vocabulary, feedback.tone, feedback.pronunciation] {
        assert!(score <= 100);
    }
    assert_eq!(feedback.improvement_score, 0, "No previous sessions");
    assert_eq!(session.state(), TurnState::Ended);

    assert!(summary.persisted());
    assert_eq!(store.conversations_for_match(session.match_id()).await.len(), 1);
    assert_eq!(
        store.get_match(session.match_id()).await?.map(|m| m.status),
        Some(MatchStatus::Completed)
    );

    let progress = summary.progress.clone().expect("profile was updated");
    assert!(progress.elo_after - progress.elo_before >= 5);
    assert_eq!(progress.total_conversations, 1);
    assert_eq!(store.recent_feedback(user_id, 3).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_second_end_returns_same_summary() -> Result<()> {
    let (mut session, store, _) = solo_session("Books").await?;

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;
    session.stop_listening().await?;

    assert!(session.summary().is_none());
    let first = session.end().await;
    let second = session.end().await;
    assert_eq!(
        session.summary().map(|s| s.conversation_id),
        Some(first.conversation_id)
    );

    assert_eq!(first.conversation_id, second.conversation_id);
    assert_eq!(first.feedback, second.feedback);
    assert_eq!(store.conversations_for_match(session.match_id()).await.len(), 1);

    let conversation_id = first.conversation_id.expect("persisted");
    let stored = store.conversation_turns(conversation_id).await?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].turn_number, 1);
    assert_eq!(stored[1].speaker_type, SpeakerKind::Ai);

    // Nothing runs after the end
    assert!(!session.start_listening().await?);

    Ok(())
}

#[tokio::test]
async fn test_end_while_listening_releases_capture() -> Result<()> {
    let (mut session, _, _) = solo_session("Movies").await?;

    session.start_listening().await?;
    tokio::time::sleep(TURN).await;

    let summary = session.end().await;
    assert_eq!(session.state(), TurnState::Ended);
    assert!(summary.turns.is_empty(), "Unfinished capture is discarded");

    Ok(())
}

#[tokio::test]
async fn test_failing_store_still_returns_feedback() -> Result<()> {
    let record = MatchRecord::new(Uuid::new_v4(), None, "Weather");
    let mut session = build_session(
        session_config(record.user1_id, SessionMode::Solo),
        record,
        Arc::new(SlowSpeech::new(false)),
        Arc::new(FailingStore),
        Arc::new(NullSink),
    );

    session.begin().await?;
    let summary = session.end().await;

    assert!(!summary.persisted());
    assert!(summary.progress.is_none());
    assert_eq!(summary.feedback.fluency, 90);
    assert_eq!(summary.feedback.pronunciation, 88); // mean of fluency and tone, rounded
    assert!(summary.feedback.overall_rating.is_finite());

    Ok(())
}

#[tokio::test]
async fn test_progress_accumulates_across_sessions() -> Result<()> {
    let (store, user_id, first_match) = seeded_store("Hobbies").await?;

    let mut first = build_session(
        session_config(user_id, SessionMode::Solo),
        first_match,
        offline_speech(),
        store.clone(),
        Arc::new(NullSink),
    );
    first.begin().await?;
    first.end().await;

    let second_match = store
        .create_match(MatchRecord::new(user_id, None, "Hobbies"))
        .await?;
    let mut second = build_session(
        session_config(user_id, SessionMode::Solo),
        second_match,
        offline_speech(),
        store.clone(),
        Arc::new(NullSink),
    );
    second.begin().await?;
    let summary = second.end().await;

    let progress = summary.progress.expect("profile was updated");
    assert_eq!(progress.total_conversations, 2);
    assert_eq!(progress.current_streak, 1, "Same day keeps the streak");
    assert!((-100..=100).contains(&summary.feedback.improvement_score));
    assert_eq!(store.recent_feedback(user_id, 10).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_topic_change_and_time_limit() -> Result<()> {
    let (store, user_id, record) = seeded_store("Pets").await?;
    let config = SessionConfig {
        time_limit: Some(Duration::from_millis(200)),
        ..session_config(user_id, SessionMode::Solo)
    };
    let mut session = build_session(config, record, offline_speech(), store.clone(), Arc::new(NullSink));

    assert!(!session.is_expired(), "Clock starts at begin");
    session.begin().await?;

    session
        .change_topic("Cooking", vec!["recipe".to_string(), "oven".to_string()])
        .await;
    assert_eq!(session.topic(), "Cooking");
    let stored = store.get_match(session.match_id()).await?.expect("match");
    assert_eq!(stored.conversation_topic, "Cooking");
    assert_eq!(stored.suggested_keywords.len(), 2);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.is_expired());
    assert!(session.status().expired);

    let summary = session.end().await;
    assert_eq!(summary.topic, "Cooking");
    assert!(!session.is_expired());
    assert_eq!(session.status().state, TurnState::Ended);

    Ok(())
}
