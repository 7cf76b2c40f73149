use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::context::SessionContext;
use super::state::{transition, TurnEvent, TurnState};
use super::stats::{SessionStatus, SessionSummary, TurnOutcome};
use super::turn::{SessionMode, Turn};
use crate::audio::{AudioLevelMeter, AudioSink, MediaCapture, Recorder};
use crate::bridge::{fallback, ChatMessage, SpeechService};
use crate::error::{VoiceError, VoiceResult};
use crate::feedback::progress::BASELINE_WINDOW;
use crate::feedback::{
    apply_session, baseline_average, duration_minutes, improvement_score, transcript_text,
    FeedbackReport, ProgressUpdate,
};
use crate::store::{
    ConversationRecord, ConversationTurnRecord, FeedbackRecord, MatchRecord, MatchStatus, Store,
};

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionServices {
    pub speech: Arc<dyn SpeechService>,
    pub store: Arc<dyn Store>,
    pub sink: Arc<dyn AudioSink>,
}

/// A practice conversation: turn sequencing, transcript and end-of-session feedback
pub struct ConversationSession {
    id: Uuid,

    config: SessionConfig,

    /// Match this session plays out; topic changes are mirrored here
    match_record: MatchRecord,

    services: SessionServices,

    capture: MediaCapture,

    recorder: Recorder,

    meter: AudioLevelMeter,

    context: SessionContext,

    state: TurnState,

    /// Ordered transcript; only ever appended to
    turns: Vec<Turn>,

    /// Monotonic clock started by `begin`
    clock: Option<Instant>,

    started_at: Option<DateTime<Utc>>,

    /// Duration frozen at `end`
    final_elapsed: Option<u64>,

    summary: Option<SessionSummary>,
}

impl ConversationSession {
    pub fn new(
        config: SessionConfig,
        match_record: MatchRecord,
        capture: MediaCapture,
        services: SessionServices,
    ) -> Self {
        let recorder = Recorder::new(config.format_preferences.clone());
        let meter = AudioLevelMeter::new(config.meter_interval);

        Self {
            id: Uuid::new_v4(),
            config,
            match_record,
            services,
            capture,
            recorder,
            meter,
            context: SessionContext::new(),
            state: TurnState::Idle,
            turns: Vec::new(),
            clock: None,
            started_at: None,
            final_elapsed: None,
            summary: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn match_id(&self) -> Uuid {
        self.match_record.id
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn topic(&self) -> &str {
        &self.match_record.conversation_topic
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for cancelling the in-flight turn from another task
    pub fn canceller(&self) -> SessionContext {
        self.context.clone()
    }

    fn apply(&mut self, event: TurnEvent) -> VoiceResult<TurnState> {
        let next = transition(self.state, event, self.config.mode)?;
        debug!(
            "Session {}: {} --{}--> {}",
            self.id,
            self.state.name(),
            event.name(),
            next.name()
        );
        self.state = next;
        Ok(next)
    }

    fn push_turn(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    /// Start the session clock and mark the match in progress
    ///
    /// In solo mode a configured greeting is spoken before returning.
    /// Calling this again is a no-op.
    pub async fn begin(&mut self) -> VoiceResult<()> {
        if self.clock.is_some() || self.state == TurnState::Ended {
            debug!("Session {} already begun", self.id);
            return Ok(());
        }

        let now = Utc::now();
        self.clock = Some(Instant::now());
        self.started_at = Some(now);

        if let Err(e) = self
            .services
            .store
            .update_match_status(self.match_record.id, MatchStatus::InProgress, now)
            .await
        {
            warn!("Failed to mark match {} in progress: {}", self.match_record.id, e);
        }
        self.match_record.status = MatchStatus::InProgress;
        self.match_record.started_at = Some(now);

        info!(
            "Session {} started ({} mode, topic: {})",
            self.id, self.config.mode, self.match_record.conversation_topic
        );

        if self.config.mode == SessionMode::Solo {
            if let Some(greeting) = self.config.greeting.clone() {
                let turn_index = self.push_turn(Turn::ai(&self.config.ai_name, greeting));
                self.apply(TurnEvent::Greeted { turn_index })?;
                self.speak().await?;
            }
        }

        Ok(())
    }

    /// Start capturing the learner's turn
    ///
    /// Returns `false` without side effects unless the session is idle.
    pub async fn start_listening(&mut self) -> VoiceResult<bool> {
        if self.state != TurnState::Idle {
            debug!("Ignoring start_listening while {}", self.state.name());
            return Ok(false);
        }

        if self.clock.is_none() {
            self.begin().await?;
            if self.state != TurnState::Idle {
                return Ok(false);
            }
        }

        self.recorder.record_once(&mut self.capture).await?;
        self.start_meter();
        self.apply(TurnEvent::CaptureStarted)?;

        info!("Listening (session {})", self.id);
        Ok(true)
    }

    fn start_meter(&mut self) {
        if !self.meter.is_attached() {
            match self.capture.stream() {
                Some(stream) => self.meter.attach(stream),
                None => return,
            }
        }

        let context = self.context.clone();
        self.meter
            .start_monitoring(move |level| context.set_level(level));
    }

    fn halt_meter(&mut self) {
        self.meter.stop_monitoring();
        self.context.set_level(0.0);
    }

    /// Finish the learner's turn and run the rest of the pipeline
    ///
    /// Solo mode transcribes, asks for a reply and voices it before
    /// returning. Partner mode only transcribes.
    pub async fn stop_listening(&mut self) -> VoiceResult<TurnOutcome> {
        if self.state != TurnState::Listening {
            debug!("Ignoring stop_listening while {}", self.state.name());
            return Ok(TurnOutcome::Ignored);
        }

        let recorded = self.recorder.stop().await;
        self.halt_meter();
        let audio = match recorded {
            Ok(audio) => audio,
            Err(e) => {
                self.apply(TurnEvent::Cancelled)?;
                return Err(e);
            }
        };
        self.apply(TurnEvent::CaptureStopped)?;

        let text = match audio {
            Some(blob) => self.services.speech.transcribe(&blob).await,
            None => fallback::NO_TRANSCRIPTION.to_string(),
        };
        let user = Turn::user(&self.config.user_name, text);
        self.push_turn(user.clone());

        if self.config.mode == SessionMode::Partner {
            return Ok(TurnOutcome::UserTurn { user });
        }

        self.apply(TurnEvent::Transcribed)?;

        let history: Vec<ChatMessage> = self.turns.iter().map(Turn::to_chat_message).collect();
        let reply_text = match self
            .services
            .speech
            .respond(
                &history,
                &self.match_record.conversation_topic,
                self.context.abort_handle(),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                self.apply(TurnEvent::Cancelled)?;
                return Err(e);
            }
        };

        let reply = Turn::ai(&self.config.ai_name, reply_text);
        let turn_index = self.push_turn(reply.clone());
        self.apply(TurnEvent::Replied { turn_index })?;

        let spoken = self.speak().await?;
        Ok(TurnOutcome::Exchange {
            user,
            reply,
            spoken,
        })
    }

    /// Voice the AI turn named by the `Speaking` state
    async fn speak(&mut self) -> VoiceResult<bool> {
        let TurnState::Speaking { turn_index } = self.state else {
            return Err(VoiceError::InvalidTransition {
                from: self.state.name(),
                event: "speak",
            });
        };
        let text = self
            .turns
            .get(turn_index)
            .map(|t| t.text.clone())
            .unwrap_or_default();

        let audio = match self
            .services
            .speech
            .synthesize(&text, self.config.voice, self.context.abort_handle())
            .await
        {
            Ok(Some(audio)) => audio,
            Ok(None) => {
                self.apply(TurnEvent::SynthesisSkipped)?;
                return Ok(false);
            }
            Err(e) => {
                self.apply(TurnEvent::Cancelled)?;
                return Err(e);
            }
        };

        let stop = self.context.begin_playback();
        let played = self.services.sink.play(&audio, stop.clone()).await;
        self.context.finish_playback();

        if stop.is_cancelled() {
            info!("Playback of turn {} interrupted", turn_index);
            self.apply(TurnEvent::Cancelled)?;
            return Err(VoiceError::Cancelled);
        }

        if let Err(e) = &played {
            warn!(
                "Playback through {} sink failed: {}",
                self.services.sink.name(),
                e
            );
        }

        self.apply(TurnEvent::PlaybackFinished)?;
        Ok(played.is_ok())
    }

    /// Switch the conversation topic for the rest of the session
    pub async fn change_topic(&mut self, topic: impl Into<String>, keywords: Vec<String>) {
        let topic = topic.into();

        if let Err(e) = self
            .services
            .store
            .update_match_topic(self.match_record.id, &topic, &keywords)
            .await
        {
            warn!("Failed to store topic for match {}: {}", self.match_record.id, e);
        }

        info!("Session {} topic changed to: {}", self.id, topic);
        self.match_record.conversation_topic = topic;
        self.match_record.suggested_keywords = keywords;
    }

    /// Whole seconds since `begin`; frozen once the session ends
    pub fn elapsed_secs(&self) -> u64 {
        if let Some(secs) = self.final_elapsed {
            return secs;
        }
        self.clock.map(|c| c.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        let limit = self.config.time_limit?;
        let clock = self.clock?;
        Some(limit.saturating_sub(clock.elapsed()))
    }

    /// Time limit reached on a session that has not ended yet
    pub fn is_expired(&self) -> bool {
        self.state != TurnState::Ended && self.time_remaining() == Some(Duration::ZERO)
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.turns
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            match_id: self.match_record.id,
            mode: self.config.mode,
            state: self.state,
            topic: self.match_record.conversation_topic.clone(),
            started_at: self.started_at,
            elapsed_secs: self.elapsed_secs(),
            turn_count: self.turns.len(),
            audio_level: self.context.level(),
            online: self.services.speech.is_online(),
            expired: self.is_expired(),
        }
    }

    /// End the session and produce feedback
    ///
    /// Releases the microphone, analyses the transcript and stores the
    /// results. Storage failures are logged; the summary is returned either
    /// way. Later calls return the same summary.
    pub async fn end(&mut self) -> SessionSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        let elapsed = self.elapsed_secs();
        self.final_elapsed = Some(elapsed);
        if let Err(e) = self.apply(TurnEvent::End) {
            warn!("Session {}: {}", self.id, e);
            self.state = TurnState::Ended;
        }

        self.context.cancel();
        self.meter.detach();
        self.context.set_level(0.0);
        if let Err(e) = self.recorder.stop().await {
            debug!("Discarding unfinished recording: {}", e);
        }
        self.capture.release().await;

        let topic = self.match_record.conversation_topic.clone();
        let transcript = transcript_text(&self.turns);
        let analysis = self
            .services
            .speech
            .analyze_feedback(&transcript, duration_minutes(elapsed), &topic)
            .await;

        let mut feedback = FeedbackReport::from_analysis(analysis, &self.turns, elapsed, 0);
        let baseline = match self
            .services
            .store
            .recent_feedback(self.config.user_id, BASELINE_WINDOW)
            .await
        {
            Ok(recent) => baseline_average(&recent),
            Err(e) => {
                warn!("Failed to load previous feedback: {}", e);
                None
            }
        };
        feedback.improvement_score = improvement_score(feedback.average_score(), baseline);

        let (conversation_id, progress) = match self.persist(&feedback, &transcript).await {
            Ok((id, progress)) => (Some(id), progress),
            Err(e) => {
                error!("Error saving conversation for session {}: {}", self.id, e);
                (None, None)
            }
        };

        info!(
            "Session {} ended after {}s with {} turns (rating {:.1})",
            self.id,
            elapsed,
            self.turns.len(),
            feedback.overall_rating
        );

        let summary = SessionSummary {
            session_id: self.id,
            match_id: self.match_record.id,
            topic,
            duration_secs: elapsed,
            turns: self.turns.clone(),
            feedback,
            progress,
            conversation_id,
        };
        self.summary = Some(summary.clone());
        summary
    }

    async fn persist(
        &mut self,
        feedback: &FeedbackReport,
        transcript: &str,
    ) -> VoiceResult<(Uuid, Option<ProgressUpdate>)> {
        let store = Arc::clone(&self.services.store);
        let user_id = self.config.user_id;
        let now = Utc::now();

        store
            .update_match_status(self.match_record.id, MatchStatus::Completed, now)
            .await?;
        self.match_record.status = MatchStatus::Completed;
        self.match_record.completed_at = Some(now);

        let conversation = store
            .insert_conversation(ConversationRecord {
                id: Uuid::new_v4(),
                match_id: self.match_record.id,
                transcript: transcript.to_string(),
                duration_minutes: feedback.duration_minutes,
                accuracy_percentage: feedback.average_score().round() as u32,
                created_at: now,
            })
            .await?;

        let turn_records: Vec<ConversationTurnRecord> = self
            .turns
            .iter()
            .enumerate()
            .map(|(i, turn)| ConversationTurnRecord {
                conversation_id: conversation.id,
                speaker_name: turn.speaker.clone(),
                speaker_type: turn.kind,
                message_text: turn.text.clone(),
                turn_number: i as u32 + 1,
                created_at: turn.timestamp,
            })
            .collect();
        if !turn_records.is_empty() {
            store.insert_turns(turn_records).await?;
        }

        store
            .insert_feedback(FeedbackRecord {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                user_id,
                vocabulary_mastery: feedback.vocabulary,
                pronunciation_score: feedback.pronunciation,
                fluency_score: feedback.fluency,
                tone_score: feedback.tone,
                fluency_comment: feedback.fluency_comment.clone(),
                vocabulary_comment: feedback.vocabulary_comment.clone(),
                tone_comment: feedback.tone_comment.clone(),
                improvement_notes: feedback.overall_notes.clone(),
                improvement_score: feedback.improvement_score,
                overall_rating: feedback.overall_rating,
                created_at: now,
            })
            .await?;

        let progress = match store.get_profile(user_id).await? {
            Some(mut profile) => {
                let update = apply_session(&mut profile, feedback.rating_average(), now.date_naive());
                store.upsert_profile(profile).await?;
                info!(
                    "Rating {} -> {}, streak {}",
                    update.elo_before, update.elo_after, update.current_streak
                );
                Some(update)
            }
            None => {
                warn!("No profile for user {}, skipping progress update", user_id);
                None
            }
        };

        Ok((conversation.id, progress))
    }
}
