use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::cancel::{AbortHandle, RequestGuard};
use super::fallback;
use super::messages::{
    ChatMessage, ChatRequest, ChatResponse, FeedbackAnalysis, ResponseFormat, SpeechRequest,
    TranscriptionResponse, Voice,
};
use super::{SpeechService, PLACEHOLDER_API_KEY};
use crate::audio::AudioBlob;
use crate::error::{VoiceError, VoiceResult};

/// Provider endpoints, models and credential
#[derive(Clone)]
pub struct BridgeConfig {
    /// Bearer credential; absent, empty or placeholder means offline mode
    pub api_key: Option<String>,
    /// API base, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    /// Language the learner is practising
    pub target_language: String,
    /// Reply length cap for conversation turns
    pub max_tokens: u32,
    /// Sampling temperature for conversation turns
    pub temperature: f32,
    /// Sampling temperature for feedback analysis
    pub feedback_temperature: f32,
    pub speech_speed: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            speech_model: "tts-1".to_string(),
            target_language: "English".to_string(),
            max_tokens: 120,
            temperature: 0.8,
            feedback_temperature: 0.7,
            speech_speed: 1.0,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &self.credential().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("transcription_model", &self.transcription_model)
            .field("chat_model", &self.chat_model)
            .field("speech_model", &self.speech_model)
            .field("target_language", &self.target_language)
            .finish_non_exhaustive()
    }
}

impl BridgeConfig {
    /// Usable credential, if one is configured
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Persona instruction for conversation turns
pub fn persona_prompt(language: &str, topic: &str) -> String {
    format!(
        "You are a friendly practice partner helping someone improve their spoken {language}. \
         The conversation topic is: \"{topic}\". Reply in at most 2-3 short sentences, keep it \
         natural and encouraging, and usually end with a follow-up question so the conversation \
         keeps flowing. Help the learner feel confident."
    )
}

const FEEDBACK_INSTRUCTIONS: &str = r#"You are an expert language coach reviewing a practice conversation transcript. Score fluency, vocabulary and tone from 0 to 100 and give short, encouraging feedback. Answer with JSON only:
{
  "fluency": <number 0-100>,
  "vocabulary": <number 0-100>,
  "tone": <number 0-100>,
  "fluencyComment": "<1-2 sentences>",
  "vocabularyComment": "<1-2 sentences>",
  "toneComment": "<1-2 sentences>",
  "overallNotes": "<2-3 sentence summary>"
}
Lead with what the learner did well, then offer gentle suggestions."#;

/// HTTP client for the speech and chat provider
pub struct SpeechBridge {
    config: BridgeConfig,
    client: reqwest::Client,
}

impl SpeechBridge {
    pub fn new(config: BridgeConfig) -> Self {
        if config.credential().is_none() {
            info!("No AI credential configured; bridge runs in offline mode");
        }

        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn send<T: DeserializeOwned>(
        &self,
        key: &str,
        request: reqwest::RequestBuilder,
    ) -> VoiceResult<T> {
        let response = request
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| VoiceError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::NetworkFailure(format!("{status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| VoiceError::NetworkFailure(e.to_string()))
    }

    async fn chat(
        &self,
        key: &str,
        messages: Vec<ChatMessage>,
        max_tokens: Option<u32>,
        temperature: f32,
        response_format: Option<ResponseFormat>,
    ) -> VoiceResult<Option<String>> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            max_tokens,
            temperature,
            response_format,
        };

        let response: ChatResponse = self
            .send(
                key,
                self.client
                    .post(self.config.endpoint("chat/completions"))
                    .json(&request),
            )
            .await?;

        Ok(response.first_content())
    }

    async fn speech(&self, key: &str, text: &str, voice: Voice) -> VoiceResult<AudioBlob> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice,
            speed: self.config.speech_speed,
        };

        let response = self
            .client
            .post(self.config.endpoint("audio/speech"))
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::NetworkFailure(format!("{status}: {body}")));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| VoiceError::NetworkFailure(e.to_string()))?;

        Ok(AudioBlob::new(mime_type, data.to_vec()))
    }
}

async fn cancellable<T>(
    guard: &RequestGuard,
    request: impl Future<Output = VoiceResult<T>>,
) -> VoiceResult<T> {
    tokio::select! {
        biased;
        _ = guard.token().cancelled() => Err(VoiceError::Cancelled),
        result = request => result,
    }
}

#[async_trait]
impl SpeechService for SpeechBridge {
    async fn transcribe(&self, audio: &AudioBlob) -> String {
        let Some(key) = self.config.credential() else {
            debug!("No API key, using simulated transcription");
            return fallback::transcript(audio.len());
        };

        info!(
            "Starting transcription, blob size: {} type: {}",
            audio.len(),
            audio.mime_type
        );

        let part = match Part::bytes(audio.data.clone())
            .file_name(audio.file_name())
            .mime_str(&audio.mime_type)
        {
            Ok(part) => part,
            Err(e) => {
                warn!("Invalid audio MIME type {}: {}", audio.mime_type, e);
                return fallback::transcript(audio.len());
            }
        };

        let form = Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let result: VoiceResult<TranscriptionResponse> = self
            .send(
                key,
                self.client
                    .post(self.config.endpoint("audio/transcriptions"))
                    .multipart(form),
            )
            .await;

        match result {
            Ok(response) if response.text.trim().is_empty() => {
                fallback::NO_TRANSCRIPTION.to_string()
            }
            Ok(response) => {
                info!("Transcription successful: {}", response.text);
                response.text
            }
            Err(e) => {
                warn!("Transcription failed, using simulated transcript: {}", e);
                fallback::transcript(audio.len())
            }
        }
    }

    async fn respond(
        &self,
        history: &[ChatMessage],
        topic: &str,
        abort: &AbortHandle,
    ) -> VoiceResult<String> {
        let Some(key) = self.config.credential() else {
            debug!("No API key, using simulated AI response");
            return Ok(fallback::reply(history.len()));
        };

        info!(
            "Generating AI response for conversation with {} messages",
            history.len()
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(persona_prompt(
            &self.config.target_language,
            topic,
        )));
        messages.extend_from_slice(history);

        let guard = abort.begin();
        let result = cancellable(
            &guard,
            self.chat(
                key,
                messages,
                Some(self.config.max_tokens),
                self.config.temperature,
                None,
            ),
        )
        .await;

        match result {
            Ok(Some(reply)) => {
                info!("AI response generated: {}", reply);
                Ok(reply)
            }
            Ok(None) => {
                warn!("AI response was empty, using simulated reply");
                Ok(fallback::reply(history.len()))
            }
            Err(VoiceError::Cancelled) => {
                info!("AI response request aborted");
                Err(VoiceError::Cancelled)
            }
            Err(e) => {
                warn!("AI response failed, using simulated reply: {}", e);
                Ok(fallback::reply(history.len()))
            }
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        abort: &AbortHandle,
    ) -> VoiceResult<Option<AudioBlob>> {
        let Some(key) = self.config.credential() else {
            debug!("No API key, skipping speech synthesis");
            return Ok(None);
        };

        let preview: String = text.chars().take(50).collect();
        info!("Synthesizing speech ({}): {}...", voice, preview);

        let guard = abort.begin();
        match cancellable(&guard, self.speech(key, text, voice)).await {
            Ok(audio) => {
                info!("Speech synthesis successful, {} bytes", audio.len());
                Ok(Some(audio))
            }
            Err(VoiceError::Cancelled) => {
                info!("Speech synthesis request aborted");
                Err(VoiceError::Cancelled)
            }
            Err(e) => {
                warn!("Speech synthesis failed, skipping playback: {}", e);
                Ok(None)
            }
        }
    }

    async fn analyze_feedback(
        &self,
        transcript: &str,
        duration_minutes: u32,
        topic: &str,
    ) -> FeedbackAnalysis {
        let Some(key) = self.config.credential() else {
            debug!("No API key, using simulated feedback");
            return fallback::analysis(transcript);
        };

        let messages = vec![
            ChatMessage::system(FEEDBACK_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Analyze this {duration_minutes}-minute conversation about \"{topic}\":\n\n\
                 {transcript}\n\nProvide scores and feedback."
            )),
        ];

        let content = self
            .chat(
                key,
                messages,
                None,
                self.config.feedback_temperature,
                Some(ResponseFormat::json_object()),
            )
            .await;

        match content {
            Ok(Some(json)) => match serde_json::from_str::<FeedbackAnalysis>(&json) {
                Ok(analysis) => analysis.clamped(),
                Err(e) => {
                    warn!("Feedback analysis was not valid JSON: {}", e);
                    fallback::analysis(transcript)
                }
            },
            Ok(None) => {
                warn!("Feedback analysis was empty, using simulated feedback");
                fallback::analysis(transcript)
            }
            Err(e) => {
                warn!("Feedback analysis failed, using simulated feedback: {}", e);
                fallback::analysis(transcript)
            }
        }
    }

    fn is_online(&self) -> bool {
        self.config.credential().is_some()
    }
}
