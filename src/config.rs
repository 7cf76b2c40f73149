use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::audio::{CaptureConstraints, CaptureSource, DEFAULT_FORMAT_PREFERENCES};
use crate::bridge::{BridgeConfig, Voice};
use crate::session::{SessionConfig, SessionMode};

/// Prefix for environment overrides, e.g. `LINGUALEAP__AI__CHAT_MODEL`
pub const ENV_PREFIX: &str = "LINGUALEAP";

/// Credential fallback when `ai.api_key` is not set
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub ai: AiConfig,
    pub session: SessionSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "lingualeap".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Capture frame size
    pub buffer_ms: u64,
    /// Level meter cadence
    pub meter_frame_ms: u64,
    /// Recording containers, most preferred first
    pub format_preferences: Vec<String>,
    /// `synthetic`, `silence`, `microphone` or `file:<path>`
    pub source: String,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_ms: 100,
            meter_frame_ms: 16,
            format_preferences: DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source: "synthetic".to_string(),
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: Voice,
    pub target_language: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        Self {
            api_key: None,
            base_url: bridge.base_url,
            transcription_model: bridge.transcription_model,
            chat_model: bridge.chat_model,
            speech_model: bridge.speech_model,
            voice: Voice::default(),
            target_language: bridge.target_language,
            max_tokens: bridge.max_tokens,
            temperature: bridge.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions end themselves after this many seconds
    pub time_limit_secs: Option<u64>,
    /// Opening line for solo sessions
    pub greeting: Option<String>,
    /// Where synthesized speech is written; discarded when unset
    pub output_dir: Option<PathBuf>,
    pub user_name: String,
    pub ai_name: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            time_limit_secs: None,
            greeting: None,
            output_dir: None,
            user_name: defaults.user_name,
            ai_name: defaults.ai_name,
        }
    }
}

impl Config {
    /// Load `path` (any extension the config crate understands, optional)
    /// and apply `LINGUALEAP__SECTION__KEY` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if cfg.ai.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            cfg.ai.api_key = std::env::var(API_KEY_ENV).ok();
        }

        Ok(cfg)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            api_key: self.ai.api_key.clone(),
            base_url: self.ai.base_url.clone(),
            transcription_model: self.ai.transcription_model.clone(),
            chat_model: self.ai.chat_model.clone(),
            speech_model: self.ai.speech_model.clone(),
            target_language: self.ai.target_language.clone(),
            max_tokens: self.ai.max_tokens,
            temperature: self.ai.temperature,
            ..BridgeConfig::default()
        }
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            buffer_duration_ms: self.audio.buffer_ms.max(1),
            echo_cancellation: self.audio.echo_cancellation,
            noise_suppression: self.audio.noise_suppression,
            auto_gain_control: self.audio.auto_gain_control,
        }
    }

    pub fn capture_source(&self) -> Result<CaptureSource> {
        self.audio
            .source
            .parse()
            .context("Invalid audio.source setting")
    }

    /// Session settings for one learner
    pub fn session_config(&self, user_id: Uuid, mode: SessionMode) -> SessionConfig {
        SessionConfig {
            user_id,
            user_name: self.session.user_name.clone(),
            ai_name: self.session.ai_name.clone(),
            mode,
            voice: self.ai.voice,
            time_limit: self.session.time_limit_secs.map(Duration::from_secs),
            greeting: self.session.greeting.clone(),
            format_preferences: self.audio.format_preferences.clone(),
            meter_interval: Duration::from_millis(self.audio.meter_frame_ms.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lingualeap.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[service.http]
port = 9000

[ai]
api_key = "sk-test"
chat_model = "gpt-4o"
voice = "shimmer"

[session]
time_limit_secs = 600
greeting = "Hi there!"
"#
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.http.port, 9000);
        assert_eq!(cfg.service.http.bind, "127.0.0.1");
        assert_eq!(cfg.ai.chat_model, "gpt-4o");
        assert_eq!(cfg.ai.voice, Voice::Shimmer);
        assert_eq!(cfg.audio.sample_rate, 16000);

        let bridge = cfg.bridge_config();
        assert_eq!(bridge.credential(), Some("sk-test"));
        assert_eq!(bridge.speech_model, "tts-1");

        let session = cfg.session_config(Uuid::nil(), SessionMode::Solo);
        assert_eq!(session.time_limit, Some(Duration::from_secs(600)));
        assert_eq!(session.greeting.as_deref(), Some("Hi there!"));
        assert_eq!(session.voice, Voice::Shimmer);
    }

    #[test]
    fn default_source_is_synthetic() {
        let cfg = Config::default();
        assert_eq!(cfg.capture_source().unwrap(), CaptureSource::Synthetic);
        assert_eq!(cfg.capture_constraints().buffer_duration_ms, 100);
    }

    #[test]
    fn zero_buffer_is_clamped() {
        let mut cfg = Config::default();
        cfg.audio.buffer_ms = 0;
        assert_eq!(cfg.capture_constraints().buffer_duration_ms, 1);
    }
}
