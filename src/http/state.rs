use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::audio::{AudioSink, CaptureConstraints, CaptureSource, FileSink, NullSink};
use crate::bridge::SpeechBridge;
use crate::config::Config;
use crate::session::{ConversationSession, SessionConfig, SessionContext, SessionServices};
use crate::store::MemoryStore;

/// Live sessions by id; an entry is removed when its session ends
pub type SessionMap = Arc<RwLock<HashMap<Uuid, SessionEntry>>>;

/// A live session plus the handle used to interrupt it while it is locked
#[derive(Clone)]
pub struct SessionEntry {
    pub session: Arc<Mutex<ConversationSession>>,
    pub canceller: SessionContext,
}

impl SessionEntry {
    pub fn new(session: ConversationSession) -> Self {
        let canceller = session.canceller();
        Self {
            session: Arc::new(Mutex::new(session)),
            canceller,
        }
    }

    /// End the session once its time limit passes, unless it was ended first
    pub fn watch_time_limit(sessions: SessionMap, session_id: Uuid, limit: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;

            let Some(entry) = sessions.write().await.remove(&session_id) else {
                return;
            };

            info!("Session {} reached its time limit", session_id);
            entry.canceller.cancel();
            entry.session.lock().await.end().await;
        });
    }
}

/// How new sessions are wired up
#[derive(Debug, Clone)]
pub struct SessionTemplate {
    /// Base settings; user and mode are filled in per request
    pub config: SessionConfig,
    pub capture_source: CaptureSource,
    pub constraints: CaptureConstraints,
}

impl Default for SessionTemplate {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            capture_source: CaptureSource::Synthetic,
            constraints: CaptureConstraints::default(),
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active sessions (session_id → session)
    pub sessions: SessionMap,

    pub services: SessionServices,

    pub template: Arc<SessionTemplate>,
}

impl AppState {
    pub fn new(services: SessionServices, template: SessionTemplate) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            services,
            template: Arc::new(template),
        }
    }

    /// Provider bridge and in-memory store from configuration
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let sink: Arc<dyn AudioSink> = match &cfg.session.output_dir {
            Some(dir) => Arc::new(FileSink::new(dir)),
            None => Arc::new(NullSink),
        };

        let services = SessionServices {
            speech: Arc::new(SpeechBridge::new(cfg.bridge_config())),
            store: Arc::new(MemoryStore::new()),
            sink,
        };

        let template = SessionTemplate {
            config: cfg.session_config(Uuid::nil(), Default::default()),
            capture_source: cfg.capture_source()?,
            constraints: cfg.capture_constraints(),
        };

        Ok(Self::new(services, template))
    }

    pub async fn session(&self, id: Uuid) -> Option<SessionEntry> {
        self.sessions.read().await.get(&id).cloned()
    }
}
