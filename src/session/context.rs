use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::AbortHandle;

/// Per-session handles shared with other tasks
///
/// Owns the in-flight request abort handle, the current playback and the
/// last reported input level. Cloning yields a handle to the same session,
/// which is how the HTTP layer cancels a turn while the pipeline holds the
/// session itself.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    abort: AbortHandle,
    playback: Arc<Mutex<Option<CancellationToken>>>,
    level: Arc<AtomicU32>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    /// Register a playback and return its stop token
    pub(crate) fn begin_playback(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.playback.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    pub(crate) fn finish_playback(&self) {
        self.playback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Stop the current playback; false when nothing was playing
    pub fn stop_audio(&self) -> bool {
        let current = self
            .playback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match current {
            Some(token) => {
                token.cancel();
                debug!("Playback stopped");
                true
            }
            None => false,
        }
    }

    /// Abort the in-flight request and any playback
    pub fn cancel(&self) -> bool {
        let aborted = self.abort.abort();
        let stopped = self.stop_audio();
        aborted || stopped
    }

    pub fn is_busy(&self) -> bool {
        self.abort.is_pending()
            || self
                .playback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_some()
    }

    pub(crate) fn set_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Last input level reported by the meter, 0-100
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}
