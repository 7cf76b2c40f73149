use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Session-scoped abort slot for cancellable provider calls
///
/// Each request installs a fresh token; beginning a new request cancels the
/// one it supersedes. The slot is cleared when the request's guard drops.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    current: Option<CancellationToken>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight request
    pub fn begin(&self) -> RequestGuard {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.current.take() {
            debug!("Superseding in-flight request");
            previous.cancel();
        }

        slot.generation += 1;
        let token = CancellationToken::new();
        slot.current = Some(token.clone());

        RequestGuard {
            handle: self.clone(),
            generation: slot.generation,
            token,
        }
    }

    /// Cancel the in-flight request; returns whether one was pending
    pub fn abort(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.current.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.current.is_some())
            .unwrap_or(false)
    }
}

/// Clears the abort slot when the request completes
pub struct RequestGuard {
    handle: AbortHandle,
    generation: u64,
    token: CancellationToken,
}

impl RequestGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let mut slot = self.handle.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.generation == self.generation {
            slot.current = None;
        }
    }
}
