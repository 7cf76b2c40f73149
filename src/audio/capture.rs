// Media capture adapter
//
// Owns the one hardware stream a session may hold. The device's frames are
// fanned out over a broadcast channel so the recorder and the level meter
// can share the same stream, and the most recent frame is kept in a watch
// slot for the analyser.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::device::{AudioFrame, CaptureConstraints, CaptureDevice};
use crate::error::VoiceResult;

const FANOUT_CAPACITY: usize = 256;

/// Shared handle to an acquired capture stream
#[derive(Clone)]
pub struct CaptureStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    id: Uuid,
    device_name: String,
    constraints: CaptureConstraints,
    frames: broadcast::Sender<AudioFrame>,
    latest: watch::Receiver<Option<AudioFrame>>,
}

impl CaptureStream {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn device_name(&self) -> &str {
        &self.inner.device_name
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.inner.constraints
    }

    /// Receive every frame captured from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.inner.frames.subscribe()
    }

    /// Most recently captured frame, if any
    pub fn latest_frame(&self) -> Option<AudioFrame> {
        self.inner.latest.borrow().clone()
    }
}

impl fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureStream")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device_name)
            .finish()
    }
}

/// Scoped acquisition of a capture device
///
/// `acquire` opens the device once and hands out clones of the same stream
/// handle until `release` closes it. Dropping the adapter stops the fan-out
/// task, which in turn closes the device channel.
pub struct MediaCapture {
    device: Box<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    stream: Option<CaptureStream>,
    pump: Option<JoinHandle<()>>,
}

impl MediaCapture {
    pub fn new(device: Box<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            stream: None,
            pump: None,
        }
    }

    /// Acquire the stream, reusing the existing handle if one is held
    pub async fn acquire(&mut self) -> VoiceResult<CaptureStream> {
        if let Some(stream) = &self.stream {
            debug!("Reusing capture stream {}", stream.id());
            return Ok(stream.clone());
        }

        info!("Requesting capture from {}", self.device.name());

        let mut device_rx = match self.device.open(&self.constraints).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Capture acquisition failed on {}: {}", self.device.name(), e);
                return Err(e);
            }
        };

        let (frames_tx, _) = broadcast::channel(FANOUT_CAPACITY);
        let (latest_tx, latest_rx) = watch::channel(None);

        let fanout = frames_tx.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = device_rx.recv().await {
                latest_tx.send_replace(Some(frame.clone()));
                // No subscribers is fine; the meter reads the watch slot
                let _ = fanout.send(frame);
            }
            debug!("Capture fan-out finished");
        });

        let stream = CaptureStream {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4(),
                device_name: self.device.name().to_string(),
                constraints: self.constraints.clone(),
                frames: frames_tx,
                latest: latest_rx,
            }),
        };

        info!("Capture granted: {} ({})", stream.device_name(), stream.id());

        self.stream = Some(stream.clone());
        self.pump = Some(pump);

        Ok(stream)
    }

    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<CaptureStream> {
        self.stream.clone()
    }

    /// Stop all tracks. Safe to call repeatedly.
    pub async fn release(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = self.device.close().await {
            warn!("Failed to close capture device {}: {}", self.device.name(), e);
        }

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        info!("Capture released: {} ({})", stream.device_name(), stream.id());
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
