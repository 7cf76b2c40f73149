// Recorder
//
// Two modes over the shared capture stream:
// - record_once: buffer every frame until stop, then encode one blob
// - record_streaming: encode a chunk every STREAMING_CHUNK_MS and push it to
//   a bounded channel; chunks are dropped when the consumer falls behind

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capture::MediaCapture;
use super::chunk::{AudioChunk, ChunkAccumulator, STREAMING_CHUNK_MS};
use super::device::AudioFrame;
use super::format::{encode_frames, negotiate_mime_type, AudioBlob, SUPPORTED_MIME_TYPES};
use crate::error::{VoiceError, VoiceResult};

const CHUNK_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    Once,
    Streaming,
}

struct ActiveRecording {
    mode: RecordingMode,
    stop: CancellationToken,
    task: JoinHandle<VoiceResult<Option<AudioBlob>>>,
}

pub struct Recorder {
    preferences: Vec<String>,
    chunk_duration_ms: u64,
    active: Option<ActiveRecording>,
}

impl Recorder {
    pub fn new(preferences: Vec<String>) -> Self {
        Self {
            preferences,
            chunk_duration_ms: STREAMING_CHUNK_MS,
            active: None,
        }
    }

    /// Override the streaming chunk cadence
    pub fn with_chunk_duration_ms(mut self, chunk_duration_ms: u64) -> Self {
        self.chunk_duration_ms = chunk_duration_ms;
        self
    }

    pub fn negotiated_mime_type(&self) -> VoiceResult<String> {
        negotiate_mime_type(&self.preferences, SUPPORTED_MIME_TYPES)
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn mode(&self) -> Option<RecordingMode> {
        self.active.as_ref().map(|a| a.mode)
    }

    /// Start buffering a single recording; `stop` returns the blob
    pub async fn record_once(&mut self, capture: &mut MediaCapture) -> VoiceResult<()> {
        if self.is_recording() {
            debug!("Recorder already running");
            return Ok(());
        }

        let mime_type = self.negotiated_mime_type()?;
        let stream = capture.acquire().await?;
        let mut frames_rx = stream.subscribe();
        let stop = CancellationToken::new();

        let task_stop = stop.clone();
        let task_mime = mime_type.clone();
        let task = tokio::spawn(async move {
            let mut frames = Vec::new();

            loop {
                tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    received = frames_rx.recv() => match received {
                        Ok(frame) => frames.push(frame),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Recorder lagged, {} frames lost", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            task_stop.cancelled().await;
                            break;
                        }
                    },
                }
            }

            drain(&mut frames_rx, |frame| frames.push(frame));

            let blob = encode_frames(&task_mime, &frames)?;
            info!("Recording stopped, blob size: {} bytes", blob.len());
            Ok::<_, VoiceError>(Some(blob))
        });

        self.active = Some(ActiveRecording {
            mode: RecordingMode::Once,
            stop,
            task,
        });

        info!("Recording started with mime type: {}", mime_type);
        Ok(())
    }

    /// Start a chunked recording
    ///
    /// The returned receiver yields a chunk every chunk period and ends after
    /// `stop`, which flushes the partial final chunk.
    pub async fn record_streaming(
        &mut self,
        capture: &mut MediaCapture,
    ) -> VoiceResult<mpsc::Receiver<AudioChunk>> {
        if self.is_recording() {
            // Only one recording at a time; hand back a closed stream
            warn!("Recorder already running, ignoring streaming request");
            let (_, rx) = mpsc::channel(1);
            return Ok(rx);
        }

        let mime_type = self.negotiated_mime_type()?;
        let stream = capture.acquire().await?;
        let mut frames_rx = stream.subscribe();
        let stop = CancellationToken::new();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);

        let task_stop = stop.clone();
        let mut accumulator = ChunkAccumulator::new(mime_type.clone(), self.chunk_duration_ms);
        let task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    received = frames_rx.recv() => match received {
                        Ok(frame) => frame,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Streaming recorder lagged, {} frames lost", n);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            task_stop.cancelled().await;
                            break;
                        }
                    },
                };

                if let Some(chunk) = accumulator.push(frame)? {
                    deliver(&chunk_tx, chunk);
                }
            }

            let mut tail = Vec::new();
            drain(&mut frames_rx, |frame| tail.push(frame));
            for frame in tail {
                if let Some(chunk) = accumulator.push(frame)? {
                    deliver(&chunk_tx, chunk);
                }
            }
            if let Some(chunk) = accumulator.flush()? {
                deliver(&chunk_tx, chunk);
            }

            info!("Streaming recording stopped");
            Ok::<_, VoiceError>(None)
        });

        self.active = Some(ActiveRecording {
            mode: RecordingMode::Streaming,
            stop,
            task,
        });

        info!(
            "Streaming recording started with {}ms chunks ({})",
            self.chunk_duration_ms, mime_type
        );
        Ok(chunk_rx)
    }

    /// Stop the active recording
    ///
    /// Returns the blob of a one-shot recording; `None` for streaming
    /// recordings and when nothing was recording.
    pub async fn stop(&mut self) -> VoiceResult<Option<AudioBlob>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        active.stop.cancel();
        match active.task.await {
            Ok(result) => result,
            Err(e) => Err(VoiceError::Device(format!("recorder task failed: {e}"))),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.cancel();
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<AudioFrame>, mut sink: impl FnMut(AudioFrame)) {
    loop {
        match rx.try_recv() {
            Ok(frame) => sink(frame),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn deliver(tx: &mpsc::Sender<AudioChunk>, chunk: AudioChunk) {
    let index = chunk.metadata.chunk_index;
    match tx.try_send(chunk) {
        Ok(()) => debug!("Audio chunk {} delivered", index),
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Chunk consumer is behind, dropping chunk {}", index)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("Chunk consumer gone, discarding chunk {}", index)
        }
    }
}
