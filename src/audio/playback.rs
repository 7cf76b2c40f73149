use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::file::AudioFile;
use super::format::AudioBlob;
use crate::error::{VoiceError, VoiceResult};

/// Destination for synthesized speech
///
/// `play` resolves when playback completes or `stop` fires; an interrupted
/// playback is not an error.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &AudioBlob, stop: CancellationToken) -> VoiceResult<()>;

    fn name(&self) -> &str;
}

/// Completes immediately without output
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, audio: &AudioBlob, _stop: CancellationToken) -> VoiceResult<()> {
        debug!("Discarding {} bytes of speech", audio.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Writes each utterance to `dir` as `speech-NNN.<ext>`
///
/// With `realtime`, WAV output is held for its own duration so callers
/// observe the same timing as a speaker would.
pub struct FileSink {
    dir: PathBuf,
    realtime: bool,
    counter: AtomicUsize,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            realtime: false,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn written(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&self, audio: &AudioBlob, stop: CancellationToken) -> VoiceResult<()> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let ext = audio
            .file_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("bin");
        let path = self.dir.join(format!("speech-{:03}.{}", index, ext));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| VoiceError::Device(format!("cannot create {}: {e}", self.dir.display())))?;
        tokio::fs::write(&path, &audio.data)
            .await
            .map_err(|e| VoiceError::Device(format!("cannot write {}: {e}", path.display())))?;

        info!("Speech written to {}", path.display());

        if self.realtime {
            if let Ok(decoded) = AudioFile::from_wav_bytes(&audio.data) {
                let hold = Duration::from_secs_f64(decoded.duration_seconds.max(0.0));
                tokio::select! {
                    _ = stop.cancelled() => debug!("Playback interrupted"),
                    _ = tokio::time::sleep(hold) => {}
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
