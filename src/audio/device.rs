use std::f32::consts::PI;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::file::AudioFile;
use crate::error::{VoiceError, VoiceResult};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / self.channels.max(1) as u64;
        per_channel * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Processing requested from the capture device
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Frame size in milliseconds
    pub buffer_duration_ms: u64,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for Whisper
            channels: 1,
            buffer_duration_ms: 100,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl CaptureConstraints {
    fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.buffer_duration_ms / 1000) as usize * self.channels as usize
    }
}

/// Audio capture device
///
/// Implementations:
/// - `SyntheticCapture`: generated tone or silence (demo, tests)
/// - `WavFileCapture`: replays a WAV file
/// - `MicrophoneCapture`: default input device via cpal (`microphone` feature)
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open the hardware stream
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<mpsc::Receiver<AudioFrame>>;

    /// Stop all tracks
    async fn close(&mut self) -> VoiceResult<()>;

    /// Check if the device is currently open
    fn is_open(&self) -> bool;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Capture source selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Generated sine tone
    Synthetic,
    /// Generated silence
    Silence,
    /// Replay a WAV file
    File(PathBuf),
    /// Default input device
    Microphone,
}

impl FromStr for CaptureSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthetic" => Ok(Self::Synthetic),
            "silence" => Ok(Self::Silence),
            "microphone" | "mic" => Ok(Self::Microphone),
            other => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
                _ => anyhow::bail!(
                    "unknown capture source {other:?} (expected synthetic, silence, microphone or file:<path>)"
                ),
            },
        }
    }
}

/// Create a capture device for the given source
pub fn create_capture_device(source: &CaptureSource) -> VoiceResult<Box<dyn CaptureDevice>> {
    match source {
        CaptureSource::Synthetic => Ok(Box::new(SyntheticCapture::tone(440.0, 0.3))),
        CaptureSource::Silence => Ok(Box::new(SyntheticCapture::silence())),
        CaptureSource::File(path) => Ok(Box::new(WavFileCapture::new(path.clone()))),
        CaptureSource::Microphone => {
            #[cfg(feature = "microphone")]
            {
                Ok(Box::new(super::microphone::MicrophoneCapture::new()))
            }

            #[cfg(not(feature = "microphone"))]
            {
                Err(VoiceError::Unsupported)
            }
        }
    }
}

/// Generated capture stream at real-time cadence
pub struct SyntheticCapture {
    frequency_hz: f32,
    amplitude: f32,
    cancel: Option<CancellationToken>,
}

impl SyntheticCapture {
    /// Sine tone; `amplitude` is a fraction of full scale
    pub fn tone(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude: amplitude.clamp(0.0, 1.0),
            cancel: None,
        }
    }

    pub fn silence() -> Self {
        Self::tone(0.0, 0.0)
    }
}

#[async_trait::async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.cancel.is_some() {
            return Err(VoiceError::DeviceBusy);
        }

        let (tx, rx) = mpsc::channel(100);
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let mut constraints = constraints.clone();
        // interval() panics on a zero period
        constraints.buffer_duration_ms = constraints.buffer_duration_ms.max(1);
        let frequency = self.frequency_hz;
        let amplitude = self.amplitude * i16::MAX as f32;

        info!(
            "Synthetic capture opened ({}Hz, {} channels, {:.0}Hz tone)",
            constraints.sample_rate, constraints.channels, frequency
        );

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(constraints.buffer_duration_ms));
            let samples_per_frame = constraints.samples_per_frame();
            let channels = constraints.channels.max(1) as usize;
            let mut phase_index: u64 = 0;
            let mut timestamp_ms = 0;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let mut samples = Vec::with_capacity(samples_per_frame);
                for _ in 0..samples_per_frame / channels {
                    let t = phase_index as f32 / constraints.sample_rate as f32;
                    let value = (amplitude * (2.0 * PI * frequency * t).sin()) as i16;
                    samples.extend(std::iter::repeat(value).take(channels));
                    phase_index += 1;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate: constraints.sample_rate,
                    channels: constraints.channels,
                    timestamp_ms,
                };
                timestamp_ms += constraints.buffer_duration_ms;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            debug!("Synthetic capture task stopped");
        });

        Ok(rx)
    }

    async fn close(&mut self) -> VoiceResult<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
            info!("Synthetic capture closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.cancel.is_some()
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Replays a 16-bit WAV file as capture frames
///
/// The file's own sample rate and channel count are kept; frames are paced
/// at `buffer_duration_ms` and the stream ends after the last sample.
pub struct WavFileCapture {
    path: PathBuf,
    cancel: Option<CancellationToken>,
}

impl WavFileCapture {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cancel: None }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for WavFileCapture {
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.cancel.is_some() {
            return Err(VoiceError::DeviceBusy);
        }

        let audio = AudioFile::open(&self.path).map_err(|_| VoiceError::NoDevice)?;

        let (tx, rx) = mpsc::channel(100);
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let buffer_ms = constraints.buffer_duration_ms.max(1);
        let per_frame = (audio.sample_rate as u64 * buffer_ms / 1000) as usize
            * audio.channels as usize;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(buffer_ms));
            let mut timestamp_ms = 0;

            for chunk in audio.samples.chunks(per_frame.max(1)) {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += buffer_ms;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            debug!("WAV replay finished: {}", audio.path);
        });

        Ok(rx)
    }

    async fn close(&mut self) -> VoiceResult<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.cancel.is_some()
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
