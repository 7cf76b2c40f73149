// Live microphone capture through cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread that
// parks until close() signals it.

use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::convert::process_frame;
use super::device::{AudioFrame, CaptureConstraints, CaptureDevice};
use crate::error::{VoiceError, VoiceResult};

/// Default input device of the default host
pub struct MicrophoneCapture {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MicrophoneCapture {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }
}

impl Default for MicrophoneCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_backend(description: &str) -> VoiceError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        VoiceError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        VoiceError::DeviceBusy
    } else {
        VoiceError::Device(description.to_string())
    }
}

fn classify_config_error(e: cpal::DefaultStreamConfigError) -> VoiceError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => VoiceError::NoDevice,
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => VoiceError::Unsupported,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend(&err.description),
    }
}

fn classify_build_error(e: cpal::BuildStreamError) -> VoiceError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => VoiceError::NoDevice,
        cpal::BuildStreamError::StreamConfigNotSupported => VoiceError::Unsupported,
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(&err.description),
        other => VoiceError::Device(other.to_string()),
    }
}

fn classify_play_error(e: cpal::PlayStreamError) -> VoiceError {
    match e {
        cpal::PlayStreamError::DeviceNotAvailable => VoiceError::DeviceBusy,
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend(&err.description),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    constraints: CaptureConstraints,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> VoiceResult<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let device_rate = config.sample_rate.0;
    let device_channels = config.channels;
    let mut captured_per_channel: u64 = 0;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data.iter().map(|&s| s.to_sample::<i16>()).collect();
                let timestamp_ms = captured_per_channel * 1000 / device_rate.max(1) as u64;
                captured_per_channel += (samples.len() / device_channels.max(1) as usize) as u64;

                let frame = process_frame(
                    AudioFrame {
                        samples,
                        sample_rate: device_rate,
                        channels: device_channels,
                        timestamp_ms,
                    },
                    constraints.sample_rate,
                    constraints.channels,
                );

                if frame_tx.try_send(frame).is_err() {
                    warn!("Microphone frame dropped");
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(classify_build_error)
}

fn open_default_input(
    constraints: CaptureConstraints,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> VoiceResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(VoiceError::NoDevice)?;
    let supported = device.default_input_config().map_err(classify_config_error)?;

    info!(
        "Using audio device: {} ({:?})",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        supported
    );

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, constraints, frame_tx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, constraints, frame_tx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, constraints, frame_tx)?,
        _ => return Err(VoiceError::Unsupported),
    };

    stream.play().map_err(classify_play_error)?;
    Ok(stream)
}

#[async_trait::async_trait]
impl CaptureDevice for MicrophoneCapture {
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.stop_tx.is_some() {
            return Err(VoiceError::DeviceBusy);
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let constraints = constraints.clone();

        let thread = thread::Builder::new()
            .name("lingualeap-mic".to_string())
            .spawn(move || match open_default_input(constraints, frame_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Hold the stream until close() or the adapter goes away
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| VoiceError::Device(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| VoiceError::Device("capture thread exited".to_string()))??;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        info!("Microphone permission granted");

        Ok(frame_rx)
    }

    async fn close(&mut self) -> VoiceResult<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    error!("Microphone thread panicked");
                }
            })
            .await
            .map_err(|e| VoiceError::Device(e.to_string()))?;
            info!("Microphone tracks stopped");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}
