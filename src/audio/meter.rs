// Audio level meter
//
// A frequency analyser over the latest captured samples, polled once per
// frame tick. The level mirrors a browser AnalyserNode reading:
// byte-scaled FFT magnitudes averaged and mapped onto 0-100.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::capture::CaptureStream;

/// FFT window size (128 frequency bins)
pub const FFT_SIZE: usize = 256;

/// Default polling cadence, roughly one display frame
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Convert byte frequency bins into a 0-100 level
///
/// `min(100, mean / 128 * 100)`; empty input reads as silence.
pub fn level_from_bins(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let mean = sum as f32 / bins.len() as f32;
    (mean / 128.0 * 100.0).clamp(0.0, 100.0)
}

/// Byte-scaled magnitude spectrum of the most recent samples
pub struct FrequencyAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
}

impl FrequencyAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Blackman window
        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            buffer: vec![Complex32::new(0.0, 0.0); FFT_SIZE],
        }
    }

    pub fn frequency_bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    /// Analyse the tail of an interleaved frame
    ///
    /// Channels are averaged to mono; short input is zero-padded at the front.
    pub fn byte_frequency_data(&mut self, samples: &[i16], channels: u16) -> Vec<u8> {
        let channels = channels.max(1) as usize;
        let mono: Vec<f32> = samples
            .chunks(channels)
            .map(|c| c.iter().map(|&s| s as f32).sum::<f32>() / c.len() as f32 / 32768.0)
            .collect();

        let tail = &mono[mono.len().saturating_sub(FFT_SIZE)..];
        let pad = FFT_SIZE - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let value = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex32::new(value * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.buffer[..self.frequency_bin_count()]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / FFT_SIZE as f32;
                let db = if magnitude > 0.0 {
                    20.0 * magnitude.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let scaled = 255.0 / range * (db - MIN_DECIBELS);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Level of a frame, 0-100
    pub fn level(&mut self, samples: &[i16], channels: u16) -> f32 {
        let bins = self.byte_frequency_data(samples, channels);
        level_from_bins(&bins)
    }
}

impl Default for FrequencyAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls the capture stream and reports levels through a callback
pub struct AudioLevelMeter {
    stream: Option<CaptureStream>,
    frame_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl AudioLevelMeter {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            stream: None,
            frame_interval,
            task: None,
        }
    }

    /// Attach the analyser to a capture stream
    pub fn attach(&mut self, stream: CaptureStream) {
        self.stream = Some(stream);
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_monitoring(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Single reading of the current level; 0 when not attached
    pub fn current_level(&self) -> f32 {
        match self.stream.as_ref().and_then(|s| s.latest_frame()) {
            Some(frame) => FrequencyAnalyser::new().level(&frame.samples, frame.channels),
            None => 0.0,
        }
    }

    /// Start polling; returns whether a polling loop is running afterwards
    ///
    /// Calling this while already monitoring keeps the existing loop.
    pub fn start_monitoring<F>(&mut self, mut callback: F) -> bool
    where
        F: FnMut(f32) + Send + 'static,
    {
        if self.is_monitoring() {
            debug!("Level monitoring already running");
            return true;
        }

        let Some(stream) = self.stream.clone() else {
            warn!("Level monitoring requested before an analyser was attached");
            return false;
        };

        let interval = self.frame_interval;
        self.task = Some(tokio::spawn(async move {
            let mut analyser = FrequencyAnalyser::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let level = match stream.latest_frame() {
                    Some(frame) => analyser.level(&frame.samples, frame.channels),
                    None => 0.0,
                };
                callback(level);
            }
        }));

        debug!("Level monitoring started ({:?} cadence)", interval);
        true
    }

    /// Cancel the pending tick
    pub fn stop_monitoring(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Level monitoring stopped");
        }
    }

    /// Stop monitoring and forget the stream
    pub fn detach(&mut self) {
        self.stop_monitoring();
        self.stream = None;
    }
}

impl Drop for AudioLevelMeter {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped_for_extreme_bins() {
        assert_eq!(level_from_bins(&[]), 0.0);
        assert_eq!(level_from_bins(&[0; 128]), 0.0);
        assert_eq!(level_from_bins(&[255; 128]), 100.0);
        assert_eq!(level_from_bins(&[128; 4]), 100.0);
        assert!((level_from_bins(&[64; 4]) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn level_stays_in_range_for_arbitrary_bins() {
        let mut seed: u32 = 0x2545_f491;
        for len in 1..200 {
            let bins: Vec<u8> = (0..len)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    (seed & 0xff) as u8
                })
                .collect();
            let level = level_from_bins(&bins);
            assert!((0.0..=100.0).contains(&level), "level {level} out of range");
        }
    }

    #[test]
    fn silence_reads_zero_and_tone_reads_positive() {
        let mut analyser = FrequencyAnalyser::new();
        assert_eq!(analyser.level(&[0; 512], 1), 0.0);

        let tone: Vec<i16> = (0..512)
            .map(|i| ((i as f32 * 0.3).sin() * 20000.0) as i16)
            .collect();
        let level = analyser.level(&tone, 1);
        assert!(level > 0.0 && level <= 100.0);
    }

    #[test]
    fn analyser_exposes_128_bins() {
        let mut analyser = FrequencyAnalyser::new();
        assert_eq!(analyser.frequency_bin_count(), 128);
        assert_eq!(analyser.byte_frequency_data(&[100; 10], 2).len(), 128);
    }

    #[tokio::test]
    async fn monitoring_requires_an_attached_stream() {
        let mut meter = AudioLevelMeter::new(DEFAULT_FRAME_INTERVAL);
        assert!(!meter.start_monitoring(|_| {}));
        assert!(!meter.is_monitoring());
        assert_eq!(meter.current_level(), 0.0);
    }
}
