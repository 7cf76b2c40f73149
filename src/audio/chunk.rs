use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::device::AudioFrame;
use super::format::{encode_frames, AudioBlob};
use crate::error::VoiceResult;

/// Chunk cadence for incremental upload
pub const STREAMING_CHUNK_MS: u64 = 1500;

/// Metadata for a single chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Chunk number (0-indexed)
    pub chunk_index: usize,
    /// Start time in milliseconds since capture started
    pub start_ms: u64,
    /// Timestamp of the last frame in the chunk
    pub end_ms: u64,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// One encoded chunk of a streaming recording
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub metadata: ChunkMetadata,
    pub blob: AudioBlob,
}

impl AudioChunk {
    /// Write the chunk next to its siblings as `{prefix}-chunk-NNN.wav`
    pub fn save_to(&self, dir: impl AsRef<Path>, prefix: &str) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create chunk directory")?;

        let path = dir.join(format!(
            "{}-chunk-{:03}.{}",
            prefix,
            self.metadata.chunk_index,
            self.blob.file_name().rsplit('.').next().unwrap_or("bin")
        ));
        fs::write(&path, &self.blob.data)
            .with_context(|| format!("Failed to write chunk: {:?}", path))?;

        Ok(path)
    }
}

/// Splits a frame sequence into fixed-duration chunks
///
/// Boundaries follow frame timestamps, so a chunk closes on the first frame
/// that lands `chunk_duration_ms` or more after the chunk's first frame.
pub struct ChunkAccumulator {
    chunk_duration_ms: u64,
    mime_type: String,
    frames: Vec<AudioFrame>,
    chunk_index: usize,
}

impl ChunkAccumulator {
    pub fn new(mime_type: impl Into<String>, chunk_duration_ms: u64) -> Self {
        Self {
            chunk_duration_ms: chunk_duration_ms.max(1),
            mime_type: mime_type.into(),
            frames: Vec::new(),
            chunk_index: 0,
        }
    }

    /// Add a frame; returns the chunk it completed, if any
    pub fn push(&mut self, frame: AudioFrame) -> VoiceResult<Option<AudioChunk>> {
        let completed = match self.frames.first() {
            Some(first) if frame.timestamp_ms.saturating_sub(first.timestamp_ms) >= self.chunk_duration_ms => {
                self.finish_chunk()?
            }
            _ => None,
        };

        self.frames.push(frame);
        Ok(completed)
    }

    /// Encode whatever is buffered as a final chunk
    pub fn flush(&mut self) -> VoiceResult<Option<AudioChunk>> {
        self.finish_chunk()
    }

    fn finish_chunk(&mut self) -> VoiceResult<Option<AudioChunk>> {
        if self.frames.is_empty() {
            return Ok(None);
        }

        let frames = std::mem::take(&mut self.frames);
        let first = &frames[0];
        let last = &frames[frames.len() - 1];

        let metadata = ChunkMetadata {
            chunk_index: self.chunk_index,
            start_ms: first.timestamp_ms,
            end_ms: last.timestamp_ms,
            sample_rate: first.sample_rate,
            channels: first.channels,
            sample_count: frames.iter().map(|f| f.samples.len()).sum(),
        };

        let blob = encode_frames(&self.mime_type, &frames)?;
        self.chunk_index += 1;

        debug!(
            "Chunk {} complete: {:.1}s - {:.1}s ({} samples)",
            metadata.chunk_index,
            metadata.start_ms as f64 / 1000.0,
            metadata.end_ms as f64 / 1000.0,
            metadata.sample_count
        );

        Ok(Some(AudioChunk { metadata, blob }))
    }
}
