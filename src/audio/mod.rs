pub mod capture;
pub mod chunk;
pub mod convert;
pub mod device;
pub mod file;
pub mod format;
pub mod meter;
pub mod playback;
pub mod recorder;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use capture::{CaptureStream, MediaCapture};
pub use chunk::{AudioChunk, ChunkAccumulator, ChunkMetadata, STREAMING_CHUNK_MS};
pub use device::{
    create_capture_device, AudioFrame, CaptureConstraints, CaptureDevice, CaptureSource,
    SyntheticCapture, WavFileCapture,
};
pub use file::AudioFile;
pub use format::{
    encode_frames, negotiate_mime_type, AudioBlob, DEFAULT_FORMAT_PREFERENCES,
    SUPPORTED_MIME_TYPES,
};
pub use meter::{level_from_bins, AudioLevelMeter, FrequencyAnalyser, DEFAULT_FRAME_INTERVAL};
pub use playback::{AudioSink, FileSink, NullSink};
pub use recorder::{Recorder, RecordingMode};
