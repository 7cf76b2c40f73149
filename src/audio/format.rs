use std::io::Cursor;

use serde::{Deserialize, Serialize};

use super::device::AudioFrame;
use crate::error::{VoiceError, VoiceResult};

/// Container/codec preference order used when none is configured
pub const DEFAULT_FORMAT_PREFERENCES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/mp4",
    "audio/wav",
];

/// MIME types this build can encode
pub const SUPPORTED_MIME_TYPES: &[&str] = &["audio/wav"];

/// Encoded audio with its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AudioBlob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Upload file name derived from the MIME type
    pub fn file_name(&self) -> &'static str {
        let mime = self.mime_type.as_str();
        if mime.contains("webm") {
            "audio.webm"
        } else if mime.contains("mp4") {
            "audio.mp4"
        } else if mime.contains("ogg") {
            "audio.ogg"
        } else if mime.contains("wav") {
            "audio.wav"
        } else if mime.contains("mpeg") {
            "audio.mp3"
        } else {
            "audio.webm"
        }
    }
}

/// Pick the first preferred MIME type that is supported
///
/// Matching ignores case; the supported spelling is returned so the
/// encoder always sees its canonical name.
pub fn negotiate_mime_type<S: AsRef<str>>(
    preferences: &[S],
    supported: &[&str],
) -> VoiceResult<String> {
    preferences
        .iter()
        .map(AsRef::as_ref)
        .find_map(|candidate| {
            supported
                .iter()
                .find(|s| s.eq_ignore_ascii_case(candidate))
        })
        .map(|s| s.to_string())
        .ok_or(VoiceError::UnsupportedFormat)
}

/// Encode frames into a blob of the given MIME type
pub fn encode_frames(mime_type: &str, frames: &[AudioFrame]) -> VoiceResult<AudioBlob> {
    match mime_type {
        "audio/wav" => encode_wav(frames).map(|data| AudioBlob::new(mime_type, data)),
        _ => Err(VoiceError::UnsupportedFormat),
    }
}

fn encode_wav(frames: &[AudioFrame]) -> VoiceResult<Vec<u8>> {
    let (sample_rate, channels) = frames
        .first()
        .map(|f| (f.sample_rate, f.channels))
        .unwrap_or((16000, 1));

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Encode(e.to_string()))?;

        for frame in frames {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| VoiceError::Encode(e.to_string()))?;
            }
        }

        writer
            .finalize()
            .map_err(|e| VoiceError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFile;

    #[test]
    fn negotiation_walks_preferences_in_order() {
        let picked = negotiate_mime_type(DEFAULT_FORMAT_PREFERENCES, SUPPORTED_MIME_TYPES).unwrap();
        assert_eq!(picked, "audio/wav");

        let picked = negotiate_mime_type(
            &["audio/ogg;codecs=opus", "audio/webm"],
            &["audio/webm", "audio/ogg;codecs=opus"],
        )
        .unwrap();
        assert_eq!(picked, "audio/ogg;codecs=opus");
    }

    #[test]
    fn negotiation_returns_supported_spelling() {
        let picked = negotiate_mime_type(&["Audio/WAV"], SUPPORTED_MIME_TYPES).unwrap();
        assert_eq!(picked, "audio/wav");

        let frames = [AudioFrame {
            samples: vec![0; 4],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }];
        assert!(encode_frames(&picked, &frames).is_ok());
    }

    #[test]
    fn negotiation_fails_without_overlap() {
        let err = negotiate_mime_type(&["audio/webm", "audio/mp4"], SUPPORTED_MIME_TYPES).unwrap_err();
        assert_eq!(err, VoiceError::UnsupportedFormat);
    }

    #[test]
    fn wav_encoding_keeps_samples_and_format() {
        let frames = vec![
            AudioFrame {
                samples: vec![1, 2, 3, 4],
                sample_rate: 16000,
                channels: 2,
                timestamp_ms: 0,
            },
            AudioFrame {
                samples: vec![5, 6],
                sample_rate: 16000,
                channels: 2,
                timestamp_ms: 100,
            },
        ];

        let blob = encode_frames("audio/wav", &frames).unwrap();
        assert_eq!(blob.file_name(), "audio.wav");

        let decoded = AudioFile::from_wav_bytes(&blob.data).unwrap();
        assert_eq!(decoded.samples, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 16000);
    }

    #[test]
    fn file_names_follow_mime_type() {
        assert_eq!(AudioBlob::new("audio/webm;codecs=opus", vec![]).file_name(), "audio.webm");
        assert_eq!(AudioBlob::new("audio/mp4", vec![]).file_name(), "audio.mp4");
        assert_eq!(AudioBlob::new("audio/ogg", vec![]).file_name(), "audio.ogg");
        assert_eq!(AudioBlob::new("application/x-unknown", vec![]).file_name(), "audio.webm");
    }
}
