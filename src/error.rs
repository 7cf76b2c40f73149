use thiserror::Error;

/// Failures surfaced by the voice-session core
///
/// Device errors carry remediation text for the user and are retryable by the
/// caller. `NetworkFailure` is produced by the provider transport but is
/// downgraded to the offline fallback inside the bridge; `Cancelled` is the
/// one bridge error that reaches callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no microphone found")]
    NoDevice,

    #[error("microphone is already in use")]
    DeviceBusy,

    #[error("audio capture is not supported on this platform")]
    Unsupported,

    #[error("failed to access microphone: {0}")]
    Device(String),

    #[error("no supported audio format found")]
    UnsupportedFormat,

    #[error("audio encoding failed: {0}")]
    Encode(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: &'static str, event: &'static str },
}

impl VoiceError {
    /// Classify a browser/platform capture error name
    pub fn from_platform_name(name: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => Self::NoDevice,
            "NotReadableError" | "TrackStartError" => Self::DeviceBusy,
            "NotSupportedError" => Self::Unsupported,
            other => Self::Device(other.to_string()),
        }
    }

    /// Whether this is a capture failure the user can fix and retry
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::NoDevice | Self::DeviceBusy | Self::Device(_)
        )
    }

    /// User-facing instructions for device errors
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied => Some(
                "Allow microphone access in your system or browser settings, then retry.",
            ),
            Self::NoDevice => Some("Connect a microphone and retry."),
            Self::DeviceBusy => {
                Some("Close other applications that are using the microphone, then retry.")
            }
            Self::Unsupported => Some("Use a platform with audio capture support."),
            Self::Device(_) => Some("Check your microphone connection and retry."),
            _ => None,
        }
    }
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;
