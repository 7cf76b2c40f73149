use serde::Serialize;

use super::turn::SessionMode;
use crate::error::{VoiceError, VoiceResult};

/// Turn-taking state of a session
///
/// `Speaking` names the AI turn being voiced, so there is no speaking state
/// without a pending reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Listening,
    Transcribing,
    Thinking,
    Speaking { turn_index: usize },
    Ended,
}

impl TurnState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Thinking => "thinking",
            Self::Speaking { .. } => "speaking",
            Self::Ended => "ended",
        }
    }

    /// A turn pipeline is past `listening`
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Transcribing | Self::Thinking | Self::Speaking { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    CaptureStarted,
    CaptureStopped,
    Transcribed,
    Replied { turn_index: usize },
    /// Opening line spoken before the learner's first turn
    Greeted { turn_index: usize },
    SynthesisSkipped,
    PlaybackFinished,
    Cancelled,
    End,
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaptureStarted => "capture_started",
            Self::CaptureStopped => "capture_stopped",
            Self::Transcribed => "transcribed",
            Self::Replied { .. } => "replied",
            Self::Greeted { .. } => "greeted",
            Self::SynthesisSkipped => "synthesis_skipped",
            Self::PlaybackFinished => "playback_finished",
            Self::Cancelled => "cancelled",
            Self::End => "end",
        }
    }
}

/// The single authoritative transition function
pub fn transition(state: TurnState, event: TurnEvent, mode: SessionMode) -> VoiceResult<TurnState> {
    use TurnEvent as E;
    use TurnState as S;

    let next = match (state, event, mode) {
        (S::Ended, E::End, _) => S::Ended,
        (S::Ended, _, _) => return Err(invalid(state, event)),
        (_, E::End, _) => S::Ended,

        (S::Idle, E::CaptureStarted, _) => S::Listening,
        (S::Listening, E::CaptureStopped, SessionMode::Solo) => S::Transcribing,
        (S::Listening, E::CaptureStopped, SessionMode::Partner) => S::Idle,
        (S::Transcribing, E::Transcribed, SessionMode::Solo) => S::Thinking,
        (S::Thinking, E::Replied { turn_index }, SessionMode::Solo) => S::Speaking { turn_index },
        (S::Idle, E::Greeted { turn_index }, SessionMode::Solo) => S::Speaking { turn_index },
        (S::Speaking { .. }, E::SynthesisSkipped | E::PlaybackFinished, _) => S::Idle,

        (S::Listening | S::Transcribing | S::Thinking | S::Speaking { .. }, E::Cancelled, _) => {
            S::Idle
        }

        _ => return Err(invalid(state, event)),
    };

    Ok(next)
}

fn invalid(state: TurnState, event: TurnEvent) -> VoiceError {
    VoiceError::InvalidTransition {
        from: state.name(),
        event: event.name(),
    }
}
