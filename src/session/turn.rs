use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bridge::ChatMessage;

/// Who a session is held with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Human partner; no AI turn follows the learner's
    Partner,
    /// AI voice agent
    #[default]
    Solo,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partner => f.write_str("partner"),
            Self::Solo => f.write_str("solo"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partner" => Ok(Self::Partner),
            "solo" | "ai" => Ok(Self::Solo),
            other => anyhow::bail!("unknown session mode: {other:?} (expected partner or solo)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerKind {
    User,
    Ai,
}

/// One utterance in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub kind: SpeakerKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            kind: SpeakerKind::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ai(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            kind: SpeakerKind::Ai,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        match self.kind {
            SpeakerKind::User => ChatMessage::user(&self.text),
            SpeakerKind::Ai => ChatMessage::assistant(&self.text),
        }
    }
}
