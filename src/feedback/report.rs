use serde::{Deserialize, Serialize};

use crate::bridge::FeedbackAnalysis;
use crate::session::{SpeakerKind, Turn};

/// Scores and notes shown to the learner when a session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub fluency: u8,
    pub vocabulary: u8,
    pub tone: u8,
    /// Estimated from fluency and tone; there is no dedicated assessment call
    pub pronunciation: u8,
    pub fluency_comment: String,
    pub vocabulary_comment: String,
    pub tone_comment: String,
    pub overall_notes: String,
    /// Percentage change against the learner's recent sessions
    pub improvement_score: i32,
    /// 0-10 scale
    pub overall_rating: f32,
    pub words_spoken: usize,
    pub duration_minutes: u32,
}

/// Billable minutes for a session: whole minutes, never below one
pub fn duration_minutes(elapsed_secs: u64) -> u32 {
    ((elapsed_secs / 60) as u32).max(1)
}

/// Words spoken by the learner (AI and partner turns excluded)
pub fn words_spoken(turns: &[Turn]) -> usize {
    turns
        .iter()
        .filter(|t| t.kind == SpeakerKind::User)
        .map(|t| t.text.split_whitespace().count())
        .sum()
}

/// `Speaker: text` lines in conversation order
pub fn transcript_text(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker, t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn score(value: f32) -> u8 {
    if value.is_finite() {
        value.clamp(0.0, 100.0).round() as u8
    } else {
        0
    }
}

impl FeedbackReport {
    pub fn from_analysis(
        analysis: FeedbackAnalysis,
        turns: &[Turn],
        elapsed_secs: u64,
        improvement_score: i32,
    ) -> Self {
        let fluency = score(analysis.fluency);
        let vocabulary = score(analysis.vocabulary);
        let tone = score(analysis.tone);
        let pronunciation = score((fluency as f32 + tone as f32) / 2.0);

        let minutes = duration_minutes(elapsed_secs);
        let words = words_spoken(turns);

        let overall_notes = if analysis.overall_notes.trim().is_empty() {
            format!(
                "You spoke {} words over {} minute{}. Keep practicing to build fluency.",
                words,
                minutes,
                if minutes == 1 { "" } else { "s" }
            )
        } else {
            analysis.overall_notes
        };

        let mut report = Self {
            fluency,
            vocabulary,
            tone,
            pronunciation,
            fluency_comment: analysis.fluency_comment,
            vocabulary_comment: analysis.vocabulary_comment,
            tone_comment: analysis.tone_comment,
            overall_notes,
            improvement_score,
            overall_rating: 0.0,
            words_spoken: words,
            duration_minutes: minutes,
        };
        report.overall_rating = report.average_score().round() / 10.0;
        report
    }

    /// Mean of all four scores
    pub fn average_score(&self) -> f32 {
        (self.fluency as f32 + self.vocabulary as f32 + self.tone as f32 + self.pronunciation as f32)
            / 4.0
    }

    /// Mean of the three analysed scores, used for rating changes
    pub fn rating_average(&self) -> f32 {
        (self.fluency as f32 + self.vocabulary as f32 + self.tone as f32) / 3.0
    }
}
