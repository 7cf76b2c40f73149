use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{FeedbackRecord, Profile};

/// How many past sessions feed the improvement baseline
pub const BASELINE_WINDOW: usize = 3;

const ELO_MIN_GAIN: i32 = 5;
const ELO_MAX_GAIN: i32 = 30;

/// Rating gain for a session whose fluency/vocabulary/tone mean is `average`
///
/// Every completed session gains at least `ELO_MIN_GAIN` and at most
/// `ELO_MAX_GAIN` points; 75 is the neutral mark.
pub fn elo_delta(average: f32) -> i32 {
    if !average.is_finite() {
        return ELO_MIN_GAIN;
    }
    let raw = ((average - 75.0) / 2.0).floor() as i32 + 10;
    raw.clamp(ELO_MIN_GAIN, ELO_MAX_GAIN)
}

/// Mean score of the most recent sessions, if any
pub fn baseline_average(recent: &[FeedbackRecord]) -> Option<f32> {
    let window = &recent[..recent.len().min(BASELINE_WINDOW)];
    if window.is_empty() {
        return None;
    }
    Some(window.iter().map(FeedbackRecord::average_score).sum::<f32>() / window.len() as f32)
}

/// Percentage change against the baseline, clamped to [-100, 100]
pub fn improvement_score(current: f32, previous: Option<f32>) -> i32 {
    match previous {
        Some(prev) if prev != 0.0 && prev.is_finite() && current.is_finite() => {
            let change = (current - prev) / prev * 100.0;
            change.clamp(-100.0, 100.0).round() as i32
        }
        _ => 0,
    }
}

/// Before/after view of a profile update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub elo_before: i32,
    pub elo_after: i32,
    pub total_conversations: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Advance the day streak for a session held on `today`
///
/// Same day keeps the streak, the following day extends it, any gap
/// restarts it at 1.
pub fn advance_streak(profile: &mut Profile, today: NaiveDate) {
    profile.current_streak = match profile.last_conversation_date {
        Some(last) if last == today => profile.current_streak.max(1),
        Some(last) if last.succ_opt() == Some(today) => profile.current_streak + 1,
        _ => 1,
    };
    profile.longest_streak = profile.longest_streak.max(profile.current_streak);
    profile.last_conversation_date = Some(today);
}

/// Apply a finished session to the profile counters
pub fn apply_session(profile: &mut Profile, session_average: f32, today: NaiveDate) -> ProgressUpdate {
    let elo_before = profile.elo_rating;
    profile.elo_rating += elo_delta(session_average);
    profile.total_conversations += 1;
    advance_streak(profile, today);

    ProgressUpdate {
        elo_before,
        elo_after: profile.elo_rating,
        total_conversations: profile.total_conversations,
        current_streak: profile.current_streak,
        longest_streak: profile.longest_streak,
    }
}
