//! Post-session feedback and progress tracking
//!
//! - `report`: turns the provider's analysis into the learner-facing report
//! - `progress`: improvement score, ELO rating and day streaks

pub mod progress;
pub mod report;

pub use progress::{
    advance_streak, apply_session, baseline_average, elo_delta, improvement_score, ProgressUpdate,
};
pub use report::{duration_minutes, transcript_text, words_spoken, FeedbackReport};
