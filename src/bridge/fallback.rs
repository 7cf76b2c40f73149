// Offline placeholders
//
// Returned when no credential is configured or the provider call fails.
// Selection is deterministic in the inputs so demo sessions and tests are
// reproducible.

use super::messages::FeedbackAnalysis;

const SIMULATED_TRANSCRIPTS: &[&str] = &[
    "I think this is a really interesting topic to discuss.",
    "From my perspective, there are several important factors to consider.",
    "That's a great point. I'd like to add something to it.",
    "Could you elaborate on that a bit more?",
    "I've been thinking about this recently, and I believe it matters.",
];

const SIMULATED_REPLIES: &[&str] = &[
    "That's a fascinating perspective! What made you think about it that way?",
    "I completely understand. Can you give me an example of what you mean?",
    "That's really interesting. How do you think this affects your daily life?",
    "Great point! What other aspects of this topic would you like to explore?",
    "I appreciate you sharing that. What do you think would be the ideal solution?",
];

pub const NO_TRANSCRIPTION: &str = "No transcription available";

/// Placeholder transcript for an audio payload of `len` bytes
pub fn transcript(len: usize) -> String {
    SIMULATED_TRANSCRIPTS[len % SIMULATED_TRANSCRIPTS.len()].to_string()
}

/// Placeholder reply for a history of `history_len` messages
pub fn reply(history_len: usize) -> String {
    SIMULATED_REPLIES[history_len % SIMULATED_REPLIES.len()].to_string()
}

/// Placeholder analysis derived from the transcript text
pub fn analysis(transcript: &str) -> FeedbackAnalysis {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    let mut distinct: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    distinct.sort();
    distinct.dedup();
    let lines = transcript.lines().filter(|l| !l.trim().is_empty()).count();

    FeedbackAnalysis {
        fluency: 75.0 + (words.len() % 20) as f32,
        vocabulary: 70.0 + (distinct.len() % 25) as f32,
        tone: 78.0 + (lines % 18) as f32,
        fluency_comment: "You're speaking smoothly and naturally!".to_string(),
        vocabulary_comment: "Nice variety in your expressions!".to_string(),
        tone_comment: "Your conversational tone is warm and engaging!".to_string(),
        overall_notes: "Great job! You're making steady progress with each conversation."
            .to_string(),
    }
}
