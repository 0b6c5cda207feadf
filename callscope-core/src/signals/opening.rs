//! Opening and call-control scoring.
//!
//! Looks at the first 90 seconds: soft opening cues (rapport, purpose,
//! assume-the-sale language), agent speaking pace, silence ratio, and a
//! 0-1 control heuristic built from talk share and question cadence.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Speaker, TranscriptSegment};

/// Window examined for opening/control behavior.
const OPENING_WINDOW_MS: i64 = 90_000;
/// Window for pace and silence measurement.
const PACE_WINDOW_MS: i64 = 30_000;

static NAME_RAPPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(sir|ma'?am|mr\.|ms\.|mrs\.)\b|my name is|this is ").unwrap());
static PURPOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"help|get you set up|enroll|take care of this today|save you").unwrap());
static ASSUME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"today|right now|we'll get you set up|let's get started").unwrap());

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpeningScores {
    /// 0-100 score from the soft opening cues.
    pub opening_score: u8,
    /// 0-1 heuristic: did the agent keep the talking turn.
    pub control: f64,
    /// Agent words per minute over the first 30 seconds of agent speech.
    pub pace_wpm: f64,
    /// Fraction of the first 30 seconds without speech.
    pub silence_ratio: f64,
    pub feedback: Vec<String>,
}

impl Default for OpeningScores {
    fn default() -> Self {
        Self {
            opening_score: 0,
            control: 0.0,
            pace_wpm: 0.0,
            silence_ratio: 1.0,
            feedback: Vec::new(),
        }
    }
}

/// Score the opening window of the call.
pub fn score_opening(segments: &[TranscriptSegment]) -> OpeningScores {
    let window: Vec<&TranscriptSegment> = segments
        .iter()
        .filter(|s| s.start_ms <= OPENING_WINDOW_MS)
        .collect();

    if window.is_empty() {
        return OpeningScores::default();
    }

    let agent: Vec<&&TranscriptSegment> =
        window.iter().filter(|s| s.speaker == Speaker::Agent).collect();
    let customer_ms: i64 = window
        .iter()
        .filter(|s| s.speaker == Speaker::Customer)
        .map(|s| s.duration_ms())
        .sum();
    let agent_ms: i64 = agent.iter().map(|s| s.duration_ms()).sum();

    let agent_text = agent
        .iter()
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    // Soft cues for the opening
    let used_name = NAME_RAPPORT_RE.is_match(&agent_text);
    let purpose = PURPOSE_RE.is_match(&agent_text);
    let assume = ASSUME_RE.is_match(&agent_text);

    let checks = [used_name, purpose, assume].iter().filter(|b| **b).count();
    let opening_score = ((checks as f64 / 3.0) * 100.0).round() as u8;

    // Control: agent talk share in 0.55-0.70 and >2 questions/minute
    let share = agent_ms as f64 / (agent_ms + customer_ms).max(1) as f64;
    let questions = agent_text.matches('?').count();
    let window_ms = window
        .iter()
        .map(|s| s.end_ms)
        .max()
        .unwrap_or(1)
        .saturating_sub(window.iter().map(|s| s.start_ms).min().unwrap_or(0))
        .max(1);
    let qpm = questions as f64 / (window_ms as f64 / 60_000.0).max(1.0 / 60.0);

    let mut control_score = 70.0f64;
    if !(0.55..=0.70).contains(&share) {
        control_score -= 20.0;
    }
    if qpm < 2.0 {
        control_score -= 10.0;
    }
    let control = control_score.max(0.0).round() / 100.0;

    // Pace and silence over the first 30 seconds of the call
    let pace_window: Vec<&&TranscriptSegment> = window
        .iter()
        .filter(|s| s.start_ms <= PACE_WINDOW_MS)
        .collect();
    let pace_agent_words: usize = pace_window
        .iter()
        .filter(|s| s.speaker == Speaker::Agent)
        .map(|s| s.text.split_whitespace().count())
        .sum();
    let pace_agent_ms: i64 = pace_window
        .iter()
        .filter(|s| s.speaker == Speaker::Agent)
        .map(|s| s.duration_ms())
        .sum();
    let pace_wpm = if pace_agent_ms > 0 {
        (pace_agent_words as f64 / (pace_agent_ms as f64 / 60_000.0) * 10.0).round() / 10.0
    } else {
        0.0
    };

    let speech_ms: i64 = pace_window.iter().map(|s| s.duration_ms()).sum();
    let covered_ms = pace_window
        .iter()
        .map(|s| s.end_ms)
        .max()
        .unwrap_or(0)
        .min(PACE_WINDOW_MS)
        .max(1);
    let silence_ratio =
        (((covered_ms - speech_ms.min(covered_ms)) as f64 / covered_ms as f64) * 100.0).round()
            / 100.0;

    let mut feedback = Vec::new();
    if !used_name {
        feedback.push("opening: didn't use name/rapport".to_string());
    }
    if !purpose {
        feedback.push("opening: purpose/benefit unclear".to_string());
    }
    if !assume {
        feedback.push("opening: no assume-the-sale language".to_string());
    }
    if qpm < 2.0 {
        feedback.push("control: low discovery pace".to_string());
    }
    if share < 0.55 {
        feedback.push("control: caller dominated".to_string());
    }
    if share > 0.70 {
        feedback.push("control: agent monologue".to_string());
    }

    OpeningScores {
        opening_score,
        control,
        pace_wpm,
        silence_ratio,
        feedback,
    }
}
