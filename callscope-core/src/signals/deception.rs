//! Deceptive-offer detection.
//!
//! The heuristic is domain-specific and expected to evolve, so it lives
//! behind a trait. The default implementation flags "free" service
//! language that co-occurs with hidden recurring-cost language.

/// Pluggable deception detector over a flattened transcript.
pub trait DeceptionDetector: Send + Sync {
    fn name(&self) -> &str;

    /// True when the transcript shows a deceptive offer pattern.
    fn detect(&self, transcript: &str) -> bool;
}

/// "Free" offer markers.
const FREE_MARKERS: &[&str] = &[
    "free dental exam",
    "free cleanings",
    "complimentary x-rays",
    "no cost bite wing",
    "included at no charge",
    "absolutely free",
];

/// Hidden recurring-cost markers that contradict a "free" offer.
const HIDDEN_COST_MARKERS: &[&str] = &["membership", "enrollment", "monthly fee", "copay"];

/// Default phrase-list detector.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhraseListDetector;

impl DeceptionDetector for PhraseListDetector {
    fn name(&self) -> &str {
        "phrase_list.free_with_hidden_fees"
    }

    fn detect(&self, transcript: &str) -> bool {
        let text = transcript.to_lowercase();

        let free_hit = FREE_MARKERS.iter().any(|m| text.contains(m));
        if !free_hit {
            return false;
        }

        HIDDEN_COST_MARKERS.iter().any(|m| text.contains(m))
    }
}

/// Detector that never fires; for runs with deception tracking disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDetector;

impl DeceptionDetector for NoopDetector {
    fn name(&self) -> &str {
        "noop"
    }

    fn detect(&self, _transcript: &str) -> bool {
        false
    }
}
