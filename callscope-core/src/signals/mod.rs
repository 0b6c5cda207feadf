//! Deterministic signal extraction.
//!
//! A single pass over the transcript producing everything rule-derivable:
//! talk metrics, holds, prices, payment, rebuttals, opening/control
//! scores, voicemail likelihood, and the outcome phrase hits that drive
//! reconciliation. Pure function of the segment list; identical input
//! always produces identical output.

pub mod deception;
pub mod opening;
pub mod payment;
pub mod price;
pub mod rebuttals;
pub mod score;
pub mod talk;
pub mod voicemail;

pub use deception::{DeceptionDetector, NoopDetector, PhraseListDetector};
pub use opening::OpeningScores;
pub use payment::PaymentSignal;
pub use price::{PriceChanges, PriceDirection, PriceEvent, PriceKind};
pub use rebuttals::{PhaseRebuttals, RebuttalReport};
pub use score::{RebuttalModifiers, SectionScores};
pub use talk::{HoldStats, TalkMetrics};

use crate::types::TranscriptSegment;

/// Phrases that confirm a charge went through on the call.
const SALE_CONFIRM_PHRASES: &[&str] = &[
    "you're all set",
    "you are all set",
    "payment went through",
    "payment has been processed",
    "card was charged",
    "card has been charged",
    "successfully processed",
    "congratulations, you're enrolled",
];

/// Phrases that schedule the charge for a later date.
const POST_DATE_PHRASES: &[&str] = &[
    "post date",
    "post-date",
    "postdate",
    "process it on",
    "run the card on",
    "charge it on",
    "we'll process the payment on",
    "when your check comes in",
];

/// Everything derived deterministically from one transcript.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Signals {
    pub talk: TalkMetrics,
    pub holds: HoldStats,
    pub price_timeline: Vec<PriceEvent>,
    pub price_changes: PriceChanges,
    pub payment: PaymentSignal,
    pub rebuttals: RebuttalReport,
    pub opening: OpeningScores,
    pub voicemail_like: bool,
    pub sale_confirm_phrase: bool,
    pub post_date_phrase: bool,
}

fn hit(joined: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| joined.contains(p))
}

/// Run the full deterministic pass.
pub fn extract_signals(segments: &[TranscriptSegment]) -> Signals {
    let joined = segments
        .iter()
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let price_timeline = price::extract_price_timeline(segments);
    let price_changes = price::detect_price_changes(&price_timeline);

    Signals {
        talk: talk::compute_talk_metrics(segments),
        holds: talk::compute_hold_stats(segments),
        price_timeline,
        price_changes,
        payment: payment::detect_payment(segments),
        rebuttals: rebuttals::detect_rebuttals(segments),
        opening: opening::score_opening(segments),
        voicemail_like: voicemail::is_voicemail_like(segments),
        sale_confirm_phrase: hit(&joined, SALE_CONFIRM_PHRASES),
        post_date_phrase: hit(&joined, POST_DATE_PHRASES),
    }
}
