//! Two-phase rebuttal detection.
//!
//! Customer objections are matched against known phrase families, split
//! into an opening phase (first 30 seconds) and a money/closing phase
//! (from the first pitch or price cue, defaulting to 25 seconds in). For
//! each objection the agent has a 30-second window to land a recognizable
//! rebuttal: at least two family response tokens in one utterance.

use crate::types::{Speaker, TranscriptSegment};

/// Customer objections in the first this-many ms belong to the opening phase.
const OPENING_WINDOW_MS: i64 = 30_000;
/// Window after an objection in which an agent response counts.
const RESPONSE_WINDOW_MS: i64 = 30_000;
/// Phase boundary fallback when no pitch cue is found.
const DEFAULT_PITCH_START_MS: i64 = 25_000;
/// Minimum family response tokens for a hit to count as a rebuttal.
const MIN_AGENT_TOKEN_HITS: usize = 2;

/// Agent cues that the pitch/close has started.
const PITCH_MARKERS: &[&str] = &[
    "per month",
    "a month",
    "monthly premium",
    "enrollment fee",
    "let me go over",
    "what you qualify for",
    "get you enrolled",
    "get you set up",
    "visa or mastercard",
];

/// Agent phrases asking for payment.
const CARD_ASK: &[&str] = &[
    "card",
    "visa",
    "mastercard",
    "debit",
    "payment",
    "routing",
    "tarjeta",
    "pago",
];

struct ObjectionFamily {
    key: &'static str,
    customer: &'static [&'static str],
    agent: &'static [&'static str],
}

const OPENING_FAMILIES: &[ObjectionFamily] = &[
    ObjectionFamily {
        key: "not_interested",
        customer: &["not interested", "no thanks", "don't want", "stop calling"],
        agent: &[
            "understand",
            "did you know",
            "cover",
            "quick question",
            "before you go",
            "qualify",
        ],
    },
    ObjectionFamily {
        key: "no_time",
        customer: &["busy", "bad time", "can't talk", "in the middle of"],
        agent: &["thirty seconds", "two minutes", "quick", "brief", "real fast"],
    },
    ObjectionFamily {
        key: "send_info",
        customer: &["send me", "mail me", "in writing", "email me"],
        agent: &["options change", "two minutes", "text", "summary", "lock in"],
    },
    ObjectionFamily {
        key: "legitimacy",
        customer: &["scam", "who is this", "how did you get", "is this real"],
        agent: &["licensed", "verify", "license", "legitimate", "company"],
    },
];

const MONEY_FAMILIES: &[ObjectionFamily] = &[
    ObjectionFamily {
        key: "pricing",
        customer: &["too expensive", "can't afford", "too much", "cheaper"],
        agent: &["discount", "afford", "first month", "waive", "per month", "budget"],
    },
    ObjectionFamily {
        key: "spouse_approval",
        customer: &["my wife", "my husband", "my spouse", "talk to my"],
        agent: &["include", "spouse", "together", "tonight", "secure your spot"],
    },
    ObjectionFamily {
        key: "bank_decline",
        customer: &["declined", "no money in", "payday", "insufficient"],
        agent: &["another card", "retry", "post date", "when funds", "different card"],
    },
    ObjectionFamily {
        key: "think_about_it",
        customer: &["think about it", "call you back", "need some time", "sleep on it"],
        agent: &["today only", "rates change", "lock in", "right now", "expire"],
    },
    ObjectionFamily {
        key: "already_covered",
        customer: &["already have", "already covered", "have insurance"],
        agent: &["compare", "current plan", "supplement", "in addition", "better rate"],
    },
];

/// One matched objection with the agent's response, if any.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RebuttalEvent {
    pub ms: i64,
    pub family: String,
    pub customer_quote: String,
    /// Present on used rebuttals; absent on missed ones.
    pub agent_quote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct RebuttalCounts {
    pub used: usize,
    pub missed: usize,
    pub asked_for_card_after_last_rebuttal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct PhaseRebuttals {
    pub used: Vec<RebuttalEvent>,
    pub missed: Vec<RebuttalEvent>,
    pub counts: RebuttalCounts,
}

/// Full two-phase rebuttal report.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct RebuttalReport {
    pub opening: PhaseRebuttals,
    pub closing: PhaseRebuttals,
    pub pitch_start_ms: i64,
}

impl RebuttalReport {
    pub fn total_missed(&self) -> usize {
        self.opening.counts.missed + self.closing.counts.missed
    }

    pub fn asked_for_card(&self) -> bool {
        self.opening.counts.asked_for_card_after_last_rebuttal
            || self.closing.counts.asked_for_card_after_last_rebuttal
    }
}

fn norm(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// First agent cue that the pitch started, or the default boundary.
fn pitch_start_ms(segments: &[TranscriptSegment]) -> i64 {
    segments
        .iter()
        .find(|s| {
            s.speaker == Speaker::Agent
                && (contains_any(&norm(&s.text), PITCH_MARKERS) || s.text.contains('$'))
        })
        .map(|s| s.start_ms)
        .unwrap_or(DEFAULT_PITCH_START_MS)
}

fn match_families(
    segments: &[TranscriptSegment],
    objection: &TranscriptSegment,
    families: &[ObjectionFamily],
    phase: &mut PhaseRebuttals,
) {
    let text = norm(&objection.text);

    for family in families {
        if !contains_any(&text, family.customer) {
            continue;
        }

        let window_end = objection.start_ms + RESPONSE_WINDOW_MS;
        let response = segments.iter().find(|a| {
            a.speaker == Speaker::Agent
                && a.start_ms > objection.start_ms
                && a.start_ms <= window_end
                && family
                    .agent
                    .iter()
                    .filter(|t| norm(&a.text).contains(*t))
                    .count()
                    >= MIN_AGENT_TOKEN_HITS
        });

        match response {
            Some(agent_seg) => phase.used.push(RebuttalEvent {
                ms: agent_seg.start_ms,
                family: family.key.to_string(),
                customer_quote: objection.text.clone(),
                agent_quote: Some(agent_seg.text.clone()),
            }),
            None => phase.missed.push(RebuttalEvent {
                ms: objection.start_ms,
                family: family.key.to_string(),
                customer_quote: objection.text.clone(),
                agent_quote: None,
            }),
        }

        // One family match per customer turn.
        break;
    }
}

fn finish_phase(segments: &[TranscriptSegment], phase: &mut PhaseRebuttals) {
    let last_used_ms = phase.used.iter().map(|r| r.ms).max();

    let asked_for_card = match last_used_ms {
        Some(ms) => segments.iter().any(|s| {
            s.speaker == Speaker::Agent
                && s.start_ms > ms
                && contains_any(&norm(&s.text), CARD_ASK)
        }),
        None => false,
    };

    phase.counts = RebuttalCounts {
        used: phase.used.len(),
        missed: phase.missed.len(),
        asked_for_card_after_last_rebuttal: asked_for_card,
    };
}

/// Detect objections and rebuttals across both call phases.
pub fn detect_rebuttals(segments: &[TranscriptSegment]) -> RebuttalReport {
    let pitch_start = pitch_start_ms(segments);

    let mut opening = PhaseRebuttals::default();
    let mut closing = PhaseRebuttals::default();

    for seg in segments {
        if seg.speaker != Speaker::Customer {
            continue;
        }

        if seg.start_ms <= OPENING_WINDOW_MS {
            match_families(segments, seg, OPENING_FAMILIES, &mut opening);
        } else if seg.start_ms >= pitch_start {
            match_families(segments, seg, MONEY_FAMILIES, &mut closing);
        }
    }

    finish_phase(segments, &mut opening);
    finish_phase(segments, &mut closing);

    RebuttalReport {
        opening,
        closing,
        pitch_start_ms: pitch_start,
    }
}
