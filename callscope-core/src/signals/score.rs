//! Deterministic six-category QA scoring.
//!
//! Maps transcript evidence plus rebuttal results and the reconciled sale
//! outcome onto the fixed rubric: greeting, discovery, benefit
//! explanation, objection handling, compliance, closing. The weighted
//! combination is the call's `qa_score`. These always overwrite whatever
//! the LLM proposed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{SaleStatus, Speaker, TranscriptSegment};

static NAME_INTRO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"my name is|this is|i'm|i am").unwrap());
static COMPANY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"calling from|with|representing").unwrap());
static PURPOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"help|save|benefits?|coverage|plan").unwrap());
static QUESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\?|\b(what|when|where|who|why|how|do you|are you|have you|can you|could you|would you)\b|\b(tell me|let me know|share with me)\b").unwrap()
});
static BENEFIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"save|saving|discount|coverage|cover|protect|benefit|advantage|include|free|no cost|complimentary|value|worth|quality").unwrap()
});
static RECORDED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"recorded|recording|quality|training").unwrap());
static NOT_INSURANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"not insurance|supplement|in addition to|alongside").unwrap());
static MONTHLY_COST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"per month|monthly|a month|\$\d+").unwrap());
static ENROLL_FEE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"enrollment|activation|one.?time|sign.?up fee").unwrap());
static CARD_REQUEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"card|credit|debit|payment").unwrap());
static URGENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"today|now|limited|expire|special").unwrap());
static CONFIRM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"confirm|verify|process|charge").unwrap());

/// Inputs from rebuttal detection that modify the rubric.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuttalModifiers {
    pub missed: usize,
    pub asked_for_card: bool,
}

/// The fixed QA rubric, each category 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct SectionScores {
    pub greeting: u8,
    pub discovery: u8,
    pub benefit_explanation: u8,
    pub objection_handling: u8,
    pub compliance: u8,
    pub closing: u8,
    pub qa_score: u8,
}

impl SectionScores {
    /// All-zero scores used for voicemail and dead-air calls.
    pub fn zeroed() -> Self {
        Self::default()
    }
}

/// Score the six QA categories.
pub fn score_sections(
    segments: &[TranscriptSegment],
    rebuttals: RebuttalModifiers,
    sale_status: Option<SaleStatus>,
) -> SectionScores {
    if segments.is_empty() {
        return SectionScores::zeroed();
    }

    let transcript = segments
        .iter()
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let agent: Vec<&TranscriptSegment> = segments
        .iter()
        .filter(|s| s.speaker == Speaker::Agent)
        .collect();

    // GREETING: introduction, company, purpose in the first 30 seconds
    let greeting_text = agent
        .iter()
        .filter(|s| s.start_ms <= 30_000)
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut greeting = 0u32;
    if !greeting_text.is_empty() {
        if NAME_INTRO_RE.is_match(&greeting_text) {
            greeting += 40;
        }
        if COMPANY_RE.is_match(&greeting_text) {
            greeting += 30;
        }
        if PURPOSE_RE.is_match(&greeting_text) {
            greeting += 30;
        }
    }

    // DISCOVERY: question cadence in the first minute (3+ questions = 100)
    let discovery_text = agent
        .iter()
        .filter(|s| s.start_ms <= 60_000)
        .map(|s| s.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let question_count = QUESTION_RE.find_iter(&discovery_text).count();
    let discovery = (((question_count as f64 / 3.0) * 100.0).round() as u32).min(100);

    // BENEFITS: value-proposition mentions anywhere (5+ = 100)
    let benefit_mentions = BENEFIT_RE.find_iter(&transcript).count();
    let benefit_explanation = (((benefit_mentions as f64 / 5.0) * 100.0).round() as u32).min(100);

    // OBJECTIONS: missed rebuttals cap the score
    let mut objection_handling: u32 = match rebuttals.missed {
        0 => 100,
        1 => 70,
        2 => 40,
        _ => 20,
    };
    if rebuttals.asked_for_card && objection_handling < 100 {
        objection_handling = (objection_handling + 20).min(100);
    }

    // COMPLIANCE: four required disclosures, 25 points each
    let mut compliance = 0u32;
    if RECORDED_RE.is_match(&transcript) {
        compliance += 25;
    }
    if NOT_INSURANCE_RE.is_match(&transcript) {
        compliance += 25;
    }
    if MONTHLY_COST_RE.is_match(&transcript) {
        compliance += 25;
    }
    if ENROLL_FEE_RE.is_match(&transcript) {
        compliance += 25;
    }

    // CLOSING: outcome first, close-attempt quality otherwise
    let closing = match sale_status {
        Some(SaleStatus::Sale) => 100,
        Some(SaleStatus::PostDate) => 80,
        _ => {
            if CARD_REQUEST_RE.is_match(&transcript) {
                let mut score = 40u32;
                if URGENCY_RE.is_match(&transcript) {
                    score += 20;
                }
                if CONFIRM_RE.is_match(&transcript) {
                    score += 20;
                }
                score
            } else {
                0
            }
        }
    };

    let qa_score = (greeting as f64 * 0.15
        + discovery as f64 * 0.20
        + benefit_explanation as f64 * 0.20
        + objection_handling as f64 * 0.20
        + compliance as f64 * 0.15
        + closing as f64 * 0.10)
        .round() as u8;

    SectionScores {
        greeting: greeting.min(100) as u8,
        discovery: discovery as u8,
        benefit_explanation: benefit_explanation as u8,
        objection_handling: objection_handling as u8,
        compliance: compliance as u8,
        closing: closing as u8,
        qa_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(speaker: Speaker, text: &str, start_ms: i64) -> TranscriptSegment {
        TranscriptSegment::new(speaker, text, start_ms, start_ms + 3_000)
    }

    #[test]
    fn test_empty_is_zeroed() {
        let scores = score_sections(&[], RebuttalModifiers::default(), None);
        assert_eq!(scores, SectionScores::zeroed());
    }

    #[test]
    fn test_full_greeting() {
        let segments = vec![seg(
            Speaker::Agent,
            "Hi, my name is Dana calling from Acme to help with your coverage",
            0,
        )];
        let scores = score_sections(&segments, RebuttalModifiers::default(), None);
        assert_eq!(scores.greeting, 100);
    }

    #[test]
    fn test_objection_caps_by_missed_count() {
        let segments = vec![seg(Speaker::Agent, "hello", 0)];
        let none = score_sections(&segments, RebuttalModifiers { missed: 0, asked_for_card: false }, None);
        let one = score_sections(&segments, RebuttalModifiers { missed: 1, asked_for_card: false }, None);
        let two = score_sections(&segments, RebuttalModifiers { missed: 2, asked_for_card: false }, None);
        let many = score_sections(&segments, RebuttalModifiers { missed: 5, asked_for_card: false }, None);
        assert_eq!(none.objection_handling, 100);
        assert_eq!(one.objection_handling, 70);
        assert_eq!(two.objection_handling, 40);
        assert_eq!(many.objection_handling, 20);
    }

    #[test]
    fn test_card_ask_bonus() {
        let segments = vec![seg(Speaker::Agent, "hello", 0)];
        let scores = score_sections(
            &segments,
            RebuttalModifiers { missed: 1, asked_for_card: true },
            None,
        );
        assert_eq!(scores.objection_handling, 90);
    }

    #[test]
    fn test_closing_from_outcome() {
        let segments = vec![seg(Speaker::Agent, "thanks", 0)];
        let sale = score_sections(&segments, RebuttalModifiers::default(), Some(SaleStatus::Sale));
        let post = score_sections(
            &segments,
            RebuttalModifiers::default(),
            Some(SaleStatus::PostDate),
        );
        let none = score_sections(&segments, RebuttalModifiers::default(), Some(SaleStatus::None));
        assert_eq!(sale.closing, 100);
        assert_eq!(post.closing, 80);
        assert_eq!(none.closing, 0);
    }

    #[test]
    fn test_attempted_close_scores_partial() {
        let segments = vec![seg(
            Speaker::Agent,
            "can I get your card to process this today and confirm the charge",
            0,
        )];
        let scores = score_sections(&segments, RebuttalModifiers::default(), Some(SaleStatus::None));
        assert_eq!(scores.closing, 80);
    }

    #[test]
    fn test_compliance_disclosures() {
        let segments = vec![seg(
            Speaker::Agent,
            "this call is recorded; this is a supplement, not insurance; it's $50 per month with a one-time enrollment fee",
            0,
        )];
        let scores = score_sections(&segments, RebuttalModifiers::default(), None);
        assert_eq!(scores.compliance, 100);
    }

    #[test]
    fn test_qa_score_weighted() {
        let segments = vec![seg(
            Speaker::Agent,
            "Hi, my name is Dana calling from Acme to help with your coverage plan",
            0,
        )];
        let scores = score_sections(&segments, RebuttalModifiers { missed: 0, asked_for_card: false }, None);
        // greeting 100 * .15 + discovery (1 q-marker "do you"? none here) ...
        // exact value matters less than stability; recompute to assert
        let expected = (scores.greeting as f64 * 0.15
            + scores.discovery as f64 * 0.20
            + scores.benefit_explanation as f64 * 0.20
            + scores.objection_handling as f64 * 0.20
            + scores.compliance as f64 * 0.15
            + scores.closing as f64 * 0.10)
            .round() as u8;
        assert_eq!(scores.qa_score, expected);
    }

    #[test]
    fn test_determinism() {
        let segments = vec![
            seg(Speaker::Agent, "Hi, my name is Dana from Acme. Do you have coverage?", 0),
            seg(Speaker::Customer, "No I don't", 4_000),
        ];
        let mods = RebuttalModifiers { missed: 1, asked_for_card: false };
        assert_eq!(
            score_sections(&segments, mods, Some(SaleStatus::None)),
            score_sections(&segments, mods, Some(SaleStatus::None))
        );
    }
}
