//! Price timeline extraction and change analysis.
//!
//! Monetary mentions in agent speech are collected in order and
//! classified by surrounding keywords; the premium sequence then yields
//! net discount/upsell totals and an overall direction.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Speaker, TranscriptSegment};

static MONEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(\d{1,4})(?:[.,](\d{2}))?|\b(\d{1,4})(?:[.,](\d{2}))?\s*(?:dollars|bucks)\b").unwrap());

static MONEY_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(per month|a month|monthly|premium|fee|discount|cost|price|pay)\b").unwrap()
});

static BARE_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{2,4})(?:[.,](\d{2}))?\b").unwrap());

static ENROLL_FEE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(enrollment|enrol+ment|activation|sign ?up fee)\b").unwrap());

/// Classification of one monetary mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    Premium,
    EnrollFee,
    Discount,
    Upsell,
}

/// One monetary mention, in call order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PriceEvent {
    pub ms: i64,
    pub amount_cents: i64,
    pub kind: PriceKind,
}

/// Net movement of the quoted premium over the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    Up,
    Down,
    Mixed,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PriceChanges {
    pub price_change: bool,
    pub direction: PriceDirection,
    pub initial_premium_cents: Option<i64>,
    pub final_premium_cents: Option<i64>,
    pub discount_cents_total: Option<i64>,
    pub upsell_cents_total: Option<i64>,
    pub enroll_fee_mentioned: bool,
    pub price_events_count: usize,
}

impl Default for PriceChanges {
    fn default() -> Self {
        Self {
            price_change: false,
            direction: PriceDirection::None,
            initial_premium_cents: None,
            final_premium_cents: None,
            discount_cents_total: None,
            upsell_cents_total: None,
            enroll_fee_mentioned: false,
            price_events_count: 0,
        }
    }
}

fn classify(text: &str) -> PriceKind {
    if ENROLL_FEE_RE.is_match(text) {
        PriceKind::EnrollFee
    } else if text.contains("discount") || text.contains("waive") || text.contains("save") {
        PriceKind::Discount
    } else if text.contains("add on")
        || text.contains("add-on")
        || text.contains("upgrade")
        || text.contains("additional coverage")
    {
        PriceKind::Upsell
    } else {
        PriceKind::Premium
    }
}

fn first_amount_cents(text: &str) -> Option<i64> {
    if let Some(caps) = MONEY_RE.captures(text) {
        let dollars: i64 = caps
            .get(1)
            .or_else(|| caps.get(3))?
            .as_str()
            .parse()
            .ok()?;
        let cents: i64 = caps
            .get(2)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        return Some(dollars * 100 + cents);
    }

    // No $ sign or "dollars": accept a bare amount only when the segment
    // is clearly talking about money.
    if MONEY_CONTEXT_RE.is_match(text) {
        if let Some(caps) = BARE_AMOUNT_RE.captures(text) {
            let dollars: i64 = caps.get(1)?.as_str().parse().ok()?;
            let cents: i64 = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            return Some(dollars * 100 + cents);
        }
    }

    None
}

/// Build the ordered price timeline from agent speech.
pub fn extract_price_timeline(segments: &[TranscriptSegment]) -> Vec<PriceEvent> {
    let mut events: Vec<PriceEvent> = Vec::new();

    for seg in segments {
        if seg.speaker != Speaker::Agent {
            continue;
        }
        let text = seg.text.to_lowercase();
        if let Some(amount_cents) = first_amount_cents(&text) {
            events.push(PriceEvent {
                ms: seg.start_ms,
                amount_cents,
                kind: classify(&text),
            });
        }
    }

    events.sort_by_key(|e| e.ms);
    events
}

/// Derive net change totals and direction from the timeline.
pub fn detect_price_changes(timeline: &[PriceEvent]) -> PriceChanges {
    let premiums: Vec<i64> = timeline
        .iter()
        .filter(|e| e.kind == PriceKind::Premium)
        .map(|e| e.amount_cents)
        .collect();

    let standalone_discount: i64 = timeline
        .iter()
        .filter(|e| e.kind == PriceKind::Discount)
        .map(|e| e.amount_cents)
        .sum();

    let enroll_fee_mentioned = timeline.iter().any(|e| e.kind == PriceKind::EnrollFee);

    let mut direction = PriceDirection::None;
    let mut discount_total = 0i64;
    let mut upsell_total = 0i64;

    if premiums.len() >= 2 {
        let net = premiums[premiums.len() - 1] - premiums[0];
        let mut has_increase = false;
        let mut has_decrease = false;

        for pair in premiums.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0 {
                has_increase = true;
                upsell_total += delta;
            } else if delta < 0 {
                has_decrease = true;
                discount_total += -delta;
            }
        }

        if has_increase && has_decrease {
            direction = PriceDirection::Mixed;
        } else if net < 0 {
            direction = PriceDirection::Down;
            discount_total = -net;
        } else if net > 0 {
            direction = PriceDirection::Up;
            upsell_total = net;
        }
    } else if standalone_discount > 0 {
        direction = PriceDirection::Down;
        discount_total = standalone_discount;
    }

    PriceChanges {
        price_change: premiums.len() >= 2 && premiums[premiums.len() - 1] != premiums[0],
        direction,
        initial_premium_cents: premiums.first().copied(),
        final_premium_cents: premiums.last().copied(),
        discount_cents_total: (discount_total > 0).then_some(discount_total),
        upsell_cents_total: (upsell_total > 0).then_some(upsell_total),
        enroll_fee_mentioned,
        price_events_count: timeline.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(text: &str, start_ms: i64) -> TranscriptSegment {
        TranscriptSegment::new(Speaker::Agent, text, start_ms, start_ms + 2_000)
    }

    fn customer(text: &str, start_ms: i64) -> TranscriptSegment {
        TranscriptSegment::new(Speaker::Customer, text, start_ms, start_ms + 2_000)
    }

    #[test]
    fn test_timeline_extraction_and_classification() {
        let segments = vec![
            agent("the plan runs $89 per month", 10_000),
            agent("there is a one time enrollment fee of $25", 20_000),
            agent("I can apply a discount of $10 for you", 30_000),
            customer("that sounds like a lot of money, maybe $5", 35_000),
        ];
        let timeline = extract_price_timeline(&segments);
        assert_eq!(timeline.len(), 3); // customer speech excluded
        assert_eq!(timeline[0].kind, PriceKind::Premium);
        assert_eq!(timeline[0].amount_cents, 8_900);
        assert_eq!(timeline[1].kind, PriceKind::EnrollFee);
        assert_eq!(timeline[2].kind, PriceKind::Discount);
    }

    #[test]
    fn test_bare_number_needs_money_context() {
        let none = extract_price_timeline(&[agent("give me 30 seconds here", 0)]);
        assert!(none.is_empty());

        let some = extract_price_timeline(&[agent("that comes to 89 per month", 0)]);
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].amount_cents, 8_900);
    }

    #[test]
    fn test_price_drop_direction() {
        let segments = vec![
            agent("normally this is $120 per month", 10_000),
            agent("I can get you down to $90 per month today", 60_000),
        ];
        let changes = detect_price_changes(&extract_price_timeline(&segments));
        assert!(changes.price_change);
        assert_eq!(changes.direction, PriceDirection::Down);
        assert_eq!(changes.initial_premium_cents, Some(12_000));
        assert_eq!(changes.final_premium_cents, Some(9_000));
        assert_eq!(changes.discount_cents_total, Some(3_000));
        assert_eq!(changes.upsell_cents_total, None);
    }

    #[test]
    fn test_price_increase_direction() {
        let segments = vec![
            agent("it starts at $50 a month", 10_000),
            agent("with the full package it is $80 a month", 40_000),
        ];
        let changes = detect_price_changes(&extract_price_timeline(&segments));
        assert_eq!(changes.direction, PriceDirection::Up);
        assert_eq!(changes.upsell_cents_total, Some(3_000));
    }

    #[test]
    fn test_mixed_direction() {
        let segments = vec![
            agent("the base is $100 per month", 0),
            agent("with dental that is $130 per month", 10_000),
            agent("at the senior rate we land at $110 per month", 20_000),
        ];
        let changes = detect_price_changes(&extract_price_timeline(&segments));
        assert_eq!(changes.direction, PriceDirection::Mixed);
    }

    #[test]
    fn test_stable_price_no_change() {
        let segments = vec![
            agent("it is $75 per month", 0),
            agent("again, that is $75 per month total", 50_000),
        ];
        let changes = detect_price_changes(&extract_price_timeline(&segments));
        assert!(!changes.price_change);
        assert_eq!(changes.direction, PriceDirection::None);
    }

    #[test]
    fn test_no_prices() {
        let changes = detect_price_changes(&[]);
        assert_eq!(changes, PriceChanges::default());
    }
}
