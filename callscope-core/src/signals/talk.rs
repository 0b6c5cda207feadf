//! Talk-time metrics and hold detection.
//!
//! Pure functions over the ordered segment list. Gaps between segments
//! count as silence; a speaker switch with almost no gap counts as an
//! interruption; long gaps become holds, split into explicit (agent
//! announced) and dead-air varieties.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Speaker, TranscriptSegment};

/// Gap above this counts toward silence time.
const SILENCE_GAP_SEC: f64 = 0.15;
/// Customer-to-agent switch under this gap counts as an interruption.
const INTERRUPT_GAP_SEC: f64 = 0.2;
/// Announced hold must be at least this long.
const EXPLICIT_HOLD_MS: i64 = 10_000;
/// Unannounced gap at least this long is dead air.
const DEAD_AIR_MS: i64 = 20_000;

static QUESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(why|how|when|what|which|where|do you|are you|can you)\b").unwrap()
});

static HOLD_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(hold on|one moment|let me put you on hold|un momento|bear with me|just a sec|give me a moment)\b",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TalkMetrics {
    pub talk_time_agent_sec: i64,
    pub talk_time_customer_sec: i64,
    pub silence_time_sec: i64,
    pub interrupt_count: u32,
    pub questions_first_minute: u32,
    pub talk_ratio_agent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldKind {
    /// Agent announced the hold before the gap.
    Explicit,
    /// Unannounced dead air.
    Silence,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HoldEvent {
    pub start_ms: i64,
    pub end_ms: i64,
    pub kind: HoldKind,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct HoldStats {
    pub holds: Vec<HoldEvent>,
    pub hold_time_sec: i64,
    pub hold_events: u32,
    pub explicit_holds: u32,
    pub silence_holds: u32,
}

/// Compute per-speaker talk time, silence, interruptions and the
/// questions-in-first-minute discovery proxy.
pub fn compute_talk_metrics(segments: &[TranscriptSegment]) -> TalkMetrics {
    let mut agent_sec = 0.0f64;
    let mut customer_sec = 0.0f64;
    let mut silence_sec = 0.0f64;
    let mut interrupts = 0u32;
    let mut questions_first_minute = 0u32;

    for (i, seg) in segments.iter().enumerate() {
        let dur = seg.duration_ms() as f64 / 1000.0;
        match seg.speaker {
            Speaker::Agent => agent_sec += dur,
            Speaker::Customer => customer_sec += dur,
        }

        if i > 0 {
            let prev = &segments[i - 1];
            let gap = (seg.start_ms - prev.end_ms) as f64 / 1000.0;
            if gap > SILENCE_GAP_SEC {
                silence_sec += gap;
            }
            if prev.speaker == Speaker::Customer
                && seg.speaker == Speaker::Agent
                && gap < INTERRUPT_GAP_SEC
            {
                interrupts += 1;
            }
        }

        if seg.speaker == Speaker::Agent && seg.start_ms <= 60_000 {
            let t = seg.text.to_lowercase();
            if t.contains('?') || QUESTION_RE.is_match(&t) {
                questions_first_minute += 1;
            }
        }
    }

    let total_talk = agent_sec + customer_sec;
    let ratio = if total_talk > 0.0 {
        agent_sec / total_talk
    } else {
        0.0
    };

    TalkMetrics {
        talk_time_agent_sec: agent_sec.round() as i64,
        talk_time_customer_sec: customer_sec.round() as i64,
        silence_time_sec: silence_sec.round() as i64,
        interrupt_count: interrupts,
        questions_first_minute,
        talk_ratio_agent: (ratio * 100.0).round() / 100.0,
    }
}

/// Detect holds from inter-segment gaps.
pub fn compute_hold_stats(segments: &[TranscriptSegment]) -> HoldStats {
    let mut holds: Vec<HoldEvent> = Vec::new();

    for pair in segments.windows(2) {
        let prev = &pair[0];
        let cur = &pair[1];
        let gap = cur.start_ms - prev.end_ms;

        let agent_hold_cue =
            prev.speaker == Speaker::Agent && HOLD_CUE_RE.is_match(&prev.text.to_lowercase());

        if agent_hold_cue && gap >= EXPLICIT_HOLD_MS {
            holds.push(HoldEvent {
                start_ms: prev.end_ms,
                end_ms: cur.start_ms,
                kind: HoldKind::Explicit,
            });
        } else if gap >= DEAD_AIR_MS {
            holds.push(HoldEvent {
                start_ms: prev.end_ms,
                end_ms: cur.start_ms,
                kind: HoldKind::Silence,
            });
        }
    }

    let hold_time_sec = holds
        .iter()
        .map(|h| (h.end_ms - h.start_ms) as f64 / 1000.0)
        .sum::<f64>()
        .round() as i64;
    let explicit = holds.iter().filter(|h| h.kind == HoldKind::Explicit).count() as u32;
    let silence = holds.iter().filter(|h| h.kind == HoldKind::Silence).count() as u32;

    HoldStats {
        hold_events: holds.len() as u32,
        explicit_holds: explicit,
        silence_holds: silence,
        hold_time_sec,
        holds,
    }
}
