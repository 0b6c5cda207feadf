//! Outcome reconciliation and final analysis assembly.
//!
//! One merge path, one precedence table. Deterministic signals always win
//! over LLM free text: the sale outcome, QA breakdown, rebuttals, payment
//! and price fields are sourced exclusively from the rule pass, even when
//! the LLM call fails partway. The LLM contributes only the fields no
//! rule can compute (summary, primary reason, sentiment, red flags).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{self, LlmClient};
use crate::signals::{
    self, extract_signals, OpeningScores, PaymentSignal, PriceChanges, RebuttalModifiers,
    RebuttalReport, SectionScores, Signals, TalkMetrics,
};
use crate::types::{SaleStatus, TranscriptSegment};

/// Canned primary reason for voicemail calls.
pub const REASON_VOICEMAIL: &str = "no_answer_voicemail";

/// Reconciled sale outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub sale_status: SaleStatus,
    pub payment_confirmed: bool,
}

/// Whether the LLM leg of the analysis produced usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// The persisted analysis blob for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub outcome: Outcome,
    pub qa_breakdown: SectionScores,
    pub rebuttals: RebuttalReport,
    pub payment: PaymentSignal,
    pub price_changes: PriceChanges,
    pub talk: TalkMetrics,
    pub opening: OpeningScores,
    pub reason_primary: String,
    pub summary: Option<String>,
    pub customer_name: Option<String>,
    pub sentiment_customer: Option<f64>,
    pub red_flags: Vec<String>,
    pub validation: ValidationStatus,
}

/// Fixed outcome precedence: an explicit post-date phrase beats an
/// explicit charge confirmation, which beats everything else.
pub fn decide_outcome(signals: &Signals) -> Outcome {
    if signals.post_date_phrase {
        return Outcome {
            sale_status: SaleStatus::PostDate,
            payment_confirmed: false,
        };
    }
    if signals.sale_confirm_phrase {
        return Outcome {
            sale_status: SaleStatus::Sale,
            payment_confirmed: true,
        };
    }
    Outcome {
        sale_status: SaleStatus::None,
        payment_confirmed: false,
    }
}

/// The canned zero-score analysis for voicemail calls.
pub fn voicemail_analysis() -> AnalysisResult {
    AnalysisResult {
        outcome: Outcome {
            sale_status: SaleStatus::None,
            payment_confirmed: false,
        },
        qa_breakdown: SectionScores::zeroed(),
        rebuttals: RebuttalReport::default(),
        payment: PaymentSignal::default(),
        price_changes: PriceChanges::default(),
        talk: TalkMetrics {
            talk_time_agent_sec: 0,
            talk_time_customer_sec: 0,
            silence_time_sec: 0,
            interrupt_count: 0,
            questions_first_minute: 0,
            talk_ratio_agent: 0.0,
        },
        opening: OpeningScores::default(),
        reason_primary: REASON_VOICEMAIL.to_string(),
        summary: None,
        customer_name: None,
        sentiment_customer: None,
        red_flags: Vec::new(),
        validation: ValidationStatus::Passed,
    }
}

/// Merge deterministic signals with (optional) validated LLM output.
pub fn merge_analysis(
    signals: &Signals,
    qa_breakdown: SectionScores,
    outcome: Outcome,
    llm_output: Option<&serde_json::Value>,
    llm_failed: bool,
) -> AnalysisResult {
    let (reason_primary, summary, customer_name, sentiment_customer, red_flags) = match llm_output {
        Some(value) => (
            value
                .get("reason_primary")
                .and_then(|v| v.as_str())
                .unwrap_or("other")
                .to_string(),
            value
                .get("summary")
                .and_then(|v| v.as_str())
                .map(String::from),
            value
                .get("customer_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            value.get("sentiment_customer").and_then(|v| v.as_f64()),
            value
                .get("red_flags")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|f| f.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
        ),
        None => ("other".to_string(), None, None, None, Vec::new()),
    };

    AnalysisResult {
        outcome,
        qa_breakdown,
        rebuttals: signals.rebuttals.clone(),
        payment: signals.payment.clone(),
        price_changes: signals.price_changes.clone(),
        talk: signals.talk.clone(),
        opening: signals.opening.clone(),
        reason_primary,
        summary,
        customer_name,
        sentiment_customer,
        red_flags,
        validation: if llm_failed {
            ValidationStatus::Failed
        } else {
            ValidationStatus::Passed
        },
    }
}

/// Full analysis of one transcribed call.
///
/// Voicemail short-circuits before any customer-derived metrics or the
/// LLM. When the LLM leg fails, the deterministic portion still ships
/// with `validation: failed` rather than being dropped.
pub async fn analyze_call(
    segments: &[TranscriptSegment],
    llm_client: Option<&dyn LlmClient>,
) -> Result<AnalysisResult> {
    if signals::voicemail::is_voicemail_like(segments) {
        return Ok(voicemail_analysis());
    }

    let signals = extract_signals(segments);
    let outcome = decide_outcome(&signals);
    let qa_breakdown = signals::score::score_sections(
        segments,
        RebuttalModifiers {
            missed: signals.rebuttals.total_missed(),
            asked_for_card: signals.rebuttals.asked_for_card(),
        },
        Some(outcome.sale_status),
    );

    match llm_client {
        None => Ok(merge_analysis(&signals, qa_breakdown, outcome, None, false)),
        Some(client) => {
            let user_prompt = llm::build_user_prompt(segments, &signals);
            match llm::run_analysis(client, llm::SYSTEM_PROMPT, &user_prompt).await {
                Ok(output) => Ok(merge_analysis(
                    &signals,
                    qa_breakdown,
                    outcome,
                    Some(&output),
                    false,
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "LLM analysis failed, keeping deterministic result");
                    Ok(merge_analysis(&signals, qa_breakdown, outcome, None, true))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Speaker;
    use async_trait::async_trait;

    struct MockLlm {
        response: std::result::Result<String, String>,
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            match &self.response {
                Ok(raw) => Ok(raw.clone()),
                Err(msg) => Err(Error::Llm(msg.clone())),
            }
        }
    }

    fn seg(speaker: Speaker, text: &str, start_ms: i64) -> TranscriptSegment {
        TranscriptSegment::new(speaker, text, start_ms, start_ms + 2_000)
    }

    fn live_call() -> Vec<TranscriptSegment> {
        vec![
            seg(Speaker::Agent, "Hi there, thanks for calling", 0),
            seg(Speaker::Customer, "I'm not interested", 4_000),
            seg(
                Speaker::Agent,
                "I understand, but did you know we also cover X?",
                6_000,
            ),
        ]
    }

    fn signals_with(post_date: bool, sale_confirm: bool) -> Signals {
        let mut signals = extract_signals(&live_call());
        signals.post_date_phrase = post_date;
        signals.sale_confirm_phrase = sale_confirm;
        signals
    }

    #[test]
    fn test_post_date_beats_sale_confirm() {
        let outcome = decide_outcome(&signals_with(true, true));
        assert_eq!(outcome.sale_status, SaleStatus::PostDate);
        assert!(!outcome.payment_confirmed);
    }

    #[test]
    fn test_sale_confirm_alone() {
        let outcome = decide_outcome(&signals_with(false, true));
        assert_eq!(outcome.sale_status, SaleStatus::Sale);
        assert!(outcome.payment_confirmed);
    }

    #[test]
    fn test_no_phrases_means_none() {
        let outcome = decide_outcome(&signals_with(false, false));
        assert_eq!(outcome.sale_status, SaleStatus::None);
    }

    #[tokio::test]
    async fn test_voicemail_short_circuit() {
        let segments = vec![
            seg(Speaker::Agent, "Hi, this is Dana with Acme", 0),
            seg(Speaker::Agent, "Call us back when you can", 5_000),
        ];
        // LLM client present but must not be needed
        let llm = MockLlm {
            response: Err("must not be called".to_string()),
        };
        let result = analyze_call(&segments, Some(&llm)).await.unwrap();
        assert_eq!(result.reason_primary, REASON_VOICEMAIL);
        assert_eq!(result.qa_breakdown.qa_score, 0);
        assert_eq!(result.talk.talk_time_agent_sec, 0);
        assert_eq!(result.validation, ValidationStatus::Passed);
    }

    #[tokio::test]
    async fn test_end_to_end_three_segment_example() {
        let result = analyze_call(&live_call(), None).await.unwrap();
        assert_eq!(result.rebuttals.opening.counts.used, 1);
        assert!(!result.payment.taken);
        assert_eq!(result.outcome.sale_status, SaleStatus::None);
    }

    #[tokio::test]
    async fn test_llm_failure_yields_partial_with_failed_validation() {
        let llm = MockLlm {
            response: Err("timed out".to_string()),
        };
        let result = analyze_call(&live_call(), Some(&llm)).await.unwrap();
        assert_eq!(result.validation, ValidationStatus::Failed);
        // Deterministic fields still present
        assert_eq!(result.rebuttals.opening.counts.used, 1);
        assert_eq!(result.reason_primary, "other");
    }

    #[tokio::test]
    async fn test_llm_fields_merged_but_never_deterministic_ones() {
        let llm = MockLlm {
            response: Ok(r#"{
                "reason_primary": "pricing",
                "summary": "Customer declined quickly.",
                "customer_name": "John",
                "sentiment_customer": 0.3,
                "red_flags": ["rushed pitch"],
                "qa_score": 99,
                "outcome": {"sale_status": "sale"}
            }"#
            .to_string()),
        };
        let result = analyze_call(&live_call(), Some(&llm)).await.unwrap();
        assert_eq!(result.reason_primary, "pricing");
        assert_eq!(result.summary.as_deref(), Some("Customer declined quickly."));
        assert_eq!(result.red_flags, vec!["rushed pitch".to_string()]);
        // The model claimed a sale and a 99 QA score; both are ignored
        assert_eq!(result.outcome.sale_status, SaleStatus::None);
        assert_ne!(result.qa_breakdown.qa_score, 99);
        assert_eq!(result.validation, ValidationStatus::Passed);
    }

    #[test]
    fn test_analysis_result_serializes() {
        let result = voicemail_analysis();
        let blob = serde_json::to_value(&result).unwrap();
        assert_eq!(
            blob.get("reason_primary").and_then(|v| v.as_str()),
            Some(REASON_VOICEMAIL)
        );
        assert_eq!(
            blob.get("outcome")
                .and_then(|o| o.get("sale_status"))
                .and_then(|v| v.as_str()),
            Some("none")
        );
    }
}
