//! Aggregate discovery metrics and insight strings.
//!
//! Metrics accumulate across batches and are serialized (camelCase, the
//! shape the dashboard expects) into the session row after every batch.
//! Insight strings are human-readable summaries appended at fixed call
//! milestones; they inform, never block.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::types::{CallRecord, SaleStatus};

/// Calls at least this long count as a delivered pitch.
const PITCH_MIN_SEC: i64 = 30;
/// Calls at most this long count as early hangups.
const EARLY_HANGUP_MAX_SEC: i64 = 15;
/// Calls under this length count as hangups for the final rate.
const HANGUP_MAX_SEC: i64 = 30;

/// Running aggregates for one discovery session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMetrics {
    pub close_rate: f64,
    pub pitches_delivered: i64,
    pub successful_closes: i64,
    /// Running average, weighted by batch index.
    pub opening_score: i64,
    pub rebuttal_failures: i64,
    pub hangup_rate: f64,
    pub early_hangups: i64,
    pub lying_detected: i64,
    pub total_calls_processed: i64,
}

/// Per-batch deltas produced by the analyzing stage.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub pitches_delivered: i64,
    pub successful_closes: i64,
    pub rebuttal_failures: i64,
    pub early_hangups: i64,
    pub lying_detected: i64,
    pub opening_score_sum: i64,
    pub openings_scored: i64,
    pub calls: i64,
}

impl BatchOutcome {
    /// Fold one analyzed call into the batch.
    pub fn record(&mut self, call: &CallRecord, analysis: &AnalysisResult, lying: bool) {
        self.calls += 1;

        if call.duration_sec >= PITCH_MIN_SEC {
            self.pitches_delivered += 1;
        }
        if call.duration_sec <= EARLY_HANGUP_MAX_SEC {
            self.early_hangups += 1;
        }

        let closed = analysis.outcome.sale_status != SaleStatus::None || call.is_sale();
        if closed {
            self.successful_closes += 1;
        }

        self.rebuttal_failures += analysis.rebuttals.total_missed() as i64;

        if analysis.reason_primary != crate::analysis::REASON_VOICEMAIL {
            self.opening_score_sum += analysis.opening.opening_score as i64;
            self.openings_scored += 1;
        }

        if lying {
            self.lying_detected += 1;
        }
    }
}

impl DiscoveryMetrics {
    /// Accumulate a batch. `batch_number` is 1-based and weights the
    /// running opening-score average.
    pub fn accumulate(&mut self, batch: &BatchOutcome, batch_number: i64) {
        self.pitches_delivered += batch.pitches_delivered;
        self.successful_closes += batch.successful_closes;
        self.rebuttal_failures += batch.rebuttal_failures;
        self.early_hangups += batch.early_hangups;
        self.lying_detected += batch.lying_detected;
        self.total_calls_processed += batch.calls;

        if batch.openings_scored > 0 {
            let batch_avg =
                (batch.opening_score_sum as f64 / batch.openings_scored as f64).round() as i64;
            self.opening_score = if batch_number <= 1 {
                batch_avg
            } else {
                ((self.opening_score * (batch_number - 1) + batch_avg) as f64
                    / batch_number as f64)
                    .round() as i64
            };
        }

        if self.pitches_delivered > 0 {
            self.close_rate =
                (self.successful_closes as f64 / self.pitches_delivered as f64) * 100.0;
        }
    }

    /// Compute the final hangup rate once over the full call set.
    pub fn finalize_hangup_rate(&mut self, calls: &[CallRecord]) {
        if calls.is_empty() {
            return;
        }
        let hangups = calls
            .iter()
            .filter(|c| {
                let d = c.disposition.to_uppercase();
                d.contains("HUNG_UP") || d.contains("HANGUP") || c.duration_sec < HANGUP_MAX_SEC
            })
            .count();
        self.hangup_rate = (hangups as f64 / calls.len() as f64) * 100.0;
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

fn crossed(before: i64, after: i64, milestone: i64) -> bool {
    before < milestone && after >= milestone
}

/// Append milestone insights when the processed count crosses a boundary.
pub fn milestone_insights(
    before_processed: i64,
    after_processed: i64,
    metrics: &DiscoveryMetrics,
    insights: &mut Vec<String>,
) {
    if crossed(before_processed, after_processed, 50) {
        insights.push(format!(
            "Initial scan: {} pitches delivered",
            metrics.pitches_delivered
        ));
    }
    if crossed(before_processed, after_processed, 500) && metrics.early_hangups > 50 {
        insights.push(format!(
            "Alert: {} calls ended in first 15 seconds",
            metrics.early_hangups
        ));
    }
    if crossed(before_processed, after_processed, 1000) {
        insights.push(format!(
            "Halfway through: {:.1}% close rate so far",
            metrics.close_rate
        ));
    }
    if crossed(before_processed, after_processed, 2000) && metrics.lying_detected > 0 {
        insights.push(format!(
            "Deception patterns detected in {} calls",
            metrics.lying_detected
        ));
    }
}

/// Append the closing summary insights.
pub fn final_insights(metrics: &DiscoveryMetrics, insights: &mut Vec<String>) {
    insights.push(format!(
        "Analysis complete: {} calls processed",
        metrics.total_calls_processed
    ));
    insights.push(format!(
        "Overall closing rate: {:.1}%",
        metrics.close_rate
    ));
    insights.push(format!(
        "Average opening score: {}/100",
        metrics.opening_score
    ));

    if metrics.rebuttal_failures > 0 {
        insights.push(format!(
            "Agents gave up without rebuttals {} times",
            metrics.rebuttal_failures
        ));
    }
}
