//! Discovery batch orchestrator.
//!
//! Drives one long-running discovery session through the state machine
//! `pulling -> transcribing -> analyzing -> complete`, with `error`
//! reachable from every state. The session row is the only state the
//! polling UI observes: progress maps 0-30 (fetch), 30-70 (transcribe),
//! 70-100 (analyze), and the row always reaches a terminal status even
//! when the run dies.
//!
//! Within a batch all network-bound work runs concurrently (bounded by
//! the batch size); batches themselves run strictly sequentially with a
//! short delay so external rate limits see bounded load. One call's
//! failure never aborts its batch.

pub mod metrics;

pub use metrics::{BatchOutcome, DiscoveryMetrics};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::analysis::{analyze_call, AnalysisResult};
use crate::config::DiscoveryConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::signals::DeceptionDetector;
use crate::telephony::TelephonySource;
use crate::transcribe::{TranscriptionEngine, TranscriptionOutcome};
use crate::types::{CallRecord, DiscoveryStatus, TranscriptSegment};

/// Source label used for the `(source, source_ref)` persistence key.
pub const CALL_SOURCE: &str = "convoso";

/// One transcribed call waiting for analysis.
struct TranscribedCall {
    call: CallRecord,
    segments: Vec<TranscriptSegment>,
}

/// One analyzed call ready to persist.
struct AnalyzedCall {
    call: CallRecord,
    analysis: AnalysisResult,
    lying: bool,
}

/// Orchestrates one discovery run end to end.
pub struct DiscoveryRunner {
    source: Arc<dyn TelephonySource>,
    transcriber: Arc<dyn TranscriptionEngine>,
    llm: Option<Arc<dyn LlmClient>>,
    deception: Arc<dyn DeceptionDetector>,
    config: DiscoveryConfig,
}

impl DiscoveryRunner {
    pub fn new(
        source: Arc<dyn TelephonySource>,
        transcriber: Arc<dyn TranscriptionEngine>,
        llm: Option<Arc<dyn LlmClient>>,
        deception: Arc<dyn DeceptionDetector>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            source,
            transcriber,
            llm,
            deception,
            config,
        }
    }

    /// Run a discovery session to a terminal state.
    ///
    /// On any error the session row is moved to `error` with the message
    /// before the error propagates, so the polling UI never hangs on a
    /// non-terminal status.
    pub async fn run(
        &self,
        db: &Database,
        session_id: &str,
        agency_id: &str,
        agent_ids: &[String],
    ) -> Result<DiscoveryMetrics> {
        match self.execute(db, session_id, agency_id, agent_ids).await {
            Ok(metrics) => Ok(metrics),
            Err(e) => {
                tracing::error!(session_id, error = %e, "Discovery run failed");
                if let Err(db_err) = db.fail_session(session_id, &e.to_string(), &[]) {
                    tracing::error!(session_id, error = %db_err, "Failed to mark session as errored");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        db: &Database,
        session_id: &str,
        agency_id: &str,
        agent_ids: &[String],
    ) -> Result<DiscoveryMetrics> {
        let target = self.config.call_count;

        tracing::info!(session_id, agency_id, target, "Starting discovery run");

        // ---- pulling: 0-30% ----
        db.update_session_progress(session_id, DiscoveryStatus::Pulling, 0, 0)?;

        let calls = self
            .source
            .fetch_discovery_calls(target, agent_ids, &|fetched| {
                let progress = ((fetched * 30) / target.max(1)).min(30) as i32;
                // Progress write failures must not kill the fetch
                if let Err(e) = db.update_session_progress(
                    session_id,
                    DiscoveryStatus::Pulling,
                    progress,
                    fetched as i64,
                ) {
                    tracing::warn!(session_id, error = %e, "Failed to write fetch progress");
                }
            })
            .await?;

        if calls.is_empty() {
            return Err(Error::Discovery(
                "No calls retrieved from telephony provider".to_string(),
            ));
        }

        db.update_session_total(session_id, calls.len() as i64)?;
        tracing::info!(session_id, count = calls.len(), "Calls fetched, transcribing");

        // ---- transcribing: 30-70% ----
        db.update_session_progress(session_id, DiscoveryStatus::Transcribing, 30, 0)?;
        let transcribed = self.transcribe_stage(db, session_id, calls.clone()).await?;

        if transcribed.len() < self.config.min_transcribed {
            return Err(Error::Discovery(format!(
                "Only {} calls transcribed successfully (minimum {})",
                transcribed.len(),
                self.config.min_transcribed
            )));
        }

        // ---- analyzing: 70-100% ----
        db.update_session_progress(
            session_id,
            DiscoveryStatus::Analyzing,
            70,
            transcribed.len() as i64,
        )?;
        let metrics = self
            .analyze_stage(db, session_id, agency_id, &calls, transcribed)
            .await?;

        Ok(metrics)
    }

    /// Resolve recordings and transcribe in bounded-concurrency batches.
    async fn transcribe_stage(
        &self,
        db: &Database,
        session_id: &str,
        calls: Vec<CallRecord>,
    ) -> Result<Vec<TranscribedCall>> {
        let batch_size = self.config.transcribe_batch_size.max(1);
        let total = calls.len();
        let total_batches = total.div_ceil(batch_size);

        let mut transcribed: Vec<TranscribedCall> = Vec::new();
        let mut skipped = 0usize;

        for (batch_index, batch) in calls.chunks(batch_size).enumerate() {
            let mut set: JoinSet<Option<TranscribedCall>> = JoinSet::new();

            for call in batch.iter().cloned() {
                let source = self.source.clone();
                let transcriber = self.transcriber.clone();

                set.spawn(async move {
                    let url = source.resolve_recording(&call).await?;

                    match transcriber.transcribe(&url).await {
                        Ok(TranscriptionOutcome::Transcribed(t)) => Some(TranscribedCall {
                            call,
                            segments: t.segments,
                        }),
                        Ok(TranscriptionOutcome::NoSpeech) => {
                            tracing::debug!(call_id = %call.id, "No speech detected");
                            None
                        }
                        Err(e) => {
                            tracing::warn!(call_id = %call.id, error = %e, "Transcription failed");
                            None
                        }
                    }
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Some(item)) => transcribed.push(item),
                    Ok(None) => skipped += 1,
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!(error = %e, "Transcription task panicked");
                    }
                }
            }

            let progress = 30 + (((batch_index + 1) * 40) / total_batches.max(1)) as i32;
            db.update_session_progress(
                session_id,
                DiscoveryStatus::Transcribing,
                progress.min(70),
                transcribed.len() as i64,
            )?;

            tracing::info!(
                session_id,
                batch = batch_index + 1,
                total_batches,
                transcribed = transcribed.len(),
                "Transcription batch complete"
            );

            if batch_index + 1 < total_batches {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        tracing::info!(
            session_id,
            transcribed = transcribed.len(),
            skipped,
            "Transcription stage complete"
        );

        Ok(transcribed)
    }

    /// Analyze transcribed calls in bounded-concurrency batches,
    /// accumulating metrics and persisting incrementally.
    async fn analyze_stage(
        &self,
        db: &Database,
        session_id: &str,
        agency_id: &str,
        all_calls: &[CallRecord],
        transcribed: Vec<TranscribedCall>,
    ) -> Result<DiscoveryMetrics> {
        let batch_size = self.config.analyze_batch_size.max(1);
        let total = transcribed.len();
        let total_batches = total.div_ceil(batch_size);

        let mut metrics = DiscoveryMetrics::default();
        let mut insights: Vec<String> = Vec::new();
        let mut processed: i64 = 0;

        let batches: Vec<Vec<TranscribedCall>> = {
            let mut out = Vec::new();
            let mut iter = transcribed.into_iter().peekable();
            while iter.peek().is_some() {
                out.push(iter.by_ref().take(batch_size).collect());
            }
            out
        };

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let batch_number = (batch_index + 1) as i64;
            let mut set: JoinSet<Option<AnalyzedCall>> = JoinSet::new();

            for item in batch {
                let llm = self.llm.clone();
                let deception = self.deception.clone();

                set.spawn(async move {
                    let analysis = match analyze_call(&item.segments, llm.as_deref()).await {
                        Ok(analysis) => analysis,
                        Err(e) => {
                            tracing::warn!(call_id = %item.call.id, error = %e, "Analysis failed");
                            return None;
                        }
                    };

                    let transcript_text = item
                        .segments
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    let lying = deception.detect(&transcript_text);

                    Some(AnalyzedCall {
                        call: item.call,
                        analysis,
                        lying,
                    })
                });
            }

            let mut batch_outcome = BatchOutcome::default();
            let mut analyzed: Vec<AnalyzedCall> = Vec::new();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Some(item)) => {
                        batch_outcome.record(&item.call, &item.analysis, item.lying);
                        analyzed.push(item);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Analysis task panicked");
                    }
                }
            }

            // Persist the batch before moving on
            for item in &analyzed {
                let call_id = db.upsert_call(agency_id, CALL_SOURCE, &item.call)?;
                db.set_call_analysis(call_id, &serde_json::to_value(&item.analysis)?)?;
            }

            let before = processed;
            processed += batch_outcome.calls;
            metrics.accumulate(&batch_outcome, batch_number);
            metrics::milestone_insights(before, processed, &metrics, &mut insights);

            let progress = 70 + (((batch_index + 1) * 30) / total_batches.max(1)) as i32;
            db.update_session_progress(
                session_id,
                DiscoveryStatus::Analyzing,
                progress.min(99),
                processed,
            )?;
            db.update_session_metrics(session_id, &metrics.to_json(), &insights)?;

            tracing::info!(
                session_id,
                batch = batch_number,
                total_batches,
                processed,
                "Analysis batch complete"
            );

            if batch_index + 1 != total_batches {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        metrics.finalize_hangup_rate(all_calls);
        metrics::final_insights(&metrics, &mut insights);

        db.complete_session(session_id, &metrics.to_json(), &insights, processed)?;

        tracing::info!(
            session_id,
            processed,
            close_rate = metrics.close_rate,
            "Discovery run complete"
        );

        Ok(metrics)
    }
}
