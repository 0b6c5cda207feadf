//! Transcription engine adapter.
//!
//! The speech-to-text engine is an external collaborator; this module
//! normalizes its output into ordered [`TranscriptSegment`]s and enforces
//! the overall per-call timeout. A result with zero segments is classified
//! as [`TranscriptionOutcome::NoSpeech`], which is a distinct condition
//! from a transport-level failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

use crate::config::TranscriptionConfig;
use crate::error::{Error, Result};
use crate::types::{Speaker, Transcript, TranscriptQuality, TranscriptSegment};

/// Outcome of one transcription attempt.
#[derive(Debug, Clone)]
pub enum TranscriptionOutcome {
    /// Speech was found and segmented.
    Transcribed(Transcript),
    /// The engine returned no segments at all.
    NoSpeech,
}

/// Speech-to-text engine boundary.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, recording_url: &str) -> Result<TranscriptionOutcome>;
}

/// HTTP-backed engine implementation.
pub struct HttpTranscriptionEngine {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTranscriptionEngine {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid transcription api_key: {}", e)))?,
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl TranscriptionEngine for HttpTranscriptionEngine {
    async fn transcribe(&self, recording_url: &str) -> Result<TranscriptionOutcome> {
        let request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "url": recording_url, "diarize": true }))
            .send();

        // The client timeout covers the request; this outer timeout also
        // bounds response body streaming.
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Transcription("engine timed out".to_string()))?
            .map_err(|e| Error::Transcription(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Transcription(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse response: {}", e)))?;

        parse_engine_response(&body)
    }
}

/// Normalize the engine's JSON into a transcript, classifying zero
/// segments as no-speech.
pub fn parse_engine_response(body: &serde_json::Value) -> Result<TranscriptionOutcome> {
    let raw_segments = body
        .get("segments")
        .and_then(|s| s.as_array())
        .ok_or_else(|| Error::Transcription("response missing segments array".to_string()))?;

    let mut segments: Vec<TranscriptSegment> = raw_segments
        .iter()
        .filter_map(parse_segment)
        .collect();

    if segments.is_empty() {
        return Ok(TranscriptionOutcome::NoSpeech);
    }

    segments.sort_by_key(|s| s.start_ms);

    let quality = body
        .get("quality")
        .and_then(|q| q.as_str())
        .map(TranscriptQuality::from_label)
        .unwrap_or(TranscriptQuality::Fair);

    Ok(TranscriptionOutcome::Transcribed(Transcript {
        segments,
        quality,
    }))
}

fn parse_segment(value: &serde_json::Value) -> Option<TranscriptSegment> {
    let text = value.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    // Speaker arrives as a label or a diarization channel index.
    let speaker = match value.get("speaker") {
        Some(serde_json::Value::String(s)) => s.parse::<Speaker>().ok()?,
        Some(serde_json::Value::Number(n)) => {
            if n.as_i64() == Some(0) {
                Speaker::Agent
            } else {
                Speaker::Customer
            }
        }
        _ => return None,
    };

    Some(TranscriptSegment {
        speaker,
        text: text.to_string(),
        start_ms: value.get("start_ms").and_then(|v| v.as_i64()).unwrap_or(0),
        end_ms: value.get("end_ms").and_then(|v| v.as_i64()).unwrap_or(0),
    })
}
