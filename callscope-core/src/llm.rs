//! LLM analysis adapter.
//!
//! Sends the transcript plus extracted signals to a chat-completion
//! endpoint and parses the strict-JSON reply. Malformed output and
//! timeouts fail loudly here — the caller decides whether that becomes a
//! partial result or a hard error. Fields the rule pass already computed
//! are never trusted from the model; see the reconciliation module.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use crate::signals::Signals;
use crate::types::TranscriptSegment;

const MAX_TRANSCRIPT_CHARS: usize = 16_000;

pub const SYSTEM_PROMPT: &str = "You are a call-center QA analyst reviewing one sales call. Return strict JSON with keys: reason_primary (snake_case string), summary (string, <=60 words), customer_name (string or null), sentiment_customer (number 0.0-1.0), red_flags (array of strings). Use only evidence from the transcript. Return only JSON.";

/// Chat-completion interface for call analysis.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Create the default HTTP-backed analysis client.
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    Ok(Box::new(HttpLlmClient::new(config)?))
}

/// Run one analysis call and parse the structured reply.
///
/// Returns the parsed JSON object, or a loud `Error::Llm` on timeout or
/// malformed output.
pub async fn run_analysis(
    client: &dyn LlmClient,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<serde_json::Value> {
    let raw = client.complete(system_prompt, user_prompt).await?;
    parse_analysis_json(&raw)
}

/// Build the user prompt from transcript and signals.
pub fn build_user_prompt(segments: &[TranscriptSegment], signals: &Signals) -> String {
    let mut transcript = String::new();
    for seg in segments {
        let line = format!(
            "[{}] {}: {}\n",
            format_ms(seg.start_ms),
            seg.speaker.as_str(),
            seg.text.replace('\n', " ")
        );
        transcript.push_str(&line);
        if transcript.len() >= MAX_TRANSCRIPT_CHARS {
            transcript.truncate(MAX_TRANSCRIPT_CHARS);
            transcript.push_str("\n...[truncated]");
            break;
        }
    }

    let signals_json =
        serde_json::to_string(signals).unwrap_or_else(|_| "{}".to_string());

    format!(
        "Transcript:\n{}\n\nExtracted signals (deterministic, trust these over your own reading):\n{}\n\nReturn only JSON.",
        transcript, signals_json
    )
}

fn format_ms(ms: i64) -> String {
    let total = (ms / 1000).max(0);
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Parse a strict-JSON reply, tolerating fenced or embedded objects.
pub fn parse_analysis_json(raw: &str) -> Result<serde_json::Value> {
    let parsed = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value,
        Err(_) => {
            let extracted = extract_json_object(raw)?;
            serde_json::from_str::<serde_json::Value>(&extracted)?
        }
    };

    if !parsed.is_object() {
        return Err(Error::Llm(
            "analysis response must be a JSON object".to_string(),
        ));
    }

    Ok(parsed)
}

fn extract_json_object(raw: &str) -> Result<String> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Llm("analysis response did not contain JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Llm("analysis response did not contain JSON object".to_string()))?;
    if end <= start {
        return Err(Error::Llm(
            "analysis response JSON bounds are invalid".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}

/// HTTP-backed client for the supported chat providers.
pub struct HttpLlmClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            timeout,
            http,
        })
    }

    async fn post_and_read(
        &self,
        url: String,
        headers: HeaderMap,
        body: serde_json::Value,
        provider: &str,
    ) -> Result<(reqwest::StatusCode, String)> {
        let request = self.http.post(url).headers(headers).json(&body).send();

        let resp = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Llm(format!("{provider} request timed out")))?
            .map_err(|e| Error::Llm(format!("{provider} request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("{provider} read body failed: {e}")))?;
        Ok((status, body))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.provider {
            LlmProvider::Ollama => {
                let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
                let body = json!({
                    "model": self.model,
                    "prompt": format!("{system}\n\n{user}"),
                    "stream": false,
                });
                let (status, body) = self
                    .post_and_read(url, HeaderMap::new(), body, "ollama")
                    .await?;
                if !status.is_success() {
                    return Err(Error::Llm(format!(
                        "ollama returned {}: {}",
                        status.as_u16(),
                        body
                    )));
                }
                let json: serde_json::Value = serde_json::from_str(&body)?;
                json.get("response")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Llm("ollama response missing string field `response`".to_string())
                    })
            }
            LlmProvider::Claude => {
                let url = format!("{}/v1/messages", self.endpoint.trim_end_matches('/'));
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                        .map_err(|e| Error::Llm(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

                let body = json!({
                    "model": self.model,
                    "max_tokens": 800,
                    "temperature": 0,
                    "system": system,
                    "messages": [{ "role": "user", "content": user }],
                });
                let (status, body) = self.post_and_read(url, headers, body, "claude").await?;
                if !status.is_success() {
                    return Err(Error::Llm(format!(
                        "claude returned {}: {}",
                        status.as_u16(),
                        body
                    )));
                }
                let json: serde_json::Value = serde_json::from_str(&body)?;
                json.get("content")
                    .and_then(|v| v.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.get("text"))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Llm("claude response missing content[0].text".to_string())
                    })
            }
            LlmProvider::OpenAI => {
                let url = format!(
                    "{}/v1/chat/completions",
                    self.endpoint.trim_end_matches('/')
                );
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!(
                        "Bearer {}",
                        self.api_key.as_deref().unwrap_or_default()
                    ))
                    .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
                );

                let body = json!({
                    "model": self.model,
                    "temperature": 0,
                    "response_format": { "type": "json_object" },
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": user }
                    ]
                });
                let (status, body) = self.post_and_read(url, headers, body, "openai").await?;
                if !status.is_success() {
                    return Err(Error::Llm(format!(
                        "openai returned {}: {}",
                        status.as_u16(),
                        body
                    )));
                }
                let json: serde_json::Value = serde_json::from_str(&body)?;
                json.get("choices")
                    .and_then(|v| v.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.get("message"))
                    .and_then(|v| v.get("content"))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Llm("openai response missing choices[0].message.content".to_string())
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::extract_signals;
    use crate::types::{Speaker, TranscriptSegment};

    pub struct MockClient {
        pub response: String,
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_run_analysis_parses_json() {
        let client = MockClient {
            response: r#"{"reason_primary":"pricing","summary":"Customer balked at price.","customer_name":null,"sentiment_customer":0.4,"red_flags":[]}"#.to_string(),
        };
        let parsed = run_analysis(&client, SYSTEM_PROMPT, "transcript").await.unwrap();
        assert_eq!(
            parsed.get("reason_primary").and_then(|v| v.as_str()),
            Some("pricing")
        );
    }

    #[tokio::test]
    async fn test_run_analysis_rejects_non_object() {
        let client = MockClient {
            response: "\"just a string\"".to_string(),
        };
        assert!(run_analysis(&client, SYSTEM_PROMPT, "t").await.is_err());
    }

    #[test]
    fn test_parse_accepts_fenced_json() {
        let raw = "```json\n{\"reason_primary\":\"other\"}\n```";
        let parsed = parse_analysis_json(raw).unwrap();
        assert_eq!(
            parsed.get("reason_primary").and_then(|v| v.as_str()),
            Some("other")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_analysis_json("no json here at all").is_err());
        assert!(parse_analysis_json("} backwards {").is_err());
    }

    #[test]
    fn test_user_prompt_includes_transcript_and_signals() {
        let segments = vec![
            TranscriptSegment::new(Speaker::Agent, "Hello there", 0, 1_500),
            TranscriptSegment::new(Speaker::Customer, "Hi", 2_000, 2_500),
        ];
        let signals = extract_signals(&segments);
        let prompt = build_user_prompt(&segments, &signals);
        assert!(prompt.contains("[00:00] agent: Hello there"));
        assert!(prompt.contains("[00:02] customer: Hi"));
        assert!(prompt.contains("talk_time_agent_sec"));
    }

    #[test]
    fn test_user_prompt_truncates_long_transcripts() {
        let long_text = "word ".repeat(2_000);
        let segments: Vec<TranscriptSegment> = (0..10)
            .map(|i| {
                TranscriptSegment::new(Speaker::Agent, long_text.clone(), i * 10_000, i * 10_000 + 9_000)
            })
            .collect();
        let signals = extract_signals(&segments);
        let prompt = build_user_prompt(&segments, &signals);
        assert!(prompt.contains("...[truncated]"));
    }
}
