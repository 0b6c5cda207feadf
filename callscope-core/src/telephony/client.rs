//! HTTP client for the telephony provider API.
//!
//! Every endpoint takes `auth_token` as a query parameter and returns a
//! JSON envelope whose shape varies by endpoint (and sometimes by account
//! age); parsing is left to the per-endpoint modules.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use crate::config::TelephonyConfig;
use crate::crypto::TelephonyCredentials;
use crate::error::{Error, Result};

/// HTTP client bound to one tenant's credentials.
pub struct TelephonyClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    /// Fixed sleep between successive page/chunk requests.
    page_delay: Duration,
}

impl TelephonyClient {
    /// Create a client from resolved credentials and config.
    pub fn new(credentials: &TelephonyCredentials, config: &TelephonyConfig) -> Result<Self> {
        if credentials.auth_token.is_empty() {
            return Err(Error::Config(
                "telephony auth token is empty".to_string(),
            ));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| credentials.api_base_url.clone())
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            auth_token: credentials.auth_token.clone(),
            page_delay: Duration::from_millis(config.page_delay_ms),
        })
    }

    /// GET a provider endpoint and parse the JSON body.
    ///
    /// `auth_token` is appended automatically. Non-2xx responses become
    /// `Error::Telephony` with the status and body text.
    pub async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut query: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 1);
        query.push(("auth_token", self.auth_token.as_str()));
        query.extend_from_slice(params);

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Telephony(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Telephony(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Telephony(format!("failed to parse response: {}", e)))?;

        // Some endpoints return 200 with `success: false` and a message.
        if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let text = body
                .get("text")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("API returned failure");
            return Err(Error::Telephony(text.to_string()));
        }

        Ok(body)
    }

    /// Sleep the configured inter-request delay.
    pub async fn pace(&self) {
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
