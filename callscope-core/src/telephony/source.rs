//! The telephony seam the orchestrators depend on.
//!
//! [`TelephonySource`] keeps the discovery and compliance coordinators
//! testable without a live provider; [`TelephonyApi`] is the production
//! implementation over [`TelephonyClient`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::TtlCache;
use crate::config::TelephonyConfig;
use crate::crypto::TelephonyCredentials;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::types::{Agent, AgentDirectory, CallRecord};

use super::{agents, calls, recordings};
use super::calls::{DateWindow, SweepFilter};
use super::client::TelephonyClient;

/// Progress callback fed with the raw accumulated call count.
pub type FetchProgress<'a> = &'a (dyn Fn(usize) + Send + Sync);

/// Everything the pipeline needs from the telephony provider.
#[async_trait]
pub trait TelephonySource: Send + Sync {
    /// Discover active agents and build the run-scoped name/id directory.
    async fn discover_agents(&self) -> Result<(Vec<Agent>, AgentDirectory)>;

    /// Even-distribution fetch for a discovery run.
    async fn fetch_discovery_calls(
        &self,
        target: usize,
        agent_ids: &[String],
        on_progress: FetchProgress<'_>,
    ) -> Result<Vec<CallRecord>>;

    /// Single-sweep fetch of sales calls with recordings.
    async fn fetch_sales_calls(&self, window_days: i64) -> Result<Vec<CallRecord>>;

    /// Best-effort recording URL resolution; `None` means skip the call.
    async fn resolve_recording(&self, call: &CallRecord) -> Option<String>;
}

/// Lead-data cache TTL; one hour, same as the run ceiling.
const LEAD_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Production implementation over the provider HTTP API.
pub struct TelephonyApi {
    client: TelephonyClient,
    retry: RetryPolicy,
    min_duration_sec: i64,
    page_size: usize,
    max_pages: usize,
    /// Run-scoped recording lookups keyed by call id.
    recording_cache: Mutex<TtlCache<String, Option<String>>>,
}

impl TelephonyApi {
    pub fn new(credentials: &TelephonyCredentials, config: &TelephonyConfig) -> Result<Self> {
        Ok(Self {
            client: TelephonyClient::new(credentials, config)?,
            retry: RetryPolicy::telephony(config.max_retries),
            min_duration_sec: config.min_duration_sec,
            page_size: 10_000,
            max_pages: 20,
            recording_cache: Mutex::new(TtlCache::new(LEAD_CACHE_TTL)),
        })
    }

    /// Override sweep pagination limits (compliance config).
    pub fn with_sweep_limits(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }
}

#[async_trait]
impl TelephonySource for TelephonyApi {
    async fn discover_agents(&self) -> Result<(Vec<Agent>, AgentDirectory)> {
        agents::discover_agents(&self.client).await
    }

    async fn fetch_discovery_calls(
        &self,
        target: usize,
        agent_ids: &[String],
        on_progress: FetchProgress<'_>,
    ) -> Result<Vec<CallRecord>> {
        calls::fetch_even_distribution(
            &self.client,
            target,
            agent_ids,
            self.min_duration_sec,
            &self.retry,
            |count| on_progress(count),
        )
        .await
    }

    async fn fetch_sales_calls(&self, window_days: i64) -> Result<Vec<CallRecord>> {
        calls::fetch_single_sweep(
            &self.client,
            DateWindow::trailing(window_days),
            self.page_size,
            self.max_pages,
            self.min_duration_sec,
            SweepFilter {
                sales_only: true,
                require_recording: true,
            },
            &self.retry,
        )
        .await
    }

    async fn resolve_recording(&self, call: &CallRecord) -> Option<String> {
        if let Some(url) = &call.recording_url {
            return Some(url.clone());
        }

        if let Ok(cache) = self.recording_cache.lock() {
            if let Some(cached) = cache.get(&call.id) {
                return cached.clone();
            }
        }

        let resolved =
            recordings::resolve_recording_url(&self.client, &call.id, call.lead_id.as_deref())
                .await;

        if let Ok(mut cache) = self.recording_cache.lock() {
            cache.insert(call.id.clone(), resolved.clone());
        }

        resolved
    }
}
