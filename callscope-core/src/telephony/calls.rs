//! Call-log fetching.
//!
//! Two strategies over the same paginated `log/retrieve` endpoint:
//!
//! - **Even distribution** (discovery): the trailing 30-day window is
//!   split into 6 equal date chunks and a per-agent-per-chunk budget is
//!   requested with a 3x over-fetch to survive the duration filter, then
//!   the accumulated pool is shuffled and truncated to the target.
//! - **Single sweep** (compliance): one paginated pass over the whole
//!   window, filtered to sales with recordings.
//!
//! Both apply the minimum-duration filter client-side (the API cannot),
//! deduplicate by call id, pace requests, and return partial results when
//! a later page fails. Neither treats "too few calls" as an error; the
//! caller decides insufficiency.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::types::CallRecord;

use super::client::TelephonyClient;

/// Date chunks the discovery window is split into.
const DISCOVERY_CHUNKS: i64 = 6;
/// Days covered by the discovery window.
const DISCOVERY_WINDOW_DAYS: i64 = 30;
/// Over-fetch multiplier compensating for the duration filter.
const OVER_FETCH: usize = 3;
/// Raw accumulation target as a multiple of the requested count.
const RAW_TARGET_FACTOR: f64 = 1.2;
/// Safety cap on cell requests per even-distribution run.
const MAX_CELLS: usize = 20;
/// Upper bound for the random sampling offset.
const MAX_RANDOM_OFFSET: usize = 50;

/// Inclusive date range rendered in the provider's datetime format.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Trailing window of `days` ending today.
    pub fn trailing(days: i64) -> Self {
        let end = Utc::now().date_naive();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn start_param(&self) -> String {
        format!("{} 00:00:00", self.start.format("%Y-%m-%d"))
    }

    pub fn end_param(&self) -> String {
        format!("{} 23:59:59", self.end.format("%Y-%m-%d"))
    }

    /// Split into `n` equal chunks (last chunk absorbs the remainder).
    pub fn split(&self, n: i64) -> Vec<DateWindow> {
        let total_days = (self.end - self.start).num_days().max(1);
        let chunk_days = (total_days / n).max(1);

        let mut chunks = Vec::new();
        let mut cursor = self.start;
        for i in 0..n {
            let chunk_end = if i == n - 1 {
                self.end
            } else {
                (cursor + Duration::days(chunk_days)).min(self.end)
            };
            chunks.push(DateWindow {
                start: cursor,
                end: chunk_end,
            });
            if chunk_end >= self.end {
                break;
            }
            cursor = chunk_end + Duration::days(1);
        }
        chunks
    }
}

/// Parse one `log/retrieve` result entry into a [`CallRecord`].
///
/// Tolerates the field variants seen in the wild: `call_length` as string
/// or number, `recording` as plain string or array of objects, and three
/// different disposition field names.
pub fn parse_call_entry(entry: &serde_json::Value) -> Option<CallRecord> {
    let recording_url = extract_recording_url(entry.get("recording"));

    let id = entry
        .get("id")
        .and_then(value_to_string)
        .or_else(|| recording_id(entry.get("recording")))?;

    let duration_sec = entry
        .get("call_length")
        .map(parse_duration)
        .unwrap_or(0);

    Some(CallRecord {
        id,
        lead_id: entry.get("lead_id").and_then(value_to_string),
        agent_id: entry.get("user_id").and_then(value_to_string),
        agent_name: entry
            .get("user")
            .or_else(|| entry.get("user_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        campaign: entry
            .get("campaign")
            .and_then(|v| v.as_str())
            .map(String::from),
        list_id: entry.get("list_id").and_then(value_to_string),
        phone_number: entry
            .get("phone_number")
            .and_then(|v| v.as_str())
            .map(String::from),
        disposition: entry
            .get("status_name")
            .or_else(|| entry.get("status"))
            .or_else(|| entry.get("disposition"))
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string(),
        call_date: entry
            .get("call_date")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        duration_sec,
        recording_url,
    })
}

fn parse_duration(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The `recording` field is a URL string or an array of recording objects.
fn extract_recording_url(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let first = items.first()?;
            first
                .get("public_url")
                .or_else(|| first.get("src"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        }
        _ => None,
    }
}

fn recording_id(value: Option<&serde_json::Value>) -> Option<String> {
    value?
        .as_array()?
        .first()?
        .get("recording_id")
        .and_then(value_to_string)
}

/// One page of call-log results.
async fn fetch_page(
    client: &TelephonyClient,
    window: &DateWindow,
    limit: usize,
    offset: usize,
    user_id: Option<&str>,
    retry: &RetryPolicy,
) -> Result<Vec<CallRecord>> {
    let limit_s = limit.to_string();
    let offset_s = offset.to_string();
    let start = window.start_param();
    let end = window.end_param();

    // Copy-capture the query pieces so each retry attempt can build a
    // fresh future without borrowing the closure environment.
    let (start, end): (&str, &str) = (&start, &end);
    let (limit_s, offset_s): (&str, &str) = (&limit_s, &offset_s);

    let body = retry
        .run(move || async move {
            let mut params: Vec<(&str, &str)> = vec![
                ("start_time", start),
                ("end_time", end),
                ("include_recordings", "1"),
                ("limit", limit_s),
                ("offset", offset_s),
            ];
            if let Some(user) = user_id {
                params.push(("user_id", user));
            }
            client.get_json("log/retrieve", &params).await
        })
        .await?;

    let results = body
        .get("data")
        .and_then(|d| d.get("results"))
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();

    Ok(results.iter().filter_map(parse_call_entry).collect())
}

/// Per-cell request budget for the even-distribution strategy.
///
/// `ceil(target / agents / chunks) * OVER_FETCH`, never zero.
pub fn per_cell_budget(target: usize, agent_count: usize) -> usize {
    let agents = agent_count.max(1);
    let per_cell = (target + agents * DISCOVERY_CHUNKS as usize - 1)
        / (agents * DISCOVERY_CHUNKS as usize);
    per_cell.max(1) * OVER_FETCH
}

/// Shuffle the accumulated pool and cut it down to the requested count.
pub fn sample_and_truncate<R: Rng>(mut calls: Vec<CallRecord>, target: usize, rng: &mut R) -> Vec<CallRecord> {
    calls.shuffle(rng);
    calls.truncate(target);
    calls
}

/// Even-distribution fetch for discovery runs.
///
/// Guarantees `duration_sec >= min_duration_sec` on every returned record
/// and at most `target` records; may return fewer when the provider has
/// insufficient data. `on_progress` receives the raw accumulated count.
pub async fn fetch_even_distribution<F>(
    client: &TelephonyClient,
    target: usize,
    agent_ids: &[String],
    min_duration_sec: i64,
    retry: &RetryPolicy,
    mut on_progress: F,
) -> Result<Vec<CallRecord>>
where
    F: FnMut(usize),
{
    let window = DateWindow::trailing(DISCOVERY_WINDOW_DAYS);
    let chunks = window.split(DISCOVERY_CHUNKS);
    let per_cell = per_cell_budget(target, agent_ids.len());
    let raw_target = ((target as f64) * RAW_TARGET_FACTOR).ceil() as usize;

    // When no agent partition was requested, each chunk is one cell.
    let agents: Vec<Option<&str>> = if agent_ids.is_empty() {
        vec![None]
    } else {
        agent_ids.iter().map(|id| Some(id.as_str())).collect()
    };

    tracing::info!(
        target,
        per_cell,
        agents = agents.len(),
        chunks = chunks.len(),
        "Fetching calls with even distribution"
    );

    // StdRng stays Send across the awaits below, unlike thread_rng
    let mut rng = StdRng::from_entropy();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pool: Vec<CallRecord> = Vec::new();
    let mut cells_done = 0usize;

    'outer: for chunk in &chunks {
        for agent in &agents {
            if cells_done >= MAX_CELLS || pool.len() >= raw_target {
                break 'outer;
            }
            cells_done += 1;

            let offset = rng.gen_range(0..MAX_RANDOM_OFFSET);
            match fetch_page(client, chunk, per_cell, offset, *agent, retry).await {
                Ok(page) => {
                    for call in page {
                        if accept_call(&call, min_duration_sec, SweepFilter::default())
                            && seen.insert(call.id.clone())
                        {
                            pool.push(call);
                        }
                    }
                    on_progress(pool.len());
                }
                Err(e) => {
                    // Partial-failure policy: keep what we have, move on.
                    tracing::warn!(
                        error = %e,
                        chunk_start = %chunk.start,
                        agent = agent.unwrap_or("all"),
                        "Cell fetch failed, continuing with partial data"
                    );
                }
            }

            client.pace().await;
        }
    }

    tracing::info!(
        raw = pool.len(),
        cells = cells_done,
        "Even-distribution fetch complete"
    );

    Ok(sample_and_truncate(pool, target, &mut rng))
}

/// Filters applied during a single-sweep fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepFilter {
    /// Keep only dispositions containing "SALE".
    pub sales_only: bool,
    /// Keep only calls with a resolved recording URL.
    pub require_recording: bool,
}

/// Acceptance predicate shared by both fetch strategies.
///
/// The duration floor is applied client-side because the API cannot
/// filter on call length server-side.
pub fn accept_call(call: &CallRecord, min_duration_sec: i64, filter: SweepFilter) -> bool {
    if call.duration_sec < min_duration_sec {
        return false;
    }
    if filter.sales_only && !call.is_sale() {
        return false;
    }
    if filter.require_recording && call.recording_url.is_none() {
        return false;
    }
    true
}

/// Single-sweep paginated fetch across a full window.
///
/// Continues while a page comes back full (more pages likely exist), up to
/// `max_pages`. A page failure after successful pages returns the partial
/// accumulation.
pub async fn fetch_single_sweep(
    client: &TelephonyClient,
    window: DateWindow,
    page_size: usize,
    max_pages: usize,
    min_duration_sec: i64,
    filter: SweepFilter,
    retry: &RetryPolicy,
) -> Result<Vec<CallRecord>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut calls: Vec<CallRecord> = Vec::new();
    let mut offset = 0usize;

    for page_index in 0..max_pages {
        let page = match fetch_page(client, &window, page_size, offset, None, retry).await {
            Ok(page) => page,
            Err(e) => {
                if calls.is_empty() {
                    return Err(e);
                }
                tracing::warn!(
                    error = %e,
                    fetched = calls.len(),
                    "Sweep page failed, returning partial results"
                );
                break;
            }
        };

        let returned = page.len();
        tracing::debug!(page = page_index + 1, returned, offset, "Sweep page fetched");

        for call in page {
            if accept_call(&call, min_duration_sec, filter) && seen.insert(call.id.clone()) {
                calls.push(call);
            }
        }

        // A short page means the provider ran out of data.
        if returned < page_size {
            break;
        }

        offset += page_size;
        client.pace().await;
    }

    tracing::info!(count = calls.len(), "Single-sweep fetch complete");
    Ok(calls)
}
