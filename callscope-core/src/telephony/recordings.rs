//! Best-effort recording URL resolution.
//!
//! Some log entries come back without a recording link even though one
//! exists; a second lookup against the leads endpoint usually finds it.
//! Every failure mode here resolves to `None` — a missing recording means
//! "skip this call", never a fatal condition.

use super::client::TelephonyClient;

/// Resolve a playable recording URL for a call, if one exists.
pub async fn resolve_recording_url(
    client: &TelephonyClient,
    call_id: &str,
    lead_id: Option<&str>,
) -> Option<String> {
    let lead = lead_id.unwrap_or_default();

    let body = match client
        .get_json(
            "leads/get-recordings",
            &[("call_id", call_id), ("lead_id", lead), ("limit", "1")],
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(call_id, error = %e, "Recording lookup failed");
            return None;
        }
    };

    let entry = body
        .get("data")
        .and_then(|d| d.get("entries"))
        .and_then(|e| e.as_array())
        .and_then(|items| items.first())?;

    entry
        .get("url")
        .or_else(|| entry.get("public_url"))
        .or_else(|| entry.get("src"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
