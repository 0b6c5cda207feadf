//! Agent discovery over the performance-search endpoint.
//!
//! The endpoint's response shape is not guaranteed: depending on account
//! and API version it returns `{"success":true,"data":{...}}`, `{"data":
//! ...}`, a bare array, or a bare object keyed by agent id. All four are
//! normalized here through an explicit parser; anything else is a typed
//! error rather than a silent fallback.

use chrono::{Duration, Utc};

use crate::error::{Error, Result};
use crate::types::{Agent, AgentDirectory};

use super::client::TelephonyClient;

/// Synthetic user the dialer attributes abandoned/system calls to.
const SYSTEM_USER_NAME: &str = "System User";

/// Trailing window queried for agent activity, in days.
const DISCOVERY_WINDOW_DAYS: i64 = 30;

/// Discover active agents over the trailing 30-day window.
///
/// Returns the normalized agent list plus the name/id directory used by
/// later fetch and matching stages. Any non-2xx response is fatal for the
/// tenant's run.
pub async fn discover_agents(client: &TelephonyClient) -> Result<(Vec<Agent>, AgentDirectory)> {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(DISCOVERY_WINDOW_DAYS);
    let date_start = start.format("%Y-%m-%d").to_string();
    let date_end = end.format("%Y-%m-%d").to_string();

    tracing::info!(%date_start, %date_end, "Discovering agents");

    let body = client
        .get_json(
            "agent-performance/search",
            &[("date_start", &date_start), ("date_end", &date_end)],
        )
        .await?;

    let agents = parse_agent_response(&body)?;
    let directory = AgentDirectory::from_agents(&agents);

    tracing::info!(count = agents.len(), "Agents discovered");

    Ok((agents, directory))
}

/// Normalize the performance-search response into a uniform agent list.
pub fn parse_agent_response(body: &serde_json::Value) -> Result<Vec<Agent>> {
    let data = match body {
        serde_json::Value::Object(map) => {
            if let Some(data) = map.get("data") {
                // {"success": true, "data": ...} and {"data": ...} collapse
                // to the same inner value.
                data
            } else if map.contains_key("success") {
                return Err(Error::Telephony(
                    "agent response has success flag but no data".to_string(),
                ));
            } else {
                // Bare object keyed by agent id.
                body
            }
        }
        serde_json::Value::Array(_) => body,
        _ => {
            return Err(Error::Telephony(
                "unrecognized agent response shape".to_string(),
            ))
        }
    };

    let entries: Vec<&serde_json::Value> = match data {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(map) => map.values().collect(),
        _ => {
            return Err(Error::Telephony(
                "unrecognized agent response shape".to_string(),
            ))
        }
    };

    let mut agents = Vec::new();
    for entry in entries {
        if let Some(agent) = parse_agent_entry(entry) {
            agents.push(agent);
        }
    }

    Ok(agents)
}

/// Parse one agent entry; rows without an id and the system-user sentinel
/// are dropped. Zero-activity agents are kept.
fn parse_agent_entry(entry: &serde_json::Value) -> Option<Agent> {
    let id = entry
        .get("user_id")
        .or_else(|| entry.get("id"))
        .and_then(value_to_string)?;

    let name = entry
        .get("user_name")
        .or_else(|| entry.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_string();

    if name == SYSTEM_USER_NAME {
        return None;
    }

    let call_count = entry
        .get("human_answered")
        .or_else(|| entry.get("calls"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let avg_duration_sec = entry
        .get("avg_talk_time")
        .or_else(|| entry.get("avg_duration"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let campaigns = entry
        .get("campaigns")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Some(Agent {
        id,
        name,
        email: entry
            .get("email")
            .and_then(|v| v.as_str())
            .map(String::from),
        campaigns,
        call_count,
        avg_duration_sec,
    })
}

/// Ids arrive as strings or numbers depending on endpoint version.
fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: u64, name: &str, answered: i64) -> serde_json::Value {
        json!({ "user_id": id, "user_name": name, "human_answered": answered })
    }

    #[test]
    fn test_parse_success_data_object() {
        let body = json!({
            "success": true,
            "data": {
                "101": entry(101, "Dana Cruz", 42),
                "102": entry(102, "Lee Park", 0),
            }
        });
        let mut agents = parse_agent_response(&body).unwrap();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "Dana Cruz");
        assert_eq!(agents[0].call_count, 42);
        // Zero-activity agents are kept
        assert_eq!(agents[1].call_count, 0);
    }

    #[test]
    fn test_parse_data_array() {
        let body = json!({ "data": [entry(7, "Ana", 3)] });
        let agents = parse_agent_response(&body).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "7");
    }

    #[test]
    fn test_parse_bare_array() {
        let body = json!([entry(1, "A", 1), entry(2, "B", 2)]);
        let agents = parse_agent_response(&body).unwrap();
        assert_eq!(agents.len(), 2);
    }

    #[test]
    fn test_parse_bare_object() {
        let body = json!({
            "1": entry(1, "A", 1),
            "2": entry(2, "B", 2),
        });
        let agents = parse_agent_response(&body).unwrap();
        assert_eq!(agents.len(), 2);
    }

    #[test]
    fn test_system_user_filtered() {
        let body = json!({ "data": [
            entry(1, "Dana", 5),
            entry(999, "System User", 10_000),
        ]});
        let agents = parse_agent_response(&body).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "Dana");
    }

    #[test]
    fn test_entry_without_id_dropped() {
        let body = json!({ "data": [ { "user_name": "Ghost" } ] });
        let agents = parse_agent_response(&body).unwrap();
        assert!(agents.is_empty());
    }

    #[test]
    fn test_unrecognized_shape_is_error() {
        assert!(parse_agent_response(&json!("nope")).is_err());
        assert!(parse_agent_response(&json!(42)).is_err());
        assert!(parse_agent_response(&json!({"success": true})).is_err());
    }

    #[test]
    fn test_string_and_numeric_ids() {
        let body = json!({ "data": [
            { "id": "abc", "name": "A" },
            { "user_id": 55, "user_name": "B" },
        ]});
        let mut agents = parse_agent_response(&body).unwrap();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(agents[0].id, "55");
        assert_eq!(agents[1].id, "abc");
    }
}
