//! Core domain types for callscope
//!
//! These types normalize data from the telephony provider and the
//! transcription engine into the canonical model the pipeline operates on.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Agency** | A tenant; owns telephony credentials and all persisted rows |
//! | **Agent** | A human call-center agent discovered from the telephony API |
//! | **CallRecord** | One provider call-log entry, normalized |
//! | **TranscriptSegment** | One speaker turn with millisecond timestamps |
//! | **DiscoverySession** | Mutable state row for one long-running discovery run |
//! | **ComplianceSyncLog** | Append-only audit row for one compliance sync attempt |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================
// Transcript
// ============================================

/// Which side of the call a transcript segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Customer,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Agent => "agent",
            Speaker::Customer => "customer",
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" | "Agent" => Ok(Speaker::Agent),
            "customer" | "Customer" => Ok(Speaker::Customer),
            _ => Err(format!("unknown speaker: {}", s)),
        }
    }
}

/// One speaker turn from the transcription engine.
///
/// Ordered by `start_ms`; immutable once produced. Every downstream
/// analysis step consumes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: Speaker,
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TranscriptSegment {
    pub fn new(speaker: Speaker, text: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            speaker,
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    /// Segment duration in milliseconds (zero when timestamps are inverted).
    pub fn duration_ms(&self) -> i64 {
        (self.end_ms - self.start_ms).max(0)
    }
}

/// A full transcript with the engine's quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub quality: TranscriptQuality,
}

/// Transcription engine quality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptQuality {
    Good,
    Fair,
    Poor,
}

impl TranscriptQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptQuality::Good => "good",
            TranscriptQuality::Fair => "fair",
            TranscriptQuality::Poor => "poor",
        }
    }

    /// Parse the engine's label, defaulting to `Fair` for unknown values.
    pub fn from_label(value: &str) -> Self {
        match value {
            "good" | "high" => TranscriptQuality::Good,
            "poor" | "low" => TranscriptQuality::Poor,
            _ => TranscriptQuality::Fair,
        }
    }
}

// ============================================
// Agents
// ============================================

/// A call-center agent discovered from the telephony API.
///
/// Not persisted as a first-class entity; held in memory for the duration
/// of one discovery/sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub campaigns: Vec<String>,
    /// Human-answered calls over the trailing discovery window.
    pub call_count: i64,
    pub avg_duration_sec: f64,
}

/// Bidirectional name/id maps for one run.
///
/// Owned exclusively by a single discovery or sync invocation; never
/// shared across concurrent runs for different tenants.
#[derive(Debug, Default, Clone)]
pub struct AgentDirectory {
    by_id: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl AgentDirectory {
    pub fn from_agents(agents: &[Agent]) -> Self {
        let mut dir = Self::default();
        for agent in agents {
            dir.insert(&agent.id, &agent.name);
        }
        dir
    }

    pub fn insert(&mut self, id: &str, name: &str) {
        self.by_id.insert(id.to_string(), name.to_string());
        self.by_name.insert(name.to_string(), id.to_string());
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ============================================
// Call records
// ============================================

/// One provider call-log entry, normalized from the raw response.
///
/// Fetched fresh per run; persisted only through the `calls` table keyed
/// by `(source, source_ref)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub lead_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: String,
    pub campaign: Option<String>,
    pub list_id: Option<String>,
    pub phone_number: Option<String>,
    pub disposition: String,
    /// Provider-shaped call date, e.g. "2026-08-01 14:03:22".
    pub call_date: String,
    pub duration_sec: i64,
    pub recording_url: Option<String>,
}

impl CallRecord {
    /// True when the disposition indicates a sale of any flavor.
    pub fn is_sale(&self) -> bool {
        self.disposition.to_uppercase().contains("SALE")
    }
}

// ============================================
// Discovery sessions
// ============================================

/// Discovery run state machine status.
///
/// `Complete` and `Error` are terminal; the polling reader must always
/// observe one of the two eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Pulling,
    Transcribing,
    Analyzing,
    Complete,
    Error,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Pulling => "pulling",
            DiscoveryStatus::Transcribing => "transcribing",
            DiscoveryStatus::Analyzing => "analyzing",
            DiscoveryStatus::Complete => "complete",
            DiscoveryStatus::Error => "error",
        }
    }

    /// Parse status string from storage.
    pub fn from_storage(value: &str) -> Self {
        match value {
            "pulling" => DiscoveryStatus::Pulling,
            "transcribing" => DiscoveryStatus::Transcribing,
            "analyzing" => DiscoveryStatus::Analyzing,
            "complete" => DiscoveryStatus::Complete,
            _ => DiscoveryStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DiscoveryStatus::Complete | DiscoveryStatus::Error)
    }
}

/// One long-running discovery run, polled by the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub id: String,
    pub agency_id: String,
    pub status: DiscoveryStatus,
    /// 0-100; never decreases on the success path.
    pub progress: i32,
    pub processed: i64,
    pub total_calls: i64,
    pub metrics: serde_json::Value,
    pub insights: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DiscoverySession {
    pub fn new(agency_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agency_id: agency_id.to_string(),
            status: DiscoveryStatus::Pulling,
            progress: 0,
            processed: 0,
            total_calls: 0,
            metrics: serde_json::json!({}),
            insights: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ============================================
// Sale outcome
// ============================================

/// Final sale status produced by outcome reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Sale,
    PostDate,
    None,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Sale => "sale",
            SaleStatus::PostDate => "post_date",
            SaleStatus::None => "none",
        }
    }
}

// ============================================
// Compliance sync
// ============================================

/// Which phase of the compliance workflow a sync log row covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceSyncType {
    AgentDiscovery,
    SalesFetch,
}

impl ComplianceSyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceSyncType::AgentDiscovery => "agent_discovery",
            ComplianceSyncType::SalesFetch => "sales_fetch",
        }
    }
}

/// Outcome label for a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Append-only audit row, one per compliance sync attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSyncLog {
    pub agency_id: String,
    pub sync_type: ComplianceSyncType,
    pub calls_fetched: i64,
    pub sales_found: i64,
    pub segments_created: i64,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub api_response: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_roundtrip() {
        assert_eq!(Speaker::Agent.as_str(), "agent");
        assert_eq!("customer".parse::<Speaker>().unwrap(), Speaker::Customer);
        assert!("robot".parse::<Speaker>().is_err());
    }

    #[test]
    fn test_discovery_status_terminal() {
        assert!(DiscoveryStatus::Complete.is_terminal());
        assert!(DiscoveryStatus::Error.is_terminal());
        assert!(!DiscoveryStatus::Pulling.is_terminal());
        assert!(!DiscoveryStatus::Transcribing.is_terminal());
        assert!(!DiscoveryStatus::Analyzing.is_terminal());
    }

    #[test]
    fn test_discovery_status_storage() {
        assert_eq!(
            DiscoveryStatus::from_storage("transcribing"),
            DiscoveryStatus::Transcribing
        );
        // Unknown values come back as Error so the reader never hangs
        assert_eq!(
            DiscoveryStatus::from_storage("garbage"),
            DiscoveryStatus::Error
        );
    }

    #[test]
    fn test_agent_directory_maps() {
        let agents = vec![
            Agent {
                id: "101".to_string(),
                name: "Dana Cruz".to_string(),
                email: None,
                campaigns: vec![],
                call_count: 12,
                avg_duration_sec: 84.0,
            },
            Agent {
                id: "102".to_string(),
                name: "Lee Park".to_string(),
                email: None,
                campaigns: vec![],
                call_count: 0,
                avg_duration_sec: 0.0,
            },
        ];
        let dir = AgentDirectory::from_agents(&agents);
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.name_for("101"), Some("Dana Cruz"));
        assert_eq!(dir.id_for("Lee Park"), Some("102"));
        assert!(dir.contains_name("Dana Cruz"));
        assert!(!dir.contains_name("Nobody"));
    }

    #[test]
    fn test_call_record_is_sale() {
        let mut call = CallRecord {
            id: "c1".to_string(),
            lead_id: None,
            agent_id: None,
            agent_name: "Dana".to_string(),
            campaign: None,
            list_id: None,
            phone_number: None,
            disposition: "Sale - Verified".to_string(),
            call_date: "2026-08-01 10:00:00".to_string(),
            duration_sec: 120,
            recording_url: None,
        };
        assert!(call.is_sale());
        call.disposition = "NOT INTERESTED".to_string();
        assert!(!call.is_sale());
    }

    #[test]
    fn test_segment_duration_clamped() {
        let seg = TranscriptSegment::new(Speaker::Agent, "hi", 1000, 400);
        assert_eq!(seg.duration_ms(), 0);
    }
}
