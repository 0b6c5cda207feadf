//! Compliance sync service.
//!
//! A simpler, two-phase workflow next to discovery: discover agents, then
//! sweep the trailing window for sales-dispositioned calls with
//! recordings and persist one call row plus one post-close segment per
//! sale. Persistence is idempotent over `(source, source_ref)`, so
//! re-running the same window never duplicates rows. Every attempt writes
//! exactly one sync-log row, success or not.

use std::sync::Arc;

use crate::db::Database;
use crate::discovery::CALL_SOURCE;
use crate::error::{Error, Result};
use crate::telephony::TelephonySource;
use crate::types::{ComplianceSyncLog, ComplianceSyncType, SyncStatus};

/// Outcome summary of one sync attempt.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ComplianceSyncOutcome {
    pub agents_discovered: usize,
    pub calls_fetched: usize,
    pub sales_found: usize,
    pub segments_created: usize,
    pub errors: Vec<String>,
}

/// Two-phase compliance sync for one agency.
pub struct ComplianceSyncService {
    source: Arc<dyn TelephonySource>,
    agency_id: String,
    window_days: i64,
}

impl ComplianceSyncService {
    pub fn new(source: Arc<dyn TelephonySource>, agency_id: &str, window_days: i64) -> Self {
        Self {
            source,
            agency_id: agency_id.to_string(),
            window_days,
        }
    }

    /// Execute the full workflow. Always logs one sync row.
    pub async fn run(&self, db: &Database) -> Result<ComplianceSyncOutcome> {
        let mut outcome = ComplianceSyncOutcome::default();

        tracing::info!(
            agency_id = %self.agency_id,
            window_days = self.window_days,
            "Starting compliance sync"
        );

        // Phase 1: agent discovery
        let (agents, directory) = match self.source.discover_agents().await {
            Ok(found) => found,
            Err(e) => {
                outcome.errors.push(e.to_string());
                self.log_sync(db, ComplianceSyncType::AgentDiscovery, SyncStatus::Failed, &outcome);
                return Err(e);
            }
        };
        outcome.agents_discovered = agents.len();

        if agents.is_empty() {
            outcome.errors.push("No agents found".to_string());
            self.log_sync(db, ComplianceSyncType::AgentDiscovery, SyncStatus::Failed, &outcome);
            return Err(Error::Compliance("no agents discovered".to_string()));
        }

        // Phase 2: sales sweep, filtered to the discovered agent set
        let calls = match self.source.fetch_sales_calls(self.window_days).await {
            Ok(calls) => calls,
            Err(e) => {
                outcome.errors.push(e.to_string());
                self.log_sync(db, ComplianceSyncType::SalesFetch, SyncStatus::Failed, &outcome);
                return Err(e);
            }
        };
        outcome.calls_fetched = calls.len();

        let sales: Vec<_> = calls
            .into_iter()
            .filter(|c| directory.contains_name(&c.agent_name))
            .collect();
        outcome.sales_found = sales.len();

        // Persist: idempotent call upsert + segment insert-if-absent.
        // One bad row is logged and skipped, not fatal.
        for call in &sales {
            match db.upsert_call(&self.agency_id, CALL_SOURCE, call) {
                Ok(call_id) => {
                    match db.insert_post_close_segment(
                        call_id,
                        &self.agency_id,
                        &call.id,
                        &call.agent_name,
                        &call.disposition,
                        call.duration_sec,
                    ) {
                        Ok(true) => outcome.segments_created += 1,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(call_id = %call.id, error = %e, "Segment insert failed");
                            outcome.errors.push(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(call_id = %call.id, error = %e, "Call upsert failed");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        let status = if outcome.errors.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        };
        self.log_sync(db, ComplianceSyncType::SalesFetch, status, &outcome);

        tracing::info!(
            agency_id = %self.agency_id,
            agents = outcome.agents_discovered,
            sales = outcome.sales_found,
            segments = outcome.segments_created,
            "Compliance sync complete"
        );

        Ok(outcome)
    }

    /// Write the audit row; a logging failure is itself only logged.
    fn log_sync(
        &self,
        db: &Database,
        sync_type: ComplianceSyncType,
        status: SyncStatus,
        outcome: &ComplianceSyncOutcome,
    ) {
        let log = ComplianceSyncLog {
            agency_id: self.agency_id.clone(),
            sync_type,
            calls_fetched: outcome.calls_fetched as i64,
            sales_found: outcome.sales_found as i64,
            segments_created: outcome.segments_created as i64,
            status,
            error_message: if outcome.errors.is_empty() {
                None
            } else {
                Some(outcome.errors.join("; "))
            },
            api_response: serde_json::to_value(outcome).unwrap_or_else(|_| serde_json::json!({})),
        };

        if let Err(e) = db.insert_sync_log(&log) {
            tracing::error!(agency_id = %self.agency_id, error = %e, "Failed to write sync log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::StoredCredentials;
    use crate::db::AgencyRow;
    use crate::telephony::source::FetchProgress;
    use crate::types::{Agent, AgentDirectory, CallRecord};
    use async_trait::async_trait;

    struct FakeSource {
        agents: Vec<Agent>,
        calls: Vec<CallRecord>,
        fail_sales_fetch: bool,
    }

    #[async_trait]
    impl TelephonySource for FakeSource {
        async fn discover_agents(&self) -> Result<(Vec<Agent>, AgentDirectory)> {
            let directory = AgentDirectory::from_agents(&self.agents);
            Ok((self.agents.clone(), directory))
        }

        async fn fetch_discovery_calls(
            &self,
            _target: usize,
            _agent_ids: &[String],
            _on_progress: FetchProgress<'_>,
        ) -> Result<Vec<CallRecord>> {
            Ok(self.calls.clone())
        }

        async fn fetch_sales_calls(&self, _window_days: i64) -> Result<Vec<CallRecord>> {
            if self.fail_sales_fetch {
                return Err(Error::Telephony("API error (500): boom".to_string()));
            }
            Ok(self.calls.clone())
        }

        async fn resolve_recording(&self, call: &CallRecord) -> Option<String> {
            call.recording_url.clone()
        }
    }

    fn agent(id: &str, name: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: name.to_string(),
            email: None,
            campaigns: vec![],
            call_count: 5,
            avg_duration_sec: 100.0,
        }
    }

    fn sale_call(id: &str, agent_name: &str) -> CallRecord {
        CallRecord {
            id: id.to_string(),
            lead_id: Some(format!("L{id}")),
            agent_id: None,
            agent_name: agent_name.to_string(),
            campaign: None,
            list_id: None,
            phone_number: None,
            disposition: "SALE".to_string(),
            call_date: "2026-08-01 10:00:00".to_string(),
            duration_sec: 180,
            recording_url: Some(format!("https://cdn.example.com/{id}.mp3")),
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.upsert_agency(&AgencyRow {
            id: "agency-1".to_string(),
            name: "Test".to_string(),
            credentials: StoredCredentials::default(),
        })
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_successful_sync() {
        let db = test_db();
        let source = Arc::new(FakeSource {
            agents: vec![agent("101", "Dana Cruz")],
            calls: vec![sale_call("c-1", "Dana Cruz"), sale_call("c-2", "Dana Cruz")],
            fail_sales_fetch: false,
        });

        let service = ComplianceSyncService::new(source, "agency-1", 90);
        let outcome = service.run(&db).await.unwrap();

        assert_eq!(outcome.agents_discovered, 1);
        assert_eq!(outcome.sales_found, 2);
        assert_eq!(outcome.segments_created, 2);
        assert_eq!(db.count_calls("agency-1").unwrap(), 2);
        assert_eq!(db.count_post_close_segments("agency-1").unwrap(), 2);
        assert_eq!(db.count_sync_logs("agency-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let db = test_db();
        let source = Arc::new(FakeSource {
            agents: vec![agent("101", "Dana Cruz")],
            calls: vec![sale_call("c-1", "Dana Cruz")],
            fail_sales_fetch: false,
        });

        let service = ComplianceSyncService::new(source, "agency-1", 90);
        service.run(&db).await.unwrap();
        service.run(&db).await.unwrap();

        // Same call set twice: one call row, one segment, two audit rows
        assert_eq!(db.count_calls("agency-1").unwrap(), 1);
        assert_eq!(db.count_post_close_segments("agency-1").unwrap(), 1);
        assert_eq!(db.count_sync_logs("agency-1").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_agent_calls_filtered() {
        let db = test_db();
        let source = Arc::new(FakeSource {
            agents: vec![agent("101", "Dana Cruz")],
            calls: vec![
                sale_call("c-1", "Dana Cruz"),
                sale_call("c-2", "Somebody Else"),
            ],
            fail_sales_fetch: false,
        });

        let service = ComplianceSyncService::new(source, "agency-1", 90);
        let outcome = service.run(&db).await.unwrap();
        assert_eq!(outcome.calls_fetched, 2);
        assert_eq!(outcome.sales_found, 1);
    }

    #[tokio::test]
    async fn test_zero_agents_fails_and_logs() {
        let db = test_db();
        let source = Arc::new(FakeSource {
            agents: vec![],
            calls: vec![],
            fail_sales_fetch: false,
        });

        let service = ComplianceSyncService::new(source, "agency-1", 90);
        assert!(service.run(&db).await.is_err());
        assert_eq!(db.count_sync_logs("agency-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sales_fetch_failure_logs_failed_row() {
        let db = test_db();
        let source = Arc::new(FakeSource {
            agents: vec![agent("101", "Dana Cruz")],
            calls: vec![],
            fail_sales_fetch: true,
        });

        let service = ComplianceSyncService::new(source, "agency-1", 90);
        assert!(service.run(&db).await.is_err());
        assert_eq!(db.count_sync_logs("agency-1").unwrap(), 1);
    }
}
