//! Database repository layer
//!
//! Provides query and insert operations for agencies, calls, discovery
//! sessions, post-close segments and the compliance sync log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::crypto::StoredCredentials;
use crate::error::{Error, Result};
use crate::types::{
    CallRecord, ComplianceSyncLog, DiscoverySession, DiscoveryStatus,
};

/// One agency row with its credential columns.
#[derive(Debug, Clone)]
pub struct AgencyRow {
    pub id: String,
    pub name: String,
    pub credentials: StoredCredentials,
}

/// A persisted call with its storage id.
#[derive(Debug, Clone)]
pub struct StoredCall {
    pub id: i64,
    pub source: String,
    pub source_ref: String,
    pub agency_id: String,
    pub disposition: Option<String>,
    pub duration_sec: i64,
    pub analysis_json: Option<serde_json::Value>,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Foreign keys plus WAL mode for concurrent readers (the polling UI)
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run pending schema migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Agencies
    // ============================================

    /// Insert or update an agency row.
    pub fn upsert_agency(&self, agency: &AgencyRow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO agencies (id, name, api_token_encrypted, api_base_url, credentials_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                api_token_encrypted = excluded.api_token_encrypted,
                api_base_url = excluded.api_base_url,
                credentials_json = excluded.credentials_json
            "#,
            params![
                agency.id,
                agency.name,
                agency.credentials.api_token_encrypted,
                agency.credentials.api_base_url,
                agency
                    .credentials
                    .credentials_json
                    .as_ref()
                    .map(|v| v.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch an agency with its stored credential fields.
    pub fn get_agency(&self, id: &str) -> Result<Option<AgencyRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, api_token_encrypted, api_base_url, credentials_json FROM agencies WHERE id = ?",
            [id],
            |row| {
                let blob: Option<String> = row.get(4)?;
                Ok(AgencyRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    credentials: StoredCredentials {
                        api_token_encrypted: row.get(2)?,
                        api_base_url: row.get(3)?,
                        credentials_json: blob
                            .and_then(|s| serde_json::from_str(&s).ok()),
                    },
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // ============================================
    // Calls
    // ============================================

    /// Idempotent call upsert keyed by `(source, source_ref)`.
    ///
    /// Returns the storage id of the (new or existing) row. Re-running a
    /// sync over the same call set never produces duplicate rows.
    pub fn upsert_call(&self, agency_id: &str, source: &str, call: &CallRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO calls (agency_id, source, source_ref, lead_id, agent_name, campaign,
                               list_id, phone_number, disposition, call_date, duration_sec,
                               recording_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(source, source_ref) DO UPDATE SET
                agent_name = excluded.agent_name,
                disposition = excluded.disposition,
                duration_sec = excluded.duration_sec,
                recording_url = COALESCE(excluded.recording_url, calls.recording_url)
            "#,
            params![
                agency_id,
                source,
                call.id,
                call.lead_id,
                call.agent_name,
                call.campaign,
                call.list_id,
                call.phone_number,
                call.disposition,
                call.call_date,
                call.duration_sec,
                call.recording_url,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM calls WHERE source = ? AND source_ref = ?",
            params![source, call.id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Attach the analysis blob to a stored call.
    pub fn set_call_analysis(&self, call_id: i64, analysis: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET analysis_json = ?1 WHERE id = ?2",
            params![analysis.to_string(), call_id],
        )?;
        Ok(())
    }

    /// Fetch a stored call by source reference.
    pub fn get_call(&self, source: &str, source_ref: &str) -> Result<Option<StoredCall>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, source, source_ref, agency_id, disposition, duration_sec, analysis_json
             FROM calls WHERE source = ? AND source_ref = ?",
            params![source, source_ref],
            Self::row_to_stored_call,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Count calls persisted for an agency.
    pub fn count_calls(&self, agency_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE agency_id = ?",
            [agency_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn row_to_stored_call(row: &Row<'_>) -> rusqlite::Result<StoredCall> {
        let blob: Option<String> = row.get(6)?;
        Ok(StoredCall {
            id: row.get(0)?,
            source: row.get(1)?,
            source_ref: row.get(2)?,
            agency_id: row.get(3)?,
            disposition: row.get(4)?,
            duration_sec: row.get(5)?,
            analysis_json: blob.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }

    // ============================================
    // Discovery sessions
    // ============================================

    /// Create a new discovery session row.
    pub fn insert_discovery_session(&self, session: &DiscoverySession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO discovery_sessions (id, agency_id, status, progress, processed,
                                            total_calls, metrics, insights, error_message,
                                            created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                session.id,
                session.agency_id,
                session.status.as_str(),
                session.progress,
                session.processed,
                session.total_calls,
                session.metrics.to_string(),
                serde_json::to_string(&session.insights)?,
                session.error_message,
                session.created_at.to_rfc3339(),
                session.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Incremental progress update during a run.
    ///
    /// Progress only moves forward; a stale writer can never walk the bar
    /// backwards under the polling reader.
    pub fn update_session_progress(
        &self,
        session_id: &str,
        status: DiscoveryStatus,
        progress: i32,
        processed: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE discovery_sessions
            SET status = ?2, progress = MAX(progress, ?3), processed = ?4
            WHERE id = ?1
            "#,
            params![session_id, status.as_str(), progress, processed],
        )?;
        Ok(())
    }

    /// Persist the running metrics and insight strings.
    pub fn update_session_metrics(
        &self,
        session_id: &str,
        metrics: &serde_json::Value,
        insights: &[String],
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE discovery_sessions SET metrics = ?2, insights = ?3 WHERE id = ?1",
            params![
                session_id,
                metrics.to_string(),
                serde_json::to_string(insights)?
            ],
        )?;
        Ok(())
    }

    /// Record the fetched call total.
    pub fn update_session_total(&self, session_id: &str, total_calls: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE discovery_sessions SET total_calls = ?2 WHERE id = ?1",
            params![session_id, total_calls],
        )?;
        Ok(())
    }

    /// Terminal success transition.
    pub fn complete_session(
        &self,
        session_id: &str,
        metrics: &serde_json::Value,
        insights: &[String],
        processed: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE discovery_sessions
            SET status = 'complete', progress = 100, processed = ?2,
                metrics = ?3, insights = ?4, completed_at = ?5
            WHERE id = ?1
            "#,
            params![
                session_id,
                processed,
                metrics.to_string(),
                serde_json::to_string(insights)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Terminal failure transition; always records the message.
    pub fn fail_session(
        &self,
        session_id: &str,
        error_message: &str,
        insights: &[String],
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE discovery_sessions
            SET status = 'error', error_message = ?2, insights = ?3, completed_at = ?4
            WHERE id = ?1
            "#,
            params![
                session_id,
                error_message,
                serde_json::to_string(insights)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a discovery session (the polling reader's query).
    pub fn get_discovery_session(&self, id: &str) -> Result<Option<DiscoverySession>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, agency_id, status, progress, processed, total_calls, metrics,
                    insights, error_message, created_at, completed_at
             FROM discovery_sessions WHERE id = ?",
            [id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Most recent sessions for an agency, newest first.
    pub fn list_discovery_sessions(
        &self,
        agency_id: &str,
        limit: usize,
    ) -> Result<Vec<DiscoverySession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, agency_id, status, progress, processed, total_calls, metrics,
                    insights, error_message, created_at, completed_at
             FROM discovery_sessions WHERE agency_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![agency_id, limit as i64], Self::row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    fn row_to_session(row: &Row<'_>) -> rusqlite::Result<DiscoverySession> {
        let status: String = row.get(2)?;
        let metrics: Option<String> = row.get(6)?;
        let insights: Option<String> = row.get(7)?;
        let created_at: String = row.get(9)?;
        let completed_at: Option<String> = row.get(10)?;

        Ok(DiscoverySession {
            id: row.get(0)?,
            agency_id: row.get(1)?,
            status: DiscoveryStatus::from_storage(&status),
            progress: row.get(3)?,
            processed: row.get(4)?,
            total_calls: row.get(5)?,
            metrics: metrics
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| serde_json::json!({})),
            insights: insights
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            error_message: row.get(8)?,
            created_at: parse_ts(&created_at),
            completed_at: completed_at.as_deref().map(parse_ts),
        })
    }

    // ============================================
    // Post-close segments
    // ============================================

    /// Insert a segment for a call unless one already exists.
    ///
    /// Returns true when a new row was created.
    pub fn insert_post_close_segment(
        &self,
        call_id: i64,
        agency_id: &str,
        source_ref: &str,
        agent_name: &str,
        disposition: &str,
        duration_sec: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM post_close_segments WHERE call_id = ?",
                [call_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(false);
        }

        conn.execute(
            r#"
            INSERT INTO post_close_segments (call_id, agency_id, source_ref, agent_name,
                                             disposition, start_ms, end_ms, duration_sec,
                                             sale_confirmed, extraction_method, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, 1, 'provider_sync', ?8)
            "#,
            params![
                call_id,
                agency_id,
                source_ref,
                agent_name,
                disposition,
                duration_sec * 1000,
                duration_sec,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(true)
    }

    /// Count segments persisted for an agency.
    pub fn count_post_close_segments(&self, agency_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM post_close_segments WHERE agency_id = ?",
            [agency_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    // ============================================
    // Compliance sync log
    // ============================================

    /// Append one sync log row.
    pub fn insert_sync_log(&self, log: &ComplianceSyncLog) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO compliance_sync_log (agency_id, sync_type, calls_fetched, sales_found,
                                             segments_created, status, error_message,
                                             api_response, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                log.agency_id,
                log.sync_type.as_str(),
                log.calls_fetched,
                log.sales_found,
                log.segments_created,
                log.status.as_str(),
                log.error_message,
                log.api_response.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count sync log rows for an agency.
    pub fn count_sync_logs(&self, agency_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM compliance_sync_log WHERE agency_id = ?",
            [agency_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComplianceSyncType, SyncStatus};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.upsert_agency(&AgencyRow {
            id: "agency-1".to_string(),
            name: "Test Agency".to_string(),
            credentials: StoredCredentials::default(),
        })
        .unwrap();
        db
    }

    fn call(id: &str) -> CallRecord {
        CallRecord {
            id: id.to_string(),
            lead_id: Some("L1".to_string()),
            agent_id: Some("101".to_string()),
            agent_name: "Dana".to_string(),
            campaign: None,
            list_id: None,
            phone_number: None,
            disposition: "SALE".to_string(),
            call_date: "2026-08-01 10:00:00".to_string(),
            duration_sec: 120,
            recording_url: Some("https://cdn.example.com/1.mp3".to_string()),
        }
    }

    #[test]
    fn test_upsert_call_idempotent() {
        let db = test_db();
        let first = db.upsert_call("agency-1", "convoso", &call("c-1")).unwrap();
        let second = db.upsert_call("agency-1", "convoso", &call("c-1")).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.count_calls("agency-1").unwrap(), 1);
    }

    #[test]
    fn test_upsert_preserves_recording_url() {
        let db = test_db();
        db.upsert_call("agency-1", "convoso", &call("c-1")).unwrap();

        let mut updated = call("c-1");
        updated.recording_url = None;
        db.upsert_call("agency-1", "convoso", &updated).unwrap();

        let stored = db.get_call("convoso", "c-1").unwrap().unwrap();
        assert_eq!(stored.duration_sec, 120);
        // URL from the first sync survives a later null
        let conn_url: Option<String> = {
            let conn = db.conn.lock().unwrap();
            conn.query_row(
                "SELECT recording_url FROM calls WHERE id = ?",
                [stored.id],
                |r| r.get(0),
            )
            .unwrap()
        };
        assert!(conn_url.is_some());
    }

    #[test]
    fn test_call_analysis_roundtrip() {
        let db = test_db();
        let id = db.upsert_call("agency-1", "convoso", &call("c-2")).unwrap();
        db.set_call_analysis(id, &serde_json::json!({"qa_score": 72}))
            .unwrap();
        let stored = db.get_call("convoso", "c-2").unwrap().unwrap();
        assert_eq!(
            stored
                .analysis_json
                .unwrap()
                .get("qa_score")
                .and_then(|v| v.as_i64()),
            Some(72)
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let db = test_db();
        let session = DiscoverySession::new("agency-1");
        let id = session.id.clone();
        db.insert_discovery_session(&session).unwrap();

        db.update_session_progress(&id, DiscoveryStatus::Pulling, 12, 300)
            .unwrap();
        let loaded = db.get_discovery_session(&id).unwrap().unwrap();
        assert_eq!(loaded.status, DiscoveryStatus::Pulling);
        assert_eq!(loaded.progress, 12);

        // Progress never decreases
        db.update_session_progress(&id, DiscoveryStatus::Transcribing, 5, 400)
            .unwrap();
        let loaded = db.get_discovery_session(&id).unwrap().unwrap();
        assert_eq!(loaded.progress, 12);
        assert_eq!(loaded.status, DiscoveryStatus::Transcribing);

        db.complete_session(&id, &serde_json::json!({"closeRate": 3.5}), &["done".to_string()], 400)
            .unwrap();
        let loaded = db.get_discovery_session(&id).unwrap().unwrap();
        assert_eq!(loaded.status, DiscoveryStatus::Complete);
        assert_eq!(loaded.progress, 100);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_fail_session_records_message() {
        let db = test_db();
        let session = DiscoverySession::new("agency-1");
        let id = session.id.clone();
        db.insert_discovery_session(&session).unwrap();

        db.fail_session(&id, "No calls retrieved", &[]).unwrap();
        let loaded = db.get_discovery_session(&id).unwrap().unwrap();
        assert_eq!(loaded.status, DiscoveryStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("No calls retrieved"));
        assert!(loaded.status.is_terminal());
    }

    #[test]
    fn test_segment_insert_if_absent() {
        let db = test_db();
        let call_id = db.upsert_call("agency-1", "convoso", &call("c-3")).unwrap();

        let created = db
            .insert_post_close_segment(call_id, "agency-1", "c-3", "Dana", "SALE", 120)
            .unwrap();
        assert!(created);

        let again = db
            .insert_post_close_segment(call_id, "agency-1", "c-3", "Dana", "SALE", 120)
            .unwrap();
        assert!(!again);
        assert_eq!(db.count_post_close_segments("agency-1").unwrap(), 1);
    }

    #[test]
    fn test_sync_log_append_only() {
        let db = test_db();
        let log = ComplianceSyncLog {
            agency_id: "agency-1".to_string(),
            sync_type: ComplianceSyncType::SalesFetch,
            calls_fetched: 10,
            sales_found: 4,
            segments_created: 4,
            status: SyncStatus::Success,
            error_message: None,
            api_response: serde_json::json!({"ok": true}),
        };
        db.insert_sync_log(&log).unwrap();
        db.insert_sync_log(&log).unwrap();
        assert_eq!(db.count_sync_logs("agency-1").unwrap(), 2);
    }

    #[test]
    fn test_agency_credentials_roundtrip() {
        let db = test_db();
        db.upsert_agency(&AgencyRow {
            id: "agency-2".to_string(),
            name: "Second".to_string(),
            credentials: StoredCredentials {
                api_token_encrypted: Some("aa:bb".to_string()),
                api_base_url: Some("https://dialer.example.com/v1".to_string()),
                credentials_json: Some(serde_json::json!({"auth_token": "x"})),
            },
        })
        .unwrap();

        let row = db.get_agency("agency-2").unwrap().unwrap();
        assert_eq!(row.credentials.api_token_encrypted.as_deref(), Some("aa:bb"));
        assert!(row.credentials.credentials_json.is_some());
        assert!(db.get_agency("missing").unwrap().is_none());
    }
}
