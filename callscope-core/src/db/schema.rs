//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- Tenants and their telephony credentials
    CREATE TABLE IF NOT EXISTS agencies (
        id                   TEXT PRIMARY KEY,
        name                 TEXT NOT NULL,

        -- New-style encrypted token: "<iv_hex>:<ciphertext_hex>"
        api_token_encrypted  TEXT,
        api_base_url         TEXT,

        -- Legacy JSON credentials blob
        credentials_json     JSON,

        created_at           DATETIME NOT NULL
    );

    -- Calls, idempotent across re-runs via (source, source_ref)
    CREATE TABLE IF NOT EXISTS calls (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        agency_id       TEXT NOT NULL REFERENCES agencies(id),
        source          TEXT NOT NULL,
        source_ref      TEXT NOT NULL,
        lead_id         TEXT,
        agent_name      TEXT,
        campaign        TEXT,
        list_id         TEXT,
        phone_number    TEXT,
        disposition     TEXT,
        call_date       TEXT,
        duration_sec    INTEGER NOT NULL DEFAULT 0,
        recording_url   TEXT,
        analysis_json   JSON,
        created_at      DATETIME NOT NULL,

        UNIQUE(source, source_ref)
    );

    CREATE INDEX IF NOT EXISTS idx_calls_agency ON calls(agency_id);
    CREATE INDEX IF NOT EXISTS idx_calls_disposition ON calls(disposition);

    -- Discovery run state, polled by the UI
    CREATE TABLE IF NOT EXISTS discovery_sessions (
        id              TEXT PRIMARY KEY,
        agency_id       TEXT NOT NULL REFERENCES agencies(id),
        status          TEXT NOT NULL,
        progress        INTEGER NOT NULL DEFAULT 0,
        processed       INTEGER NOT NULL DEFAULT 0,
        total_calls     INTEGER NOT NULL DEFAULT 0,
        metrics         JSON,
        insights        JSON,
        error_message   TEXT,
        created_at      DATETIME NOT NULL,
        completed_at    DATETIME
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_agency ON discovery_sessions(agency_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_status ON discovery_sessions(status);

    -- Post-close segments for compliance review, one per sale call
    CREATE TABLE IF NOT EXISTS post_close_segments (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        call_id         INTEGER NOT NULL REFERENCES calls(id),
        agency_id       TEXT NOT NULL REFERENCES agencies(id),
        source_ref      TEXT NOT NULL,
        agent_name      TEXT,
        disposition     TEXT,
        start_ms        INTEGER NOT NULL DEFAULT 0,
        end_ms          INTEGER NOT NULL DEFAULT 0,
        duration_sec    INTEGER NOT NULL DEFAULT 0,
        sale_confirmed  INTEGER NOT NULL DEFAULT 0,
        extraction_method TEXT,
        synced_at       DATETIME NOT NULL,

        UNIQUE(call_id)
    );

    CREATE INDEX IF NOT EXISTS idx_segments_agency ON post_close_segments(agency_id);

    -- Append-only audit trail of compliance sync attempts
    CREATE TABLE IF NOT EXISTS compliance_sync_log (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        agency_id         TEXT NOT NULL REFERENCES agencies(id),
        sync_type         TEXT NOT NULL,
        calls_fetched     INTEGER NOT NULL DEFAULT 0,
        sales_found       INTEGER NOT NULL DEFAULT 0,
        segments_created  INTEGER NOT NULL DEFAULT 0,
        status            TEXT NOT NULL,
        error_message     TEXT,
        api_response      JSON,
        created_at        DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sync_log_agency ON compliance_sync_log(agency_id, created_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "agencies",
            "calls",
            "discovery_sessions",
            "post_close_segments",
            "compliance_sync_log",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_calls_unique_source_ref() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO agencies (id, name, created_at) VALUES ('a1', 'Test', '2026-08-01')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO calls (agency_id, source, source_ref, created_at) VALUES ('a1', 'convoso', 'c-1', '2026-08-01')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO calls (agency_id, source, source_ref, created_at) VALUES ('a1', 'convoso', 'c-1', '2026-08-01')",
            [],
        );
        assert!(dup.is_err(), "duplicate (source, source_ref) must be rejected");
    }
}
