use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

use callscope_core::crypto::StoredCredentials;
use callscope_core::db::{AgencyRow, Database};
use callscope_core::types::DiscoverySession;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("callscope/data.db")
    }

    /// Seed the database with an agency and a completed session.
    fn seed(&self) -> String {
        let db = Database::open(&self.db_path()).expect("open seeded db");
        db.migrate().expect("migrate seeded db");
        db.upsert_agency(&AgencyRow {
            id: "agency-1".to_string(),
            name: "Test Agency".to_string(),
            credentials: StoredCredentials::default(),
        })
        .expect("seed agency");

        let session = DiscoverySession::new("agency-1");
        let id = session.id.clone();
        db.insert_discovery_session(&session).expect("seed session");
        db.complete_session(&id, &serde_json::json!({"closeRate": 12.5}), &[], 100)
            .expect("complete seeded session");
        id
    }
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Output {
    let bin_path = match bin_name {
        "callscope" => PathBuf::from(assert_cmd::cargo::cargo_bin!("callscope")),
        "callscope-discover" => PathBuf::from(assert_cmd::cargo::cargo_bin!("callscope-discover")),
        "callscope-compliance" => {
            PathBuf::from(assert_cmd::cargo::cargo_bin!("callscope-compliance"))
        }
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

#[test]
fn test_help_flags() {
    let env = CliTestEnv::new();
    for bin in ["callscope", "callscope-discover", "callscope-compliance"] {
        let output = run_bin(&env, bin, &["--help"]);
        assert!(output.status.success(), "{bin} --help should succeed");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--help"), "{bin} help text missing");
    }
}

#[test]
fn test_sessions_lists_seeded_session() {
    let env = CliTestEnv::new();
    let session_id = env.seed();

    let output = run_bin(&env, "callscope", &["sessions", "--agency", "agency-1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&session_id));
    assert!(stdout.contains("complete"));
}

#[test]
fn test_sessions_empty_agency() {
    let env = CliTestEnv::new();
    env.seed();

    let output = run_bin(&env, "callscope", &["sessions", "--agency", "nobody"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No discovery sessions"));
}

#[test]
fn test_watch_terminal_session_exits() {
    let env = CliTestEnv::new();
    let session_id = env.seed();

    // The seeded session is already complete, so watch returns immediately
    let output = run_bin(&env, "callscope", &["watch", &session_id]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Session complete"));
    assert!(stdout.contains("12.5%"));
}

#[test]
fn test_discover_skips_agency_without_credentials() {
    let env = CliTestEnv::new();
    env.seed();

    // No credentials configured: skip tenant, exit success
    let output = run_bin(&env, "callscope-discover", &["--agency", "agency-1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("skipping"));
}

#[test]
fn test_compliance_skips_agency_without_credentials() {
    let env = CliTestEnv::new();
    env.seed();

    let output = run_bin(&env, "callscope-compliance", &["--agency", "agency-1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("skipping"));
}

#[test]
fn test_discover_unknown_agency_fails() {
    let env = CliTestEnv::new();
    env.seed();

    let output = run_bin(&env, "callscope-discover", &["--agency", "missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("agency not found"));
}
