//! callscope - discovery session status viewer
//!
//! The reader side of the long-running discovery pipeline: lists an
//! agency's recent sessions or watches one session's status, progress and
//! insights until it reaches a terminal state. This is the same row the
//! web dashboard polls.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use callscope_core::types::DiscoverySession;
use callscope_core::{Config, Database};

#[derive(Parser)]
#[command(name = "callscope")]
#[command(about = "Inspect call-center QA discovery sessions")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recent discovery sessions for an agency
    Sessions {
        /// Agency (tenant) identifier
        #[arg(long)]
        agency: String,

        /// Maximum sessions to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Watch one session until it reaches a terminal state
    Watch {
        /// Session identifier
        session_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        callscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db = Database::open(&Config::database_path()).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match args.command {
        Command::Sessions { agency, limit } => list_sessions(&db, &agency, limit),
        Command::Watch { session_id, poll } => watch_session(&db, &session_id, poll).await,
    }
}

fn list_sessions(db: &Database, agency: &str, limit: usize) -> Result<()> {
    let sessions = db
        .list_discovery_sessions(agency, limit)
        .context("failed to list sessions")?;

    if sessions.is_empty() {
        println!("No discovery sessions for agency {}", agency);
        return Ok(());
    }

    println!(
        "{:<38} {:<13} {:>5} {:>9}  {}",
        "SESSION", "STATUS", "PROG", "PROCESSED", "CREATED"
    );
    for session in sessions {
        println!(
            "{:<38} {:<13} {:>4}% {:>9}  {}",
            session.id,
            session.status.as_str(),
            session.progress,
            session.processed,
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if let Some(error) = &session.error_message {
            println!("    error: {}", error);
        }
    }
    Ok(())
}

async fn watch_session(db: &Database, session_id: &str, poll_ms: u64) -> Result<()> {
    let poll = Duration::from_millis(poll_ms.max(100));
    let mut last_insights = 0usize;

    loop {
        let session = db
            .get_discovery_session(session_id)
            .context("failed to read session")?
            .with_context(|| format!("session not found: {}", session_id))?;

        print_status_line(&session);

        // Stream new insights as they appear
        for insight in session.insights.iter().skip(last_insights) {
            println!("  insight: {}", insight);
        }
        last_insights = session.insights.len();

        if session.status.is_terminal() {
            print_summary(&session);
            return Ok(());
        }

        tokio::time::sleep(poll).await;
    }
}

fn print_status_line(session: &DiscoverySession) {
    println!(
        "[{}] {} {}% ({} processed)",
        chrono::Local::now().format("%H:%M:%S"),
        session.status.as_str(),
        session.progress,
        session.processed,
    );
}

fn print_summary(session: &DiscoverySession) {
    match session.error_message.as_deref() {
        Some(error) => println!("\nSession ended with error: {}", error),
        None => {
            println!("\nSession complete.");
            if let Some(metrics) = session.metrics.as_object() {
                let get_f64 = |key: &str| metrics.get(key).and_then(|v| v.as_f64());
                let get_i64 = |key: &str| metrics.get(key).and_then(|v| v.as_i64());

                if let Some(rate) = get_f64("closeRate") {
                    println!("  Close rate:        {:.1}%", rate);
                }
                if let Some(pitches) = get_i64("pitchesDelivered") {
                    println!("  Pitches delivered: {}", pitches);
                }
                if let Some(score) = get_i64("openingScore") {
                    println!("  Opening score:     {}/100", score);
                }
                if let Some(rate) = get_f64("hangupRate") {
                    println!("  Hangup rate:       {:.1}%", rate);
                }
            }
        }
    }
}
