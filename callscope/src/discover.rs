//! callscope-discover - run a discovery session for one agency
//!
//! Resolves the agency's telephony credentials, creates a discovery
//! session row, and drives the pipeline to a terminal state while showing
//! progress. An agency with no credentials configured is skipped, not
//! failed.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/callscope/data.db
//! - Logs: $XDG_STATE_HOME/callscope/callscope.log
//! - Config: $XDG_CONFIG_HOME/callscope/config.toml

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use callscope_core::crypto;
use callscope_core::discovery::DiscoveryRunner;
use callscope_core::llm::create_llm_client;
use callscope_core::signals::{DeceptionDetector, NoopDetector, PhraseListDetector};
use callscope_core::telephony::TelephonyApi;
use callscope_core::transcribe::HttpTranscriptionEngine;
use callscope_core::types::DiscoverySession;
use callscope_core::{Config, Database};

#[derive(Parser)]
#[command(name = "callscope-discover")]
#[command(about = "Run a discovery session for an agency")]
#[command(version)]
struct Args {
    /// Agency (tenant) identifier
    #[arg(long)]
    agency: String,

    /// Override the configured target call count
    #[arg(long)]
    calls: Option<usize>,

    /// Restrict the fetch to these agent ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    agents: Vec<String>,

    /// Disable deception detection for this run
    #[arg(long)]
    no_deception: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        callscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(agency = %args.agency, "callscope-discover starting");

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    // Resolve per-tenant credentials; absence means skip, not fail
    let agency = db
        .get_agency(&args.agency)
        .context("failed to load agency")?
        .with_context(|| format!("agency not found: {}", args.agency))?;

    let secret = Config::encryption_secret();
    let credentials =
        crypto::resolve_credentials(&agency.credentials, secret.as_deref())
            .context("failed to resolve credentials")?;

    let Some(credentials) = credentials else {
        println!(
            "Agency {} has no telephony credentials configured; skipping.",
            agency.name
        );
        return Ok(());
    };

    let transcription_config = config
        .transcription
        .as_ref()
        .context("[transcription] must be configured for discovery")?;

    let source = Arc::new(
        TelephonyApi::new(&credentials, &config.telephony)
            .context("failed to create telephony client")?,
    );
    let transcriber = Arc::new(
        HttpTranscriptionEngine::new(transcription_config)
            .context("failed to create transcription engine")?,
    );
    let llm = match &config.llm {
        Some(llm_config) => Some(Arc::from(
            create_llm_client(llm_config).context("failed to create LLM client")?,
        )),
        None => None,
    };

    let mut discovery_config = config.discovery.clone();
    if let Some(calls) = args.calls {
        discovery_config.call_count = calls;
    }

    let detector: Arc<dyn DeceptionDetector> = if args.no_deception {
        Arc::new(NoopDetector)
    } else {
        Arc::new(PhraseListDetector)
    };
    let runner = DiscoveryRunner::new(source, transcriber, llm, detector, discovery_config.clone());

    // Create the session row the UI (and the progress bar below) polls
    let session = DiscoverySession::new(&args.agency);
    let session_id = session.id.clone();
    db.insert_discovery_session(&session)
        .context("failed to create discovery session")?;

    println!("Session: {}", session_id);
    println!(
        "Target: {} calls across {} agent(s)",
        discovery_config.call_count,
        if args.agents.is_empty() {
            "all".to_string()
        } else {
            args.agents.len().to_string()
        }
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    // Poll the session row for progress while the run executes
    let poll_db = Database::open(&db_path).context("failed to open progress database")?;
    let poll_session_id = session_id.clone();
    let poll_handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match poll_db.get_discovery_session(&poll_session_id) {
                Ok(Some(session)) => {
                    pb.set_position(session.progress as u64);
                    pb.set_message(format!(
                        "{} ({} processed)",
                        session.status.as_str(),
                        session.processed
                    ));
                    if session.status.is_terminal() {
                        pb.finish_and_clear();
                        break;
                    }
                }
                Ok(None) => {}
                Err(_) => break,
            }
        }
    });

    let result = runner.run(&db, &session_id, &args.agency, &args.agents).await;
    let _ = poll_handle.await;

    match result {
        Ok(metrics) => {
            println!("\nDiscovery complete:");
            println!("  Calls processed:   {}", metrics.total_calls_processed);
            println!("  Pitches delivered: {}", metrics.pitches_delivered);
            println!("  Successful closes: {}", metrics.successful_closes);
            println!("  Close rate:        {:.1}%", metrics.close_rate);
            println!("  Opening score:     {}/100", metrics.opening_score);
            println!("  Rebuttal failures: {}", metrics.rebuttal_failures);
            println!("  Early hangups:     {}", metrics.early_hangups);
            println!("  Hangup rate:       {:.1}%", metrics.hangup_rate);
            if metrics.lying_detected > 0 {
                println!("  Deception flags:   {}", metrics.lying_detected);
            }

            tracing::info!(session_id, "callscope-discover complete");
            Ok(())
        }
        Err(e) => {
            bail!("discovery run failed: {e}");
        }
    }
}
