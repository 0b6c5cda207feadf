//! callscope-compliance - run the two-phase compliance sync for an agency
//!
//! Phase 1 discovers the agency's active agents; phase 2 sweeps the
//! trailing window for sales calls with recordings and persists one call
//! row plus one post-close segment per sale. Every attempt is recorded in
//! the sync audit log.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use callscope_core::compliance::ComplianceSyncService;
use callscope_core::crypto;
use callscope_core::telephony::TelephonyApi;
use callscope_core::{Config, Database};

#[derive(Parser)]
#[command(name = "callscope-compliance")]
#[command(about = "Run the compliance sales sync for an agency")]
#[command(version)]
struct Args {
    /// Agency (tenant) identifier
    #[arg(long)]
    agency: String,

    /// Trailing window in days (defaults to config)
    #[arg(long)]
    days: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        callscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(agency = %args.agency, "callscope-compliance starting");

    let db = Database::open(&Config::database_path()).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let agency = db
        .get_agency(&args.agency)
        .context("failed to load agency")?
        .with_context(|| format!("agency not found: {}", args.agency))?;

    let secret = Config::encryption_secret();
    let credentials = crypto::resolve_credentials(&agency.credentials, secret.as_deref())
        .context("failed to resolve credentials")?;

    let Some(credentials) = credentials else {
        println!(
            "Agency {} has no telephony credentials configured; skipping.",
            agency.name
        );
        return Ok(());
    };

    let source = Arc::new(
        TelephonyApi::new(&credentials, &config.telephony)
            .context("failed to create telephony client")?
            .with_sweep_limits(config.compliance.page_size, config.compliance.max_pages),
    );

    let window_days = args.days.unwrap_or(config.compliance.window_days);
    let service = ComplianceSyncService::new(source, &args.agency, window_days);

    match service.run(&db).await {
        Ok(outcome) => {
            println!("Compliance sync complete:");
            println!("  Agents discovered: {}", outcome.agents_discovered);
            println!("  Calls fetched:     {}", outcome.calls_fetched);
            println!("  Sales found:       {}", outcome.sales_found);
            println!("  Segments created:  {}", outcome.segments_created);
            if !outcome.errors.is_empty() {
                println!("  Errors ({}):", outcome.errors.len());
                for error in &outcome.errors {
                    println!("    {}", error);
                }
            }

            tracing::info!(agency = %args.agency, "callscope-compliance complete");
            Ok(())
        }
        Err(e) => bail!("compliance sync failed: {e}"),
    }
}
