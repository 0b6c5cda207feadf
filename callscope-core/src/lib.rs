//! # callscope-core
//!
//! Core library for callscope - a call-center QA pipeline.
//!
//! This library provides:
//! - Telephony provider integration (agent discovery, call fetching,
//!   recording resolution)
//! - Transcription and LLM analysis adapters
//! - Deterministic signal extraction over call transcripts
//! - Discovery and compliance orchestrators with SQLite-backed state
//!
//! ## Architecture
//!
//! Data flows through the pipeline leaf-first:
//! - **Credentials:** per-tenant telephony credentials are resolved (and
//!   decrypted) from the agency row
//! - **Fetch:** calls are pulled from the provider with pagination,
//!   duration filtering and deduplication
//! - **Transcribe + Analyze:** recordings become segment lists, then
//!   deterministic signals merged with LLM output under fixed precedence
//! - **Aggregate:** the discovery orchestrator folds results into session
//!   metrics a UI polls; the compliance service persists sales segments
//!
//! ## Example
//!
//! ```rust,no_run
//! use callscope_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analysis;
pub mod cache;
pub mod compliance;
pub mod config;
pub mod crypto;
pub mod db;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod logging;
pub mod retry;
pub mod signals;
pub mod telephony;
pub mod transcribe;
pub mod types;
