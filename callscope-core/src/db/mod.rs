//! Database layer for callscope
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Idempotent call upserts keyed by `(source, source_ref)`

pub mod repo;
pub mod schema;

pub use repo::{AgencyRow, Database, StoredCall};
