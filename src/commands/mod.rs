//! Command implementations for the CLI
//!
//! - serve: Start the logging server
//! - logs: Query recorded requests
//! - stats: Aggregate statistics over recorded requests
//! - purge: Run a retention sweep now
//! - config: Configuration display and validation

pub mod config;
pub mod logs;
pub mod purge;
pub mod serve;
pub mod stats;

use anyhow::Result;
use flexylog::config::Config;
use flexylog::request_log::SqliteLogStore;

/// Open the log store named by the configuration
async fn open_store(cfg: &Config) -> Result<SqliteLogStore> {
    SqliteLogStore::connect(&cfg.store.database_url, cfg.store.max_connections).await
}
