//! Durable store for request log entries
//!
//! [`LogStore`] is the seam the dispatcher and the query API talk to.
//! [`SqliteLogStore`] backs it with a pooled SQLite database:
//! - WAL mode for concurrent reads while the writer task inserts
//! - Embedded migrations
//! - Batched inserts in a single transaction
//!
//! The open-ended `query`, `body` and `params` fields are stored as JSON text.

use super::entry::{millis_to_datetime, HttpMethod, LogEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, method, url, source_ip, user_agent, query, body, params, \
     status_code, response_time, timestamp, error FROM request_logs";

/// Exact-match filter for log queries
///
/// An empty filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Maximum number of results (newest first)
    #[serde(skip)]
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.method.map_or(true, |m| entry.method == m)
            && self
                .status_code
                .map_or(true, |code| entry.status_code == Some(code))
    }
}

/// Persistence target for finished log entries
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one entry
    async fn save(&self, entry: &LogEntry) -> Result<()>;

    /// Append several entries
    async fn save_batch(&self, entries: &[LogEntry]) -> Result<()> {
        for entry in entries {
            self.save(entry).await?;
        }
        Ok(())
    }

    /// Entries matching `filter`, newest first
    async fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;

    /// Delete entries strictly older than now minus `older_than_days`
    ///
    /// Returns the number of deleted entries.
    async fn purge(&self, older_than_days: u32) -> Result<u64>;

    /// Total number of stored entries
    async fn count(&self) -> Result<u64>;
}

/// SQLite-backed [`LogStore`]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Connect to the database and run migrations
    ///
    /// # Arguments
    ///
    /// * `database_url` - e.g. `sqlite:./data/flexylog.db` or `sqlite::memory:`
    /// * `max_connections` - pool size
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        if !database_url.contains(":memory:") {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to request log database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("Failed to run request log migrations")?;

        tracing::info!("Request log database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn save(&self, entry: &LogEntry) -> Result<()> {
        insert_entry(&self.pool, entry)
            .await
            .context("Failed to insert request log entry")
    }

    /// One transaction for the whole batch
    async fn save_batch(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            insert_entry(&mut *tx, entry).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE 1=1");

        if let Some(method) = filter.method {
            builder.push(" AND method = ").push_bind(method.as_str());
        }
        if let Some(status_code) = filter.status_code {
            builder
                .push(" AND status_code = ")
                .push_bind(i64::from(status_code));
        }

        builder.push(" ORDER BY timestamp DESC, rowid DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query request logs")?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn purge(&self, older_than_days: u32) -> Result<u64> {
        // a cutoff before the representable range means nothing is that old
        let Some(cutoff) = TimeDelta::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            tracing::debug!(older_than_days = older_than_days, "Purge cutoff out of range");
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM request_logs WHERE timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .context("Failed to purge request logs")?;

        tracing::info!(
            older_than_days = older_than_days,
            deleted = result.rows_affected(),
            "Purged old request logs"
        );

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

async fn insert_entry<'e, E>(executor: E, entry: &LogEntry) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO request_logs (id, method, url, source_ip, user_agent, query, body, params,
                                   status_code, response_time, timestamp, error)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.method.as_str())
    .bind(&entry.url)
    .bind(&entry.source_ip)
    .bind(&entry.user_agent)
    .bind(to_json_text(&entry.query)?)
    .bind(to_json_text(&entry.body)?)
    .bind(to_json_text(&entry.params)?)
    .bind(entry.status_code.map(i64::from))
    .bind(entry.response_time.map(|ms| ms as i64))
    .bind(entry.timestamp.timestamp_millis())
    .bind(&entry.error)
    .execute(executor)
    .await?;

    Ok(())
}

fn row_to_entry(row: &SqliteRow) -> Result<LogEntry> {
    let id: String = row.try_get("id")?;
    let method: String = row.try_get("method")?;

    Ok(LogEntry {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid log id: {}", id))?,
        method: method.parse()?,
        url: row.try_get("url")?,
        source_ip: row.try_get("source_ip")?,
        user_agent: row.try_get("user_agent")?,
        query: from_json_text(row.try_get("query")?)?,
        body: from_json_text(row.try_get("body")?)?,
        params: from_json_text(row.try_get("params")?)?,
        status_code: row
            .try_get::<Option<i64>, _>("status_code")?
            .map(|code| code as u16),
        response_time: row
            .try_get::<Option<i64>, _>("response_time")?
            .map(|ms| ms.max(0) as u64),
        timestamp: millis_to_datetime(row.try_get("timestamp")?),
        error: row.try_get("error")?,
    })
}

fn to_json_text(value: &Option<Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode JSON field")
}

fn from_json_text(text: Option<String>) -> Result<Option<Value>> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .context("Failed to decode JSON field")
}
