// SQLite history of scalar samples. One row per (metric, timestamp) sample; metadata as JSON text.

mod memory;

pub use memory::MemoryHistoryStore;

use crate::models::{HistoryRecord, MetricKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

const SCHEMA_VERSION: i64 = 1;

/// Storage contract used by the recorder. Reads see everything a completed `insert_batch` wrote.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_batch(&self, records: &[HistoryRecord]) -> anyhow::Result<()>;

    /// Records of `metric` with `from <= timestamp <= to`, ascending by timestamp.
    async fn fetch_range(
        &self,
        metric: MetricKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryRecord>>;

    /// Deletes records of every metric with `timestamp < cutoff`. Returns rows removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

pub struct HistoryRepo {
    pool: SqlitePool,
}

impl HistoryRepo {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database; a single connection so every query sees the same data.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (key TEXT PRIMARY KEY, value INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO schema_version (key, value) VALUES ('metric_samples', $1)")
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                metadata TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_samples_metric_created_at ON metric_samples(metric, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_created_at ON metric_samples(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM metric_samples")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    /// Most recent `limit` samples of `metric`, returned oldest first.
    pub async fn get_recent(
        &self,
        metric: MetricKind,
        limit: u32,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            "SELECT created_at, metric, value, metadata FROM metric_samples
             WHERE metric = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(metric.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_row(&row)?);
        }
        out.reverse();
        Ok(out)
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<HistoryRecord> {
        let created_at: i64 = row.try_get("created_at")?;
        let metric: String = row.try_get("metric")?;
        let value: f64 = row.try_get("value")?;
        let metadata: Option<String> = row.try_get("metadata")?;

        let timestamp = DateTime::from_timestamp_millis(created_at)
            .ok_or_else(|| anyhow::anyhow!("created_at out of range: {}", created_at))?;
        Ok(HistoryRecord {
            metric: metric.parse()?,
            value,
            timestamp,
            metadata: metadata.as_deref().map(parse_metadata).unwrap_or_default(),
        })
    }
}

/// On corrupt metadata return empty and log.
fn parse_metadata(text: &str) -> BTreeMap<String, String> {
    serde_json::from_str(text).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "metadata json (corrupt), using empty");
        BTreeMap::new()
    })
}

#[async_trait]
impl HistoryStore for HistoryRepo {
    #[instrument(skip(self, records), fields(repo = "history", operation = "insert_batch", records_count = records.len()))]
    async fn insert_batch(&self, records: &[HistoryRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for r in records {
            let metadata = if r.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&r.metadata)?)
            };
            sqlx::query(
                "INSERT INTO metric_samples (created_at, metric, value, metadata) VALUES ($1, $2, $3, $4)",
            )
            .bind(r.timestamp.timestamp_millis())
            .bind(r.metric.as_str())
            .bind(r.value)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "history", operation = "fetch_range"))]
    async fn fetch_range(
        &self,
        metric: MetricKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            "SELECT created_at, metric, value, metadata FROM metric_samples
             WHERE metric = $1 AND created_at >= $2 AND created_at <= $3
             ORDER BY created_at ASC, id ASC",
        )
        .bind(metric.as_str())
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "delete_before"))]
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let r = sqlx::query("DELETE FROM metric_samples WHERE created_at < $1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}
