// SQLite time-series store. Four flat tables: network_stats, system_stats,
// speed_tests, system_events. Appends are transactional and immediately
// queryable; window queries are clamped to MAX_WINDOW_MS and returned in
// ascending timestamp order.

use crate::models::{
    EventKind, MetricKind, Sample, SpeedTestResult, StatFamily, SystemEvent, WindowDuration, now_ms,
};
use futures_util::{Stream, StreamExt};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Upper bound on any single window query (normalized, not rejected).
pub const MAX_WINDOW_MS: i64 = 24 * 3600 * 1000;

const INSERT_NETWORK_STAT: &str =
    "INSERT INTO network_stats (timestamp, metric_kind, value, unit) VALUES ($1, $2, $3, $4)";
const INSERT_SYSTEM_STAT: &str =
    "INSERT INTO system_stats (timestamp, metric_kind, value, unit) VALUES ($1, $2, $3, $4)";

const STREAM_NETWORK_STATS: &str =
    "SELECT timestamp, metric_kind, value, unit FROM network_stats ORDER BY id ASC";
const STREAM_SYSTEM_STATS: &str =
    "SELECT timestamp, metric_kind, value, unit FROM system_stats ORDER BY id ASC";
const STREAM_SPEED_TESTS: &str =
    "SELECT timestamp, download_mbps, upload_mbps, server_id FROM speed_tests ORDER BY id ASC";
const STREAM_SYSTEM_EVENTS: &str =
    "SELECT timestamp, event_kind, message FROM system_events ORDER BY id ASC";

pub struct MetricsRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

impl MetricsRepo {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        retention_days: u32,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        let retention_ms = (retention_days as i64) * 24 * 60 * 60 * 1000;
        Ok(Self { pool, retention_ms })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        for table in ["network_stats", "system_stats"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp INTEGER NOT NULL,
                    metric_kind TEXT NOT NULL,
                    value REAL NOT NULL,
                    unit TEXT NOT NULL
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_kind_ts ON {table}(metric_kind, timestamp)"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS speed_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                download_mbps REAL NOT NULL,
                upload_mbps REAL NOT NULL,
                server_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_speed_tests_ts ON speed_tests(timestamp)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                event_kind TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_system_events_ts ON system_events(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Durable batch append; rows are queryable as soon as this returns.
    #[instrument(skip(self, samples), fields(repo = "metrics", operation = "append_samples", samples_count = samples.len()))]
    pub async fn append_samples(&self, samples: &[Sample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            let insert = match s.metric_kind.family() {
                StatFamily::Network => INSERT_NETWORK_STAT,
                StatFamily::System => INSERT_SYSTEM_STAT,
            };
            sqlx::query(insert)
                .bind(s.timestamp)
                .bind(s.metric_kind.as_str())
                .bind(s.value)
                .bind(&s.unit)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, result), fields(repo = "metrics", operation = "append_speed_test"))]
    pub async fn append_speed_test(&self, result: &SpeedTestResult) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO speed_tests (timestamp, download_mbps, upload_mbps, server_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(result.timestamp)
        .bind(result.download_mbps)
        .bind(result.upload_mbps)
        .bind(&result.server_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, event), fields(repo = "metrics", operation = "append_event", event_kind = %event.event_kind))]
    pub async fn append_event(&self, event: &SystemEvent) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO system_events (timestamp, event_kind, message) VALUES ($1, $2, $3)")
            .bind(event.timestamp)
            .bind(event.event_kind.as_str())
            .bind(&event.message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All samples of `kind` with timestamp in [start_ms, end_ms], ascending.
    /// A window wider than MAX_WINDOW_MS is clamped to the trailing 24h of
    /// the requested range; a reversed range yields an empty result.
    #[instrument(skip(self), fields(repo = "metrics", operation = "query_window", kind = %kind))]
    pub async fn query_window(
        &self,
        kind: MetricKind,
        start_ms: i64,
        end_ms: i64,
    ) -> anyhow::Result<Vec<Sample>> {
        if start_ms > end_ms {
            return Ok(Vec::new());
        }
        let start_ms = start_ms.max(end_ms - MAX_WINDOW_MS);
        let select = match kind.family() {
            StatFamily::Network => {
                "SELECT timestamp, metric_kind, value, unit FROM network_stats
                 WHERE metric_kind = $1 AND timestamp >= $2 AND timestamp <= $3
                 ORDER BY timestamp ASC"
            }
            StatFamily::System => {
                "SELECT timestamp, metric_kind, value, unit FROM system_stats
                 WHERE metric_kind = $1 AND timestamp >= $2 AND timestamp <= $3
                 ORDER BY timestamp ASC"
            }
        };
        let rows = sqlx::query(select)
            .bind(kind.as_str())
            .bind(start_ms)
            .bind(end_ms)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_sample_row(&row)?);
        }
        Ok(out)
    }

    /// Presentation-layer window: (timestamp, value) pairs for the trailing
    /// duration, ascending.
    pub async fn get_window(
        &self,
        kind: MetricKind,
        duration: WindowDuration,
    ) -> anyhow::Result<Vec<(i64, f64)>> {
        let end = now_ms();
        let start = end - duration.as_millis();
        let samples = self.query_window(kind, start, end).await?;
        Ok(samples.into_iter().map(|s| (s.timestamp, s.value)).collect())
    }

    /// Most recent speed tests, newest first.
    pub async fn recent_speed_tests(&self, limit: u32) -> anyhow::Result<Vec<SpeedTestResult>> {
        let rows = sqlx::query(
            "SELECT timestamp, download_mbps, upload_mbps, server_id FROM speed_tests
             ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_speed_test_row(&row)?);
        }
        Ok(out)
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: u32) -> anyhow::Result<Vec<SystemEvent>> {
        let rows = sqlx::query(
            "SELECT timestamp, event_kind, message FROM system_events ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_event_row(&row)?);
        }
        Ok(out)
    }

    /// Deletes rows older than the cutoff from all four tables in one
    /// transaction, so no concurrent query observes a partial prune.
    #[instrument(skip(self), fields(repo = "metrics", operation = "prune"))]
    pub async fn prune(&self, older_than_ms: i64) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;
        for table in ["network_stats", "system_stats", "speed_tests", "system_events"] {
            let r = sqlx::query(&format!("DELETE FROM {table} WHERE timestamp < $1"))
                .bind(older_than_ms)
                .execute(&mut *tx)
                .await?;
            deleted += r.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Retention-based prune used by the housekeeping worker.
    pub async fn prune_old_data(&self) -> anyhow::Result<u64> {
        self.prune(now_ms() - self.retention_ms).await
    }

    /// Reclaim space after deletes (run on the vacuum schedule).
    #[instrument(skip(self), fields(repo = "metrics", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Full-table sample stream in insertion order, for incremental export.
    pub fn stream_samples(
        &self,
        family: StatFamily,
    ) -> impl Stream<Item = anyhow::Result<Sample>> + '_ {
        let select = match family {
            StatFamily::Network => STREAM_NETWORK_STATS,
            StatFamily::System => STREAM_SYSTEM_STATS,
        };
        sqlx::query(select)
            .fetch(&self.pool)
            .map(|row| parse_sample_row(&row?))
    }

    pub fn stream_speed_tests(&self) -> impl Stream<Item = anyhow::Result<SpeedTestResult>> + '_ {
        sqlx::query(STREAM_SPEED_TESTS)
            .fetch(&self.pool)
            .map(|row| parse_speed_test_row(&row?))
    }

    pub fn stream_events(&self) -> impl Stream<Item = anyhow::Result<SystemEvent>> + '_ {
        sqlx::query(STREAM_SYSTEM_EVENTS)
            .fetch(&self.pool)
            .map(|row| parse_event_row(&row?))
    }
}

fn parse_sample_row(row: &SqliteRow) -> anyhow::Result<Sample> {
    let timestamp: i64 = row.try_get("timestamp")?;
    let kind_str: String = row.try_get("metric_kind")?;
    let value: f64 = row.try_get("value")?;
    let unit: String = row.try_get("unit")?;
    Ok(Sample {
        timestamp,
        metric_kind: MetricKind::from_str(&kind_str)?,
        value,
        unit,
    })
}

fn parse_speed_test_row(row: &SqliteRow) -> anyhow::Result<SpeedTestResult> {
    Ok(SpeedTestResult {
        timestamp: row.try_get("timestamp")?,
        download_mbps: row.try_get("download_mbps")?,
        upload_mbps: row.try_get("upload_mbps")?,
        server_id: row.try_get("server_id")?,
    })
}

fn parse_event_row(row: &SqliteRow) -> anyhow::Result<SystemEvent> {
    let kind_str: String = row.try_get("event_kind")?;
    Ok(SystemEvent {
        timestamp: row.try_get("timestamp")?,
        event_kind: EventKind::from_str(&kind_str)?,
        message: row.try_get("message")?,
    })
}
