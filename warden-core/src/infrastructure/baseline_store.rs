// warden-core/src/infrastructure/baseline_store.rs
//
// Durable run memory on embedded DuckDB: metric history, run history,
// learned thresholds and the dataset registry, in a single database file.
//
// Concurrency contract: the connection mutex makes each statement atomic;
// cross-statement write sequences on one table are serialized through
// `table_lock`, so baseline recomputations stay monotonic. Readers get a
// consistent snapshot per statement.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::anomaly::{Baseline, BaselineKind, SeasonalPattern};
use crate::domain::lineage::Criticality;
use crate::domain::verdict::{RunRecord, RunStatus};
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;

/// Seasonal baselines need this many same-weekday samples.
const SEASONAL_MIN_SAMPLES: i64 = 3;
/// Global fallback window over the most recent samples of any weekday.
const GLOBAL_WINDOW: i64 = 30;
/// Monthly patterns are sparser; two samples are enough to describe one.
const MONTHLY_MIN_SAMPLES: i64 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metric_history (
    run_id VARCHAR,
    timestamp TIMESTAMP,
    table_name VARCHAR,
    metric_name VARCHAR,
    metric_value DOUBLE,
    day_of_week INTEGER
);
CREATE INDEX IF NOT EXISTS idx_metrics
    ON metric_history(table_name, metric_name, day_of_week);

CREATE TABLE IF NOT EXISTS run_history (
    run_id VARCHAR,
    timestamp TIMESTAMP,
    table_name VARCHAR,
    file_hash VARCHAR,
    row_count BIGINT,
    status VARCHAR,
    quality_score DOUBLE,
    anomaly_count INTEGER,
    z_score_max DOUBLE,
    duration_ms BIGINT,
    reason VARCHAR,
    violations VARCHAR,
    profile VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_runs
    ON run_history(table_name, timestamp);

CREATE TABLE IF NOT EXISTS learned_thresholds (
    table_name VARCHAR,
    metric_name VARCHAR,
    baseline_mean DOUBLE,
    baseline_std DOUBLE,
    baseline_kind VARCHAR,
    last_updated TIMESTAMP,
    sample_count BIGINT
);

CREATE TABLE IF NOT EXISTS dataset_registry (
    table_name VARCHAR PRIMARY KEY,
    contract_path VARCHAR,
    lifecycle VARCHAR,
    criticality VARCHAR,
    last_scanned TIMESTAMP,
    last_status VARCHAR,
    last_file_mtime DOUBLE,
    scan_count INTEGER DEFAULT 0
);
";

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub table_name: String,
    pub contract_path: Option<String>,
    pub lifecycle: String,
    pub criticality: Criticality,
    pub last_scanned: Option<DateTime<Utc>>,
    pub last_status: Option<RunStatus>,
    pub last_file_mtime: Option<f64>,
    pub scan_count: u64,
}

#[derive(Debug, Clone)]
pub struct RegistryUpdate {
    pub table_name: String,
    pub contract_path: Option<String>,
    pub lifecycle: String,
    pub criticality: Criticality,
    pub status: Option<RunStatus>,
    pub file_mtime: Option<f64>,
}

pub struct BaselineStore {
    conn: Arc<Mutex<Connection>>,
    table_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BaselineStore {
    pub fn open(db_path: &Path) -> Result<Self, InfrastructureError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn open_in_memory() -> Result<Self, InfrastructureError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table_locks: Mutex::new(HashMap::new()),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, WardenError> {
        self.conn
            .lock()
            .map_err(|_| WardenError::InternalError("baseline store mutex poisoned".into()))
    }

    /// Per-table write lock. Hold it across the metric-append + run-record +
    /// registry sequence so concurrent runs on the same table cannot
    /// interleave their learning.
    pub fn table_lock(&self, table: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.table_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ── Metric history ───────────────────────────────────────────────

    /// Append one run's metrics. Append-only; atomic per metric.
    pub async fn append_samples(
        &self,
        run_id: Uuid,
        table: &str,
        metrics: &BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), WardenError> {
        let day_of_week = timestamp.weekday().num_days_from_monday() as i32;
        let ts = fmt_ts(timestamp);
        let conn = self.lock_conn()?;
        for (metric_name, value) in metrics {
            conn.execute(
                "INSERT INTO metric_history
                 (run_id, timestamp, table_name, metric_name, metric_value, day_of_week)
                 VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?)",
                params![run_id.to_string(), ts, table, metric_name, *value, day_of_week],
            )
            .map_err(InfrastructureError::from)?;
        }
        debug!(table, count = metrics.len(), "Appended metric samples");
        Ok(())
    }

    /// Statistical baseline for one metric: seasonal when at least three
    /// samples exist for the same weekday, else global over the most recent
    /// thirty samples, else initializing.
    pub async fn seasonal_baseline(
        &self,
        table: &str,
        metric: &str,
        day_of_week: u32,
    ) -> Result<Baseline, WardenError> {
        let conn = self.lock_conn()?;

        let (mean, std, count): (Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "SELECT AVG(metric_value), STDDEV(metric_value), COUNT(*)
                 FROM metric_history
                 WHERE table_name = ? AND metric_name = ? AND day_of_week = ?",
                params![table, metric, day_of_week as i32],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(InfrastructureError::from)?;

        if count >= SEASONAL_MIN_SAMPLES {
            return Ok(Baseline {
                mean: mean.unwrap_or(0.0),
                std: std.unwrap_or(0.0),
                kind: BaselineKind::Seasonal,
                sample_count: count as u64,
            });
        }

        let (mean, std, count): (Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "WITH recent_history AS (
                     SELECT metric_value
                     FROM metric_history
                     WHERE table_name = ? AND metric_name = ?
                     ORDER BY timestamp DESC
                     LIMIT ?
                 )
                 SELECT AVG(metric_value), STDDEV(metric_value), COUNT(*)
                 FROM recent_history",
                params![table, metric, GLOBAL_WINDOW],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(InfrastructureError::from)?;

        if count >= SEASONAL_MIN_SAMPLES {
            return Ok(Baseline {
                mean: mean.unwrap_or(0.0),
                std: std.unwrap_or(0.0),
                kind: BaselineKind::Global,
                sample_count: count as u64,
            });
        }

        Ok(Baseline::initializing())
    }

    /// Learned weekday pattern for the seasonal detector.
    pub async fn weekday_pattern(
        &self,
        table: &str,
        metric: &str,
        day_of_week: u32,
    ) -> Result<Option<SeasonalPattern>, WardenError> {
        let conn = self.lock_conn()?;
        let (mean, std, count): (Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "SELECT AVG(metric_value), STDDEV(metric_value), COUNT(*)
                 FROM metric_history
                 WHERE table_name = ? AND metric_name = ? AND day_of_week = ?",
                params![table, metric, day_of_week as i32],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(InfrastructureError::from)?;
        if count < SEASONAL_MIN_SAMPLES {
            return Ok(None);
        }
        Ok(Some(SeasonalPattern {
            expected_mean: mean.unwrap_or(0.0),
            expected_std: std.unwrap_or(0.0),
            sample_count: count as u64,
        }))
    }

    /// Learned month-of-year pattern (tax-season style effects).
    pub async fn monthly_pattern(
        &self,
        table: &str,
        metric: &str,
        month: u32,
    ) -> Result<Option<SeasonalPattern>, WardenError> {
        let conn = self.lock_conn()?;
        let (mean, std, count): (Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "SELECT AVG(metric_value), STDDEV(metric_value), COUNT(*)
                 FROM metric_history
                 WHERE table_name = ? AND metric_name = ? AND month(timestamp) = ?",
                params![table, metric, month as i32],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(InfrastructureError::from)?;
        if count < MONTHLY_MIN_SAMPLES {
            return Ok(None);
        }
        Ok(Some(SeasonalPattern {
            expected_mean: mean.unwrap_or(0.0),
            expected_std: std.unwrap_or(0.0),
            sample_count: count as u64,
        }))
    }

    // ── Run history ──────────────────────────────────────────────────

    pub async fn record_run(&self, record: &RunRecord) -> Result<(), WardenError> {
        let violations =
            serde_json::to_string(&record.violations).map_err(InfrastructureError::Json)?;
        let profile = serde_json::to_string(&record.profile).map_err(InfrastructureError::Json)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO run_history
             (run_id, timestamp, table_name, file_hash, row_count, status,
              quality_score, anomaly_count, z_score_max, duration_ms, reason,
              violations, profile)
             VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.run_id.to_string(),
                fmt_ts(record.timestamp),
                record.table_name,
                record.file_hash,
                record.row_count as i64,
                record.status.as_str(),
                record.quality_score,
                record.anomaly_count as i32,
                record.z_score_max,
                record.duration_ms as i64,
                record.reason,
                violations,
                profile,
            ],
        )
        .map_err(InfrastructureError::from)?;
        Ok(())
    }

    pub async fn run_history(
        &self,
        table: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, WardenError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT run_id, CAST(timestamp AS VARCHAR), table_name, file_hash,
                    row_count, status, quality_score, anomaly_count,
                    z_score_max, duration_ms, reason, violations, profile
             FROM run_history
             {}
             ORDER BY timestamp DESC
             LIMIT ?",
            if table.is_some() {
                "WHERE table_name = ?"
            } else {
                ""
            }
        );
        let mut stmt = conn.prepare(&sql).map_err(InfrastructureError::from)?;

        let map_row = |row: &duckdb::Row<'_>| -> Result<RunRecord, duckdb::Error> {
            let run_id: String = row.get(0)?;
            let ts: String = row.get(1)?;
            let status: String = row.get(5)?;
            let violations: Option<String> = row.get(11)?;
            let profile: Option<String> = row.get(12)?;
            Ok(RunRecord {
                run_id: Uuid::parse_str(&run_id).unwrap_or_else(|_| Uuid::nil()),
                timestamp: parse_ts(&ts),
                table_name: row.get(2)?,
                file_hash: row.get(3)?,
                row_count: row.get::<_, i64>(4)? as u64,
                status: status.parse().unwrap_or(RunStatus::Fail),
                quality_score: row.get(6)?,
                anomaly_count: row.get::<_, i32>(7)? as u32,
                z_score_max: row.get(8)?,
                duration_ms: row.get::<_, i64>(9)? as u64,
                reason: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                violations: violations
                    .and_then(|v| serde_json::from_str(&v).ok())
                    .unwrap_or_default(),
                profile: profile
                    .and_then(|p| serde_json::from_str(&p).ok())
                    .unwrap_or_default(),
            })
        };

        let records = if let Some(table) = table {
            let rows = stmt
                .query_map(params![table, limit as i64], map_row)
                .map_err(InfrastructureError::from)?;
            rows.collect::<Result<Vec<_>, _>>()
        } else {
            let rows = stmt
                .query_map(params![limit as i64], map_row)
                .map_err(InfrastructureError::from)?;
            rows.collect::<Result<Vec<_>, _>>()
        }
        .map_err(InfrastructureError::from)?;

        Ok(records)
    }

    /// Content hashes already seen for a table, for duplicate detection.
    pub async fn known_hashes(&self, table: &str) -> Result<HashSet<String>, WardenError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT file_hash FROM run_history
                 WHERE table_name = ? AND file_hash IS NOT NULL",
            )
            .map_err(InfrastructureError::from)?;
        let rows = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .map_err(InfrastructureError::from)?;
        let hashes = rows
            .collect::<Result<HashSet<_>, _>>()
            .map_err(InfrastructureError::from)?;
        Ok(hashes)
    }

    // ── Learned thresholds ───────────────────────────────────────────

    /// Cache a resolved baseline. Delete-then-insert under the connection
    /// lock; one row per (table, metric).
    pub async fn upsert_threshold(
        &self,
        table: &str,
        metric: &str,
        baseline: &Baseline,
    ) -> Result<(), WardenError> {
        let kind = match baseline.kind {
            BaselineKind::Seasonal => "seasonal",
            BaselineKind::Global => "global",
            BaselineKind::Initializing => "initializing",
        };
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM learned_thresholds WHERE table_name = ? AND metric_name = ?",
            params![table, metric],
        )
        .map_err(InfrastructureError::from)?;
        conn.execute(
            "INSERT INTO learned_thresholds
             (table_name, metric_name, baseline_mean, baseline_std,
              baseline_kind, last_updated, sample_count)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), ?)",
            params![
                table,
                metric,
                baseline.mean,
                baseline.std,
                kind,
                fmt_ts(Utc::now()),
                baseline.sample_count as i64,
            ],
        )
        .map_err(InfrastructureError::from)?;
        Ok(())
    }

    /// Drop cached thresholds for a table. Called when its contract version
    /// changes; thresholds are derived state and recomputable.
    pub async fn invalidate_thresholds(&self, table: &str) -> Result<(), WardenError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM learned_thresholds WHERE table_name = ?",
            params![table],
        )
        .map_err(InfrastructureError::from)?;
        Ok(())
    }

    // ── Dataset registry ─────────────────────────────────────────────

    /// Compare-and-swap style upsert on `table_name`, incrementing
    /// `scan_count` and coalescing absent fields.
    pub async fn upsert_registry(&self, update: &RegistryUpdate) -> Result<(), WardenError> {
        let now = fmt_ts(Utc::now());
        let conn = self.lock_conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT scan_count FROM dataset_registry WHERE table_name = ?",
                params![update.table_name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(InfrastructureError::from)?;

        match existing {
            Some(scan_count) => {
                conn.execute(
                    "UPDATE dataset_registry SET
                         contract_path = ?,
                         lifecycle = ?,
                         criticality = ?,
                         last_scanned = CAST(? AS TIMESTAMP),
                         last_status = COALESCE(?, last_status),
                         last_file_mtime = COALESCE(?, last_file_mtime),
                         scan_count = ?
                     WHERE table_name = ?",
                    params![
                        update.contract_path,
                        update.lifecycle,
                        update.criticality.as_str(),
                        now,
                        update.status.map(|s| s.as_str()),
                        update.file_mtime,
                        scan_count + 1,
                        update.table_name,
                    ],
                )
                .map_err(InfrastructureError::from)?;
            }
            None => {
                conn.execute(
                    "INSERT INTO dataset_registry
                     (table_name, contract_path, lifecycle, criticality,
                      last_scanned, last_status, last_file_mtime, scan_count)
                     VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, 1)",
                    params![
                        update.table_name,
                        update.contract_path,
                        update.lifecycle,
                        update.criticality.as_str(),
                        now,
                        update.status.map(|s| s.as_str()),
                        update.file_mtime,
                    ],
                )
                .map_err(InfrastructureError::from)?;
            }
        }
        Ok(())
    }

    pub async fn registry_entry(&self, table: &str) -> Result<Option<RegistryEntry>, WardenError> {
        let conn = self.lock_conn()?;
        let entry = conn
            .query_row(
                "SELECT table_name, contract_path, lifecycle, criticality,
                        CAST(last_scanned AS VARCHAR), last_status,
                        last_file_mtime, scan_count
                 FROM dataset_registry WHERE table_name = ?",
                params![table],
                Self::map_registry_row,
            )
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(InfrastructureError::from)?;
        Ok(entry)
    }

    pub async fn registry_entries(&self) -> Result<Vec<RegistryEntry>, WardenError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT table_name, contract_path, lifecycle, criticality,
                        CAST(last_scanned AS VARCHAR), last_status,
                        last_file_mtime, scan_count
                 FROM dataset_registry ORDER BY table_name",
            )
            .map_err(InfrastructureError::from)?;
        let rows = stmt
            .query_map([], Self::map_registry_row)
            .map_err(InfrastructureError::from)?;
        let entries = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(InfrastructureError::from)?;
        Ok(entries)
    }

    fn map_registry_row(row: &duckdb::Row<'_>) -> Result<RegistryEntry, duckdb::Error> {
        let criticality: Option<String> = row.get(3)?;
        let last_scanned: Option<String> = row.get(4)?;
        let last_status: Option<String> = row.get(5)?;
        Ok(RegistryEntry {
            table_name: row.get(0)?,
            contract_path: row.get(1)?,
            lifecycle: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            criticality: criticality
                .and_then(|c| c.parse().ok())
                .unwrap_or(Criticality::Low),
            last_scanned: last_scanned.map(|ts| parse_ts(&ts)),
            last_status: last_status.and_then(|s| s.parse().ok()),
            last_file_mtime: row.get(6)?,
            scan_count: row.get::<_, i64>(7)?.max(0) as u64,
        })
    }
}

// Store write failures are logged and the run proceeds; this helper keeps
// that policy in one place.
pub fn log_store_failure(operation: &str, err: &WardenError) {
    warn!("Baseline store {operation} failed (run continues, learning skipped): {err}");
}
