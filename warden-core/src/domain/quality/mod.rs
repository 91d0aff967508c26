// warden-core/src/domain/quality/mod.rs
//
// Comprehensive quality signals over the loaded table (freshness,
// completeness, validity, uniqueness) and the deterministic health
// indicator derived from them plus the run outcome. Everything here is
// math; `safe_to_use` in particular is never produced by anything else.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::profile::TableProfile;
use crate::domain::table::{ColumnType, Table, Value};
use crate::domain::verdict::{GateIssue, RunStatus};

const FRESH_AGE_HOURS: f64 = 24.0;
const EXTREME_SIGMA: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Unknown,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessMetric {
    pub score: f64,
    pub status: String,
    /// Per timestamp-like column: age of the newest record in hours.
    pub columns: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessMetric {
    pub score: f64,
    pub status: String,
    pub total_null_cells: usize,
    pub total_cells: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidityMetric {
    pub score: f64,
    pub status: String,
    /// Rows holding a value beyond 5 sigma of its column mean.
    pub extreme_outlier_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniquenessMetric {
    pub score: f64,
    pub status: String,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub freshness: FreshnessMetric,
    pub completeness: CompletenessMetric,
    pub validity: ValidityMetric,
    pub uniqueness: UniquenessMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub row_count: usize,
    pub column_count: usize,
    pub overall_health_score: f64,
    pub health_status: HealthStatus,
    pub metrics: QualityMetrics,
}

pub struct QualityAssessor;

impl QualityAssessor {
    pub fn assess(table: &Table, profile: &TableProfile) -> QualityReport {
        let freshness = Self::freshness(table);
        let completeness = Self::completeness(table);
        let validity = Self::validity(table, profile);
        let uniqueness = Self::uniqueness(table);

        let overall = (freshness.score + completeness.score + validity.score + uniqueness.score)
            / 4.0;
        let health_status = if overall >= 90.0 {
            HealthStatus::Healthy
        } else if overall >= 70.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        };

        QualityReport {
            row_count: table.rows_loaded,
            column_count: table.columns.len(),
            overall_health_score: overall,
            health_status,
            metrics: QualityMetrics {
                freshness,
                completeness,
                validity,
                uniqueness,
            },
        }
    }

    /// Age of the newest record per timestamp-like column. Columns are
    /// timestamp-like when typed as timestamps or named like one.
    fn freshness(table: &Table) -> FreshnessMetric {
        let mut columns = BTreeMap::new();
        let now = Utc::now().naive_utc();

        for col in &table.columns {
            let looks_temporal = col.dtype == ColumnType::Timestamp
                || col.name.to_lowercase().contains("date")
                || col.name.to_lowercase().contains("time");
            if !looks_temporal {
                continue;
            }
            let newest = col
                .values
                .iter()
                .filter_map(|v| match v {
                    Value::Timestamp(ts) => Some(*ts),
                    _ => None,
                })
                .max();
            if let Some(newest) = newest {
                let age_hours = (now - newest).num_seconds() as f64 / 3600.0;
                columns.insert(col.name.clone(), age_hours);
            }
        }

        if columns.is_empty() {
            return FreshnessMetric {
                score: 100.0,
                status: "UNKNOWN".into(),
                columns,
            };
        }
        let fresh = columns.values().filter(|age| **age < FRESH_AGE_HOURS).count();
        let score = (fresh as f64 / columns.len() as f64) * 100.0;
        FreshnessMetric {
            score,
            status: if score >= 80.0 { "FRESH" } else { "STALE" }.into(),
            columns,
        }
    }

    fn completeness(table: &Table) -> CompletenessMetric {
        let total_cells: usize = table.columns.len() * table.rows_loaded;
        let total_null_cells: usize = table.columns.iter().map(|c| c.null_count()).sum();
        let score = if total_cells == 0 {
            100.0
        } else {
            100.0 * (1.0 - total_null_cells as f64 / total_cells as f64)
        };
        CompletenessMetric {
            score,
            status: if score >= 95.0 {
                "COMPLETE"
            } else if score >= 80.0 {
                "MOSTLY_COMPLETE"
            } else {
                "INCOMPLETE"
            }
            .into(),
            total_null_cells,
            total_cells,
        }
    }

    /// Rows with a value beyond 5 sigma of its column mean are suspect.
    fn validity(table: &Table, profile: &TableProfile) -> ValidityMetric {
        let mut extreme_rows = std::collections::HashSet::new();
        for col in &table.columns {
            let Some(stats) = profile.columns.get(&col.name) else {
                continue;
            };
            let (Some(mean), Some(std)) = (stats.mean, stats.std) else {
                continue;
            };
            if std <= f64::EPSILON {
                continue;
            }
            for (row, value) in col.numeric_values() {
                if ((value - mean) / std).abs() > EXTREME_SIGMA {
                    extreme_rows.insert(row);
                }
            }
        }
        let score = if table.rows_loaded == 0 {
            100.0
        } else {
            100.0 * (1.0 - extreme_rows.len() as f64 / table.rows_loaded as f64)
        };
        ValidityMetric {
            score,
            status: if score >= 95.0 { "VALID" } else { "SUSPECT" }.into(),
            extreme_outlier_rows: extreme_rows.len(),
        }
    }

    /// Whole-row duplicate detection via the canonical key of every cell.
    fn uniqueness(table: &Table) -> UniquenessMetric {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = 0usize;
        for row in 0..table.rows_loaded {
            let key: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    c.values
                        .get(row)
                        .and_then(Value::as_key)
                        .unwrap_or_default()
                })
                .collect();
            if !seen.insert(key.join("\u{1f}")) {
                duplicates += 1;
            }
        }
        let score = if table.rows_loaded == 0 {
            100.0
        } else {
            100.0 * (1.0 - duplicates as f64 / table.rows_loaded as f64)
        };
        UniquenessMetric {
            score,
            status: if duplicates == 0 { "UNIQUE" } else { "DUPLICATED" }.into(),
            duplicate_rows: duplicates,
        }
    }
}

// ── Health indicator ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIndicator {
    pub status: HealthStatus,
    pub score: f64,
    pub badge: String,
    /// Never inferred from anything but the math below. FAIL is never safe.
    pub safe_to_use: bool,
    pub issue_count: usize,
    pub issues: Vec<String>,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub risk_assessment: String,
}

impl HealthIndicator {
    pub fn calculate(
        quality: Option<&QualityReport>,
        status: RunStatus,
        warnings: &[GateIssue],
        critical_errors: &[GateIssue],
    ) -> HealthIndicator {
        let mut scores = Vec::new();
        let mut issues: Vec<String> = Vec::new();

        if let Some(q) = quality {
            scores.push(q.overall_health_score);
            match q.health_status {
                HealthStatus::Critical => issues.push("Critical quality issues detected".into()),
                HealthStatus::Degraded => issues.push("Some quality metrics are degraded".into()),
                _ => {}
            }
        }

        match status {
            RunStatus::Pass | RunStatus::Unchanged => scores.push(100.0),
            RunStatus::PassWithWarnings | RunStatus::ContractMissing => {
                scores.push(70.0);
                issues.extend(warnings.iter().map(|w| w.message.clone()));
            }
            RunStatus::Fail => {
                scores.push(0.0);
                issues.extend(critical_errors.iter().map(|e| e.message.clone()));
            }
        }

        let score = if scores.is_empty() {
            50.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let (health, badge, mut safe_to_use) = if score >= 90.0 {
            (HealthStatus::Healthy, "OK", true)
        } else if score >= 70.0 {
            (HealthStatus::Degraded, "WARN", true)
        } else {
            (HealthStatus::Critical, "BLOCK", false)
        };
        // Hard override: a failed run is never safe, whatever the score
        if status == RunStatus::Fail {
            safe_to_use = false;
        }

        let (summary, recommendations, risk) = if score >= 90.0 {
            (
                "Data is healthy and ready for production use".to_string(),
                vec![
                    "Continue monitoring for any degradation".to_string(),
                    "No immediate action required".to_string(),
                ],
                "Low",
            )
        } else if score >= 70.0 {
            (
                "Data has minor issues but is usable with caution".to_string(),
                vec![
                    "Review the reported warnings".to_string(),
                    "Consider tightening the contract".to_string(),
                ],
                "Medium",
            )
        } else {
            (
                "Pipeline halted or data quality is critically degraded".to_string(),
                vec![
                    "Fix critical violations immediately".to_string(),
                    "Review the contract or the data source".to_string(),
                ],
                "High",
            )
        };

        let issue_count = issues.len();
        issues.truncate(5);

        HealthIndicator {
            status: health,
            score,
            badge: badge.to_string(),
            safe_to_use,
            issue_count,
            issues,
            summary,
            recommendations,
            risk_assessment: risk.to_string(),
        }
    }
}
