// warden-core/src/domain/verdict/mod.rs
//
// The closed vocabulary of the gate: run statuses, severities, error kinds,
// the durable RunRecord and the full verdict document handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::anomaly::SeasonalAnalysis;
use crate::domain::consistency::ConsistencyResult;
use crate::domain::contract::ColumnSpec;
use crate::domain::lineage::TablePriority;
use crate::domain::profile::ColumnProfile;
use crate::domain::quality::{HealthIndicator, QualityReport};

/// Final status of one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pass,
    PassWithWarnings,
    Fail,
    ContractMissing,
    /// Smart-scan short-circuit: file mtime unchanged since last scan.
    Unchanged,
}

impl RunStatus {
    pub fn is_pass(&self) -> bool {
        matches!(
            self,
            RunStatus::Pass | RunStatus::PassWithWarnings | RunStatus::Unchanged
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::PassWithWarnings => "PASS_WITH_WARNINGS",
            RunStatus::Fail => "FAIL",
            RunStatus::ContractMissing => "CONTRACT_MISSING",
            RunStatus::Unchanged => "UNCHANGED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(RunStatus::Pass),
            "PASS_WITH_WARNINGS" => Ok(RunStatus::PassWithWarnings),
            "FAIL" => Ok(RunStatus::Fail),
            "CONTRACT_MISSING" => Ok(RunStatus::ContractMissing),
            "UNCHANGED" => Ok(RunStatus::Unchanged),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

/// What a stage tells the state machine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Continue,
    Stop,
    CriticalStop,
}

/// Machine-readable error taxonomy. Every issue the gate surfaces carries
/// exactly one of these tags next to its human reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeliness,
    LoadError,
    SchemaCritical,
    SchemaWarning,
    ConsistencyBreak,
    AnomalyCritical,
    AnomalyWarning,
    QualityBlock,
    InfraTransient,
    Cancelled,
    Timeout,
    Internal,
}

/// One surfaced issue: tag + reason. Lands in `critical_errors` or
/// `warnings` of the verdict, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateIssue {
    pub kind: ErrorKind,
    pub message: String,
}

impl GateIssue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Durable outcome of one run, persisted in the baseline store. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub table_name: String,
    pub file_hash: Option<String>,
    pub row_count: u64,
    pub status: RunStatus,
    /// Overall quality score in [0, 100].
    pub quality_score: f64,
    pub anomaly_count: u32,
    pub z_score_max: f64,
    pub duration_ms: u64,
    pub reason: String,
    pub violations: Vec<String>,
    pub profile: BTreeMap<String, ColumnProfile>,
}

/// One entry of the observable execution log: which stage ran, when, and
/// what it concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaEvolution {
    pub suggested_updates: Vec<ColumnSpec>,
}

/// The stable verdict document (one JSON file per run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictReport {
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub table_name: String,
    pub status: RunStatus,
    pub execution_time: String,
    pub critical_errors: Vec<GateIssue>,
    pub warnings: Vec<GateIssue>,
    pub stats_summary: BTreeMap<String, ColumnProfile>,
    /// Outlier row indices, capped at 100.
    pub quarantine_indices: Vec<usize>,
    pub execution_log: Vec<ExecutionStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_indicator: Option<HealthIndicator>,
    pub table_priority: TablePriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_analysis: Option<SeasonalAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_result: Option<ConsistencyResult>,
    pub schema_evolution: SchemaEvolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_contract: Option<String>,
}

impl VerdictReport {
    /// FAIL and critical_errors must imply each other.
    pub fn invariant_holds(&self) -> bool {
        (self.status == RunStatus::Fail) == !self.critical_errors.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let s = serde_json::to_string(&RunStatus::PassWithWarnings).unwrap();
        assert_eq!(s, "\"PASS_WITH_WARNINGS\"");
        let back: RunStatus = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(back, RunStatus::Fail);
    }

    #[test]
    fn test_status_roundtrip_from_str() {
        for status in [
            RunStatus::Pass,
            RunStatus::PassWithWarnings,
            RunStatus::Fail,
            RunStatus::ContractMissing,
            RunStatus::Unchanged,
        ] {
            let parsed: RunStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_error_kind_tag_is_snake_case() {
        let s = serde_json::to_string(&ErrorKind::ConsistencyBreak).unwrap();
        assert_eq!(s, "\"consistency_break\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
    }
}
