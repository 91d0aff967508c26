// warden-core/src/application/report.rs
//
// Persists one verdict document per run into the reports directory.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::domain::verdict::VerdictReport;
use crate::error::WardenError;
use crate::infrastructure::fs::commit_json;

pub struct ReportWriter {
    reports_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Write `monitor_report_<YYYYMMDD_HHMMSS>.json`. Multiple runs within
    /// one second get a numeric suffix instead of clobbering each other.
    pub fn write(&self, report: &VerdictReport) -> Result<PathBuf, WardenError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");

        let mut path = self.reports_dir.join(format!("monitor_report_{stamp}.json"));
        let mut n = 1;
        while path.exists() {
            path = self
                .reports_dir
                .join(format!("monitor_report_{stamp}_{n}.json"));
            n += 1;
        }

        commit_json(&path, report)?;
        info!(path = ?path, "Report saved");
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::lineage::TablePriority;
    use crate::domain::verdict::{RunStatus, SchemaEvolution};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn report() -> VerdictReport {
        VerdictReport {
            timestamp: chrono::Utc::now(),
            file: "data/landing/t.csv".into(),
            table_name: "t".into(),
            status: RunStatus::Pass,
            execution_time: "0.1s".into(),
            critical_errors: vec![],
            warnings: vec![],
            stats_summary: BTreeMap::new(),
            quarantine_indices: vec![],
            execution_log: vec![],
            quality_metrics: None,
            health_indicator: None,
            table_priority: TablePriority::default(),
            seasonal_analysis: None,
            consistency_result: None,
            schema_evolution: SchemaEvolution::default(),
            inferred_contract: None,
            active_contract: None,
        }
    }

    #[test]
    fn test_write_and_uniquify() {
        let dir = tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        let first = writer.write(&report()).unwrap();
        let second = writer.write(&report()).unwrap();
        assert!(first.exists());
        assert!(second.exists());
        assert_ne!(first, second);

        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("monitor_report_"));
        assert!(name.ends_with(".json"));

        // Round-trips as a verdict document
        let content = std::fs::read_to_string(first).unwrap();
        let parsed: VerdictReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.status, RunStatus::Pass);
    }
}
