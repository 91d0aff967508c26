// warden-core/src/application/scan.rs
//
// Fleet evaluation: one run per discovered table, executed concurrently
// across tables (the state machine inside each run stays strictly
// sequential). Smart scan short-circuits a table to UNCHANGED when its
// landing file's mtime matches the registry within a small epsilon,
// without opening the file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use futures::StreamExt;
use tracing::{info, warn};

use crate::application::orchestrator::{Gatekeeper, RunOptions};
use crate::domain::lineage::TablePriority;
use crate::domain::verdict::{RunStatus, SchemaEvolution, VerdictReport};
use crate::error::WardenError;
use crate::infrastructure::probe::FileProbe;

/// Max tables gated at once.
const SCAN_CONCURRENCY: usize = 8;

const DATA_EXTENSIONS: [&str; 3] = ["csv", "parquet", "json"];

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub table: String,
    pub report: Option<VerdictReport>,
    pub error: Option<String>,
}

pub struct FleetScan;

impl FleetScan {
    /// Evaluate every table with a discoverable contract. Returns one
    /// outcome per table; a missing landing file or a per-table error is
    /// an outcome, not an abort.
    pub async fn run_all(
        gatekeeper: &Gatekeeper,
        skip_unchanged: bool,
    ) -> Result<Vec<ScanOutcome>, WardenError> {
        let discovery = gatekeeper.contract_store().list()?;
        for diagnostic in &discovery.diagnostics {
            warn!(path = ?diagnostic.path, "Contract skipped during scan: {}", diagnostic.reason);
        }

        let tables: Vec<String> = discovery
            .contracts
            .iter()
            .map(|(_, c)| c.table_name.clone())
            .collect();
        info!(count = tables.len(), "Fleet scan starting");

        let futures = tables.into_iter().map(|table| async move {
            Self::scan_table(gatekeeper, &table, skip_unchanged).await
        });
        let outcomes: Vec<ScanOutcome> = futures::stream::iter(futures)
            .buffer_unordered(SCAN_CONCURRENCY)
            .collect()
            .await;

        let mut outcomes = outcomes;
        outcomes.sort_by(|a, b| a.table.cmp(&b.table));
        Ok(outcomes)
    }

    async fn scan_table(
        gatekeeper: &Gatekeeper,
        table: &str,
        skip_unchanged: bool,
    ) -> ScanOutcome {
        let Some(file) = Self::landing_file(gatekeeper, table) else {
            return ScanOutcome {
                table: table.to_string(),
                report: None,
                error: Some("no landing file found".into()),
            };
        };

        if skip_unchanged {
            if let Some(report) = Self::check_unchanged(gatekeeper, table, &file).await {
                return ScanOutcome {
                    table: table.to_string(),
                    report: Some(report),
                    error: None,
                };
            }
        }

        match gatekeeper.run(&file, table, RunOptions::default()).await {
            Ok(report) => ScanOutcome {
                table: table.to_string(),
                report: Some(report),
                error: None,
            },
            Err(e) => ScanOutcome {
                table: table.to_string(),
                report: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn landing_file(gatekeeper: &Gatekeeper, table: &str) -> Option<PathBuf> {
        let landing = gatekeeper
            .config()
            .resolve(gatekeeper.project_dir(), &gatekeeper.config().landing_dir);
        DATA_EXTENSIONS
            .iter()
            .map(|ext| landing.join(format!("{table}.{ext}")))
            .find(|p| p.exists())
    }

    /// Smart scan: mtime equal to the registry's record (within epsilon)
    /// means the file was not touched since the last verdict. Performance
    /// optimisation only; disabled by the caller at will.
    async fn check_unchanged(
        gatekeeper: &Gatekeeper,
        table: &str,
        file: &std::path::Path,
    ) -> Option<VerdictReport> {
        let entry = gatekeeper
            .baseline_store()
            .registry_entry(table)
            .await
            .ok()??;
        let recorded = entry.last_file_mtime?;
        let current = FileProbe::mtime_epoch(file).ok()?;
        let epsilon = gatekeeper.config().smart_scan_epsilon_ms as f64 / 1000.0;
        if (current - recorded).abs() > epsilon {
            return None;
        }

        info!(table, "Smart scan: file unchanged, skipping evaluation");
        Some(VerdictReport {
            timestamp: Utc::now(),
            file: file.display().to_string(),
            table_name: table.to_string(),
            status: RunStatus::Unchanged,
            execution_time: "0.00s".into(),
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
        })
    }
}
