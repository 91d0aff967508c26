// warden-core/src/application/orchestrator.rs
//
// The verdict orchestrator: one run per (file, table) pair through the
// ordered state machine
//
//   LOCATE_CONTRACT -> PROBE_METADATA -> LOAD_DATA -> VALIDATE_SCHEMA
//     -> CHECK_CONSISTENCY -> PROFILE -> DETECT_ANOMALIES
//     -> DETECT_SEASONAL -> COMPOSE_VERDICT
//
// with short-circuit stops, per-stage deadlines and a cancellation token.
// Metrics are appended to the baseline store only after the verdict is
// composed, and only when schema validation did not critical-stop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::report::ReportWriter;
use crate::domain::anomaly::{AnomalyEngine, Baseline, SeasonalAnalysis, SeasonalDetector};
use crate::domain::consistency::{ConsistencyChecker, ConsistencyResult, ConsistencyStatus};
use crate::domain::contract::{Contract, ContractInferencer, SchemaRemediator};
use crate::domain::lineage::{Criticality, ImpactResolver};
use crate::domain::profile::{ColumnProfile, StatisticalProfiler};
use crate::domain::quality::{HealthIndicator, QualityAssessor, QualityReport};
use crate::domain::schema::{SchemaDiff, SchemaValidator};
use crate::domain::table::Table;
use crate::domain::verdict::{
    Decision, ErrorKind, ExecutionStep, GateIssue, RunRecord, RunStatus, SchemaEvolution,
    VerdictReport,
};
use crate::error::WardenError;
use crate::infrastructure::actuator::FileActuator;
use crate::infrastructure::alert::AlertRouter;
use crate::infrastructure::baseline_store::{
    log_store_failure, BaselineStore, RegistryUpdate,
};
use crate::infrastructure::config::GatekeeperConfig;
use crate::infrastructure::contract_store::ContractStore;
use crate::infrastructure::lineage::load_lineage_or_default;
use crate::infrastructure::loader::TabularLoader;
use crate::infrastructure::probe::FileProbe;
use crate::ports::{LogTransport, SchemaAdvisor, WarehouseLoader, WarehouseOutcome};

/// Per-run options. The cancellation token, when present, is honored at
/// every stage boundary and inside blocking waits.
#[derive(Default, Clone)]
pub struct RunOptions {
    pub cancel: Option<watch::Receiver<bool>>,
}

impl RunOptions {
    fn check_cancelled(&self, stage: &str) -> Result<(), WardenError> {
        if let Some(rx) = &self.cancel {
            if *rx.borrow() {
                return Err(WardenError::Cancelled(stage.to_string()));
            }
        }
        Ok(())
    }
}

/// Everything a run produced before actuation and persistence.
struct Evaluation {
    status: RunStatus,
    criticals: Vec<GateIssue>,
    warnings: Vec<GateIssue>,
    stats_summary: BTreeMap<String, ColumnProfile>,
    quarantine_indices: Vec<usize>,
    execution_log: Vec<ExecutionStep>,
    quality: Option<QualityReport>,
    seasonal: Option<SeasonalAnalysis>,
    consistency: Option<ConsistencyResult>,
    suggested_updates: Vec<crate::domain::contract::ColumnSpec>,
    inferred_contract: Option<String>,
    active_contract: Option<String>,
    contract: Option<Contract>,
    contract_path: Option<PathBuf>,
    file_hash: Option<String>,
    file_mtime: Option<f64>,
    row_count: u64,
    anomaly_count: u32,
    z_score_max: f64,
    /// Some(..) only when the learning policy allows appending this run's
    /// metrics to the baseline store.
    learn_metrics: Option<BTreeMap<String, f64>>,
    learned_baselines: Vec<(String, Baseline)>,
    reason: String,
}

impl Evaluation {
    fn new() -> Self {
        Self {
            status: RunStatus::Pass,
            criticals: Vec::new(),
            warnings: Vec::new(),
            stats_summary: BTreeMap::new(),
            quarantine_indices: Vec::new(),
            execution_log: Vec::new(),
            quality: None,
            seasonal: None,
            consistency: None,
            suggested_updates: Vec::new(),
            inferred_contract: None,
            active_contract: None,
            contract: None,
            contract_path: None,
            file_hash: None,
            file_mtime: None,
            row_count: 0,
            anomaly_count: 0,
            z_score_max: 0.0,
            learn_metrics: None,
            learned_baselines: Vec::new(),
            reason: String::new(),
        }
    }

    fn log(&mut self, stage: &str, detail: impl Into<String>) {
        self.execution_log.push(ExecutionStep {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            detail: detail.into(),
        });
    }

    fn fail(&mut self, issue: GateIssue) {
        self.reason = issue.message.clone();
        self.criticals.push(issue);
        self.status = RunStatus::Fail;
    }
}

pub struct Gatekeeper {
    project_dir: PathBuf,
    config: GatekeeperConfig,
    contract_store: ContractStore,
    baseline_store: BaselineStore,
    actuator: FileActuator,
    alert_router: AlertRouter,
    impact_resolver: ImpactResolver,
    report_writer: ReportWriter,
    advisor: Option<Arc<dyn SchemaAdvisor>>,
    warehouse: Option<Arc<dyn WarehouseLoader>>,
}

impl Gatekeeper {
    pub fn open(project_dir: &Path) -> Result<Self, WardenError> {
        let config = GatekeeperConfig::load_or_default(project_dir);
        Self::with_config(project_dir, config)
    }

    pub fn with_config(project_dir: &Path, config: GatekeeperConfig) -> Result<Self, WardenError> {
        let contract_store = ContractStore::new(config.resolve(project_dir, &config.contracts_dir));
        let baseline_store =
            BaselineStore::open(&config.resolve(project_dir, &config.store_path))?;
        let actuator = FileActuator::new(
            config.resolve(project_dir, &config.staging_dir),
            config.resolve(project_dir, &config.quarantine_dir),
        )?;
        let alert_router = AlertRouter::from_path(
            &config.resolve(project_dir, &config.alerts_path),
            Arc::new(LogTransport),
        );
        let graph = load_lineage_or_default(&config.resolve(project_dir, &config.lineage_path));
        let impact_resolver = ImpactResolver::new(graph);
        let report_writer = ReportWriter::new(config.resolve(project_dir, &config.reports_dir));

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            contract_store,
            baseline_store,
            actuator,
            alert_router,
            impact_resolver,
            report_writer,
            advisor: None,
            warehouse: None,
        })
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SchemaAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_warehouse(mut self, warehouse: Arc<dyn WarehouseLoader>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn baseline_store(&self) -> &BaselineStore {
        &self.baseline_store
    }

    pub fn contract_store(&self) -> &ContractStore {
        &self.contract_store
    }

    pub fn actuator(&self) -> &FileActuator {
        &self.actuator
    }

    pub fn impact_resolver(&self) -> &ImpactResolver {
        &self.impact_resolver
    }

    fn loader(&self) -> TabularLoader {
        TabularLoader::new(self.config.sampling_threshold_mb, self.config.sample_rate)
    }

    // ── The run ──────────────────────────────────────────────────────

    pub async fn run(
        &self,
        file_path: &Path,
        table: &str,
        options: RunOptions,
    ) -> Result<VerdictReport, WardenError> {
        let started = Instant::now();
        info!(table, file = %file_path.display(), "Gatekeeper run starting");

        let evaluation = match self.evaluate(file_path, table, &options).await {
            Ok(evaluation) => evaluation,
            Err(e) => self.evaluation_from_error(e),
        };

        let impact = self.impact_resolver.downstream(table);
        let mut report = self.compose_report(file_path, table, &evaluation, started);

        // ── ACTUATE ──────────────────────────────────────────────────
        // Actuator failures are fatal: no silent data movement.
        match report.status {
            RunStatus::Pass | RunStatus::PassWithWarnings => {
                let staged = self.actuator.promote(file_path, &report)?;
                self.load_downstream(table, &staged, &mut report).await;
            }
            RunStatus::Fail => {
                // A missing file cannot be moved; the verdict still stands
                if file_path.exists() {
                    self.actuator.quarantine(file_path, &report)?;
                }
            }
            // A drafted contract leaves the file in the landing zone for
            // the human who reviews the draft.
            RunStatus::ContractMissing | RunStatus::Unchanged => {}
        }

        // ── PERSIST & LEARN ──────────────────────────────────────────
        // Serialized per table so baseline recomputation stays monotonic.
        let record = self.build_record(&report, &evaluation, started);
        {
            let lock = self.baseline_store.table_lock(table);
            let _guard = lock.lock().await;

            if let Some(metrics) = &evaluation.learn_metrics {
                if let Err(e) = self
                    .baseline_store
                    .append_samples(record.run_id, table, metrics, record.timestamp)
                    .await
                {
                    log_store_failure("metric append", &e);
                }
                for (metric, baseline) in &evaluation.learned_baselines {
                    if let Err(e) = self
                        .baseline_store
                        .upsert_threshold(table, metric, baseline)
                        .await
                    {
                        log_store_failure("threshold upsert", &e);
                    }
                }
            }
            if let Err(e) = self.baseline_store.record_run(&record).await {
                log_store_failure("run record", &e);
            }
            let update = RegistryUpdate {
                table_name: table.to_string(),
                contract_path: evaluation
                    .contract_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
                lifecycle: evaluation
                    .contract
                    .as_ref()
                    .map(|c| format!("{:?}", c.info.lifecycle).to_lowercase())
                    .unwrap_or_else(|| "unknown".into()),
                criticality: impact.overall_criticality,
                status: Some(report.status),
                file_mtime: evaluation.file_mtime,
            };
            if let Err(e) = self.baseline_store.upsert_registry(&update).await {
                log_store_failure("registry upsert", &e);
            }
        }

        if let Err(e) = self.report_writer.write(&report) {
            warn!("Failed to persist report (verdict still returned): {e}");
        }

        let owner = evaluation
            .contract
            .as_ref()
            .and_then(|c| c.info.owner.clone());
        self.alert_router
            .dispatch(&report, impact.overall_criticality, owner.as_deref())
            .await;

        info!(table, status = %report.status, "Gatekeeper run finished");
        Ok(report)
    }

    /// Drive the state machine. Any error returned here is converted into
    /// a FAIL evaluation by the caller; nothing escapes the verdict.
    async fn evaluate(
        &self,
        file_path: &Path,
        table: &str,
        options: &RunOptions,
    ) -> Result<Evaluation, WardenError> {
        let mut ev = Evaluation::new();
        let store_deadline = Duration::from_secs(self.config.timeouts.store_secs);
        let validator_deadline = Duration::from_secs(self.config.timeouts.validator_secs);
        let load_deadline = Duration::from_secs(self.config.timeouts.load_secs);

        // ── LOCATE_CONTRACT ──────────────────────────────────────────
        options.check_cancelled("LOCATE_CONTRACT")?;
        let located = self.contract_store.locate(table)?;
        let Some((contract_path, contract)) = located else {
            ev.log("LOCATE_CONTRACT", "no contract found, drafting one");
            return self.infer_draft(file_path, table, ev, options).await;
        };
        ev.log(
            "LOCATE_CONTRACT",
            format!("found {}", contract_path.display()),
        );
        ev.active_contract = self.contract_store.read_raw(&contract_path).ok();
        ev.contract_path = Some(contract_path);

        let freshness_hours = contract
            .freshness_hours()
            .unwrap_or(self.config.default_freshness_hours);
        let thresholds = contract
            .quality
            .anomaly_thresholds
            .resolve(&self.config.anomaly_thresholds);

        // ── PROBE_METADATA ───────────────────────────────────────────
        options.check_cancelled("PROBE_METADATA")?;
        let known_hashes = match deadline(
            "PROBE_METADATA",
            store_deadline,
            self.baseline_store.known_hashes(table),
        )
        .await
        {
            Ok(hashes) => hashes,
            Err(e) => {
                log_store_failure("hash lookup", &e);
                Default::default()
            }
        };
        let probe = FileProbe::probe(file_path, freshness_hours, &known_hashes)?;
        ev.file_hash = probe.hash.clone();
        ev.file_mtime = FileProbe::mtime_epoch(file_path).ok();
        ev.log("PROBE_METADATA", format!("{:?}", probe.status));

        if probe.decision == Decision::Stop {
            let reason = probe
                .reason
                .unwrap_or_else(|| "File sanity check failed".into());
            ev.contract = Some(contract);
            ev.fail(GateIssue::new(ErrorKind::Timeliness, reason));
            return Ok(ev);
        }

        // ── LOAD_DATA ────────────────────────────────────────────────
        options.check_cancelled("LOAD_DATA")?;
        let table_data = match self
            .load_blocking(file_path, probe.size_bytes, load_deadline, options)
            .await
        {
            Ok(data) => data,
            Err(WardenError::Infrastructure(e)) => {
                ev.contract = Some(contract);
                ev.log("LOAD_DATA", "load failed");
                ev.fail(GateIssue::new(ErrorKind::LoadError, e.to_string()));
                return Ok(ev);
            }
            Err(other) => return Err(other),
        };
        ev.row_count = table_data.rows_loaded as u64;
        ev.log(
            "LOAD_DATA",
            format!(
                "{} rows loaded{}",
                table_data.rows_loaded,
                if table_data.sampled { " (sampled)" } else { "" }
            ),
        );

        // ── VALIDATE_SCHEMA ──────────────────────────────────────────
        options.check_cancelled("VALIDATE_SCHEMA")?;
        let schema_report = deadline("VALIDATE_SCHEMA", validator_deadline, async {
            Ok(SchemaValidator::validate(&contract, &table_data))
        })
        .await?;
        ev.suggested_updates = schema_report.diff.suggested_columns.clone();
        ev.log(
            "VALIDATE_SCHEMA",
            format!("{} violations", schema_report.violations.len()),
        );

        for violation in schema_report.warning_violations() {
            ev.warnings
                .push(GateIssue::new(ErrorKind::SchemaWarning, violation.to_string()));
        }
        if schema_report.decision == Decision::CriticalStop {
            for violation in schema_report.critical_violations() {
                ev.criticals.push(GateIssue::new(
                    ErrorKind::SchemaCritical,
                    violation.to_string(),
                ));
            }
            ev.reason = format!(
                "Critical schema violations: {}",
                schema_report.critical_violations().len()
            );
            ev.status = RunStatus::Fail;
            ev.contract = Some(contract);
            // Learning policy: structurally broken inputs never poison
            // the baselines, so learn_metrics stays None.
            return Ok(ev);
        }

        // ── CHECK_CONSISTENCY ────────────────────────────────────────
        options.check_cancelled("CHECK_CONSISTENCY")?;
        let consistency = self
            .check_consistency(&contract, &table_data, table, options)
            .await?;
        ev.log("CHECK_CONSISTENCY", format!("{:?}", consistency.status));
        if consistency.status == ConsistencyStatus::Fail {
            let message = match &consistency.message {
                Some(m) => m.clone(),
                None => format!(
                    "Found {} orphan records ({:.1}%) in {}. Sample IDs: {:?}",
                    consistency.orphan_count,
                    consistency.orphan_pct,
                    consistency.relationship.as_deref().unwrap_or("?"),
                    consistency.sample_orphans
                ),
            };
            ev.consistency = Some(consistency);
            ev.contract = Some(contract);
            ev.fail(GateIssue::new(ErrorKind::ConsistencyBreak, message));
            return Ok(ev);
        }
        if let Some(note) = &consistency.message {
            if consistency.status == ConsistencyStatus::Skipped && !contract.foreign_keys.is_empty()
            {
                ev.warnings
                    .push(GateIssue::new(ErrorKind::SchemaWarning, note.clone()));
            }
        }
        ev.consistency = Some(consistency);

        // ── PROFILE ──────────────────────────────────────────────────
        options.check_cancelled("PROFILE")?;
        let profile = deadline("PROFILE", validator_deadline, async {
            Ok(StatisticalProfiler::profile(&table_data))
        })
        .await?;
        ev.stats_summary = profile.columns.clone();
        ev.quarantine_indices = profile.quarantine_indices();
        ev.log("PROFILE", format!("{} columns profiled", profile.columns.len()));

        // ── DETECT_ANOMALIES ─────────────────────────────────────────
        options.check_cancelled("DETECT_ANOMALIES")?;
        let mut metrics = profile.drift_metrics();
        metrics.insert("row_count".into(), table_data.rows_loaded as f64);

        let day_of_week = Utc::now().weekday().num_days_from_monday();
        let mut entries = Vec::with_capacity(metrics.len());
        for (name, value) in &metrics {
            let baseline = match deadline(
                "DETECT_ANOMALIES",
                store_deadline,
                self.baseline_store.seasonal_baseline(table, name, day_of_week),
            )
            .await
            {
                Ok(baseline) => baseline,
                Err(e @ WardenError::Timeout(_)) => return Err(e),
                Err(e) => {
                    log_store_failure("baseline read", &e);
                    Baseline::initializing()
                }
            };
            entries.push((name.clone(), *value, baseline));
        }
        let assessment = AnomalyEngine::assess(&entries, &thresholds);
        ev.anomaly_count = assessment.anomaly_count;
        ev.z_score_max = assessment.z_score_max;
        ev.learned_baselines = entries
            .iter()
            .map(|(name, _, baseline)| (name.clone(), *baseline))
            .collect();
        ev.log(
            "DETECT_ANOMALIES",
            format!(
                "{} anomalies, {} warnings",
                assessment.anomaly_count, assessment.warning_count
            ),
        );

        // Decision matrix: a critical deviation blocks only tables whose
        // downstream blast radius is HIGH or CRITICAL; everything else
        // surfaces as a warning.
        let impact = self.impact_resolver.downstream(table);
        let blocking_impact = impact.overall_criticality >= Criticality::High;
        for (name, metric) in assessment.critical_metrics() {
            let message = format!("Anomaly on '{name}': {}", metric.reason);
            if blocking_impact {
                ev.criticals
                    .push(GateIssue::new(ErrorKind::AnomalyCritical, message));
            } else {
                ev.warnings.push(GateIssue::new(
                    ErrorKind::AnomalyCritical,
                    format!("{message} (downstream impact {}, not blocking)", impact.overall_criticality),
                ));
            }
        }
        for (name, metric) in assessment.warning_metrics() {
            ev.warnings.push(GateIssue::new(
                ErrorKind::AnomalyWarning,
                format!("Drift on '{name}': {}", metric.reason),
            ));
        }

        // ── DETECT_SEASONAL ──────────────────────────────────────────
        options.check_cancelled("DETECT_SEASONAL")?;
        let seasonal = self
            .detect_seasonal(table, table_data.rows_loaded as f64)
            .await;
        for (metric, check) in seasonal.anomalies() {
            ev.warnings.push(GateIssue::new(
                ErrorKind::AnomalyWarning,
                format!("Seasonal anomaly on '{metric}': {}", check.context),
            ));
        }
        ev.log(
            "DETECT_SEASONAL",
            format!("{} seasonal anomalies", seasonal.anomalies().len()),
        );
        ev.seasonal = Some(seasonal);

        // ── COMPOSE_VERDICT ──────────────────────────────────────────
        options.check_cancelled("COMPOSE_VERDICT")?;
        let quality = QualityAssessor::assess(&table_data, &profile);
        // Quality-score override: at or below the block threshold fails
        // the run regardless of warnings; below the warn threshold forces
        // at least a warning verdict.
        if quality.overall_health_score <= thresholds.quality_score_block {
            ev.criticals.push(GateIssue::new(
                ErrorKind::QualityBlock,
                format!(
                    "Overall quality score {:.1} is at or below the block threshold {:.1}",
                    quality.overall_health_score, thresholds.quality_score_block
                ),
            ));
        } else if quality.overall_health_score < thresholds.quality_score_warn {
            ev.warnings.push(GateIssue::new(
                ErrorKind::QualityBlock,
                format!(
                    "Overall quality score {:.1} is below the warn threshold {:.1}",
                    quality.overall_health_score, thresholds.quality_score_warn
                ),
            ));
        }
        ev.quality = Some(quality);

        ev.status = if !ev.criticals.is_empty() {
            RunStatus::Fail
        } else if !ev.warnings.is_empty() {
            RunStatus::PassWithWarnings
        } else {
            RunStatus::Pass
        };
        ev.reason = match ev.status {
            RunStatus::Fail => ev.criticals[0].message.clone(),
            RunStatus::PassWithWarnings => format!("{} warnings", ev.warnings.len()),
            _ => "All checks passed".into(),
        };
        ev.log("COMPOSE_VERDICT", ev.status.as_str());

        // Learning policy: schema validation passed, so this run's metrics
        // may teach the baselines (appended after the verdict, by run()).
        ev.learn_metrics = Some(metrics);
        ev.contract = Some(contract);
        Ok(ev)
    }

    /// CONTRACT_MISSING branch: load, profile, draft a contract, emit.
    async fn infer_draft(
        &self,
        file_path: &Path,
        table: &str,
        mut ev: Evaluation,
        options: &RunOptions,
    ) -> Result<Evaluation, WardenError> {
        if !file_path.exists() {
            ev.fail(GateIssue::new(
                ErrorKind::Timeliness,
                format!("File not found: {}", file_path.display()),
            ));
            return Ok(ev);
        }
        let size = std::fs::metadata(file_path)
            .map(|m| m.len())
            .unwrap_or_default();
        ev.file_mtime = FileProbe::mtime_epoch(file_path).ok();

        let load_deadline = Duration::from_secs(self.config.timeouts.load_secs);
        let table_data = match self
            .load_blocking(file_path, size, load_deadline, options)
            .await
        {
            Ok(data) => data,
            Err(WardenError::Infrastructure(e)) => {
                ev.fail(GateIssue::new(ErrorKind::LoadError, e.to_string()));
                return Ok(ev);
            }
            Err(other) => return Err(other),
        };
        ev.row_count = table_data.rows_loaded as u64;

        let profile = StatisticalProfiler::profile(&table_data);
        ev.stats_summary = profile.columns.clone();
        ev.log("PROFILE", format!("{} columns profiled", profile.columns.len()));

        let draft = ContractInferencer::draft(&table_data, &profile, table);
        ev.inferred_contract = draft.to_yaml().ok();
        ev.log("INFER_DRAFT", "draft contract generated");

        ev.status = RunStatus::ContractMissing;
        ev.reason = "No contract found. Draft generated.".into();
        ev.warnings.push(GateIssue::new(
            ErrorKind::SchemaWarning,
            "No contract found. Draft generated.",
        ));
        Ok(ev)
    }

    async fn load_blocking(
        &self,
        file_path: &Path,
        size_bytes: u64,
        limit: Duration,
        options: &RunOptions,
    ) -> Result<Table, WardenError> {
        let loader = self.loader();
        let path = file_path.to_path_buf();
        let handle = tokio::task::spawn_blocking(move || loader.load(&path, size_bytes));

        let join = async move {
            handle
                .await
                .map_err(|e| WardenError::InternalError(format!("loader task panicked: {e}")))?
                .map_err(WardenError::Infrastructure)
        };

        match &options.cancel {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = rx.changed() => Err(WardenError::Cancelled("LOAD_DATA".into())),
                    res = deadline("LOAD_DATA", limit, join) => res,
                }
            }
            None => deadline("LOAD_DATA", limit, join).await,
        }
    }

    async fn check_consistency(
        &self,
        contract: &Contract,
        table_data: &Table,
        table: &str,
        options: &RunOptions,
    ) -> Result<ConsistencyResult, WardenError> {
        if contract.foreign_keys.is_empty() {
            return Ok(ConsistencyResult::skipped(
                "No foreign keys defined in contract",
            ));
        }
        let reference_dir = self
            .config
            .resolve(&self.project_dir, &self.config.reference_dir);
        let load_deadline = Duration::from_secs(self.config.timeouts.load_secs);

        let mut results = Vec::new();
        for fk in &contract.foreign_keys {
            let reference_path = reference_dir.join(format!("{}.csv", fk.reference_table));
            if !reference_path.exists() {
                results.push(ConsistencyResult::skipped(format!(
                    "Reference dataset '{}.csv' not found",
                    fk.reference_table
                )));
                continue;
            }
            let size = std::fs::metadata(&reference_path)
                .map(|m| m.len())
                .unwrap_or_default();
            let reference = self
                .load_blocking(&reference_path, size, load_deadline, options)
                .await?;
            results.push(ConsistencyChecker::check(table_data, table, fk, &reference));
        }
        Ok(ConsistencyResult::aggregate(results))
    }

    async fn detect_seasonal(&self, table: &str, row_count: f64) -> SeasonalAnalysis {
        let now = Utc::now();
        let day_of_week = now.weekday().num_days_from_monday();
        let month = now.month();
        let weekday_name = now.weekday().to_string();
        let month_name = now.format("%B").to_string();

        let weekday_pattern = self
            .baseline_store
            .weekday_pattern(table, "row_count", day_of_week)
            .await
            .unwrap_or_else(|e| {
                log_store_failure("weekday pattern read", &e);
                None
            });
        let monthly_pattern = self
            .baseline_store
            .monthly_pattern(table, "row_count", month)
            .await
            .unwrap_or_else(|e| {
                log_store_failure("monthly pattern read", &e);
                None
            });

        let mut analysis = SeasonalAnalysis::default();
        analysis.metrics.insert(
            "row_count".into(),
            SeasonalDetector::grade(
                weekday_pattern,
                monthly_pattern,
                &weekday_name,
                &month_name,
                row_count,
            ),
        );
        analysis
    }

    /// Errors that escape the state machine become a FAIL verdict; the
    /// caller never sees a raw panic-shaped failure.
    fn evaluation_from_error(&self, error: WardenError) -> Evaluation {
        let mut ev = Evaluation::new();
        match &error {
            WardenError::Cancelled(stage) => {
                ev.log(stage, "cancelled");
                ev.fail(GateIssue::new(ErrorKind::Cancelled, "cancelled"));
                ev.reason = format!("cancelled in stage {stage}");
            }
            WardenError::Timeout(stage) => {
                ev.log(stage, "timeout");
                ev.fail(GateIssue::new(
                    ErrorKind::Timeout,
                    format!("timeout in stage {stage}"),
                ));
            }
            other => {
                ev.fail(GateIssue::new(
                    ErrorKind::Internal,
                    format!("internal_error: {other}"),
                ));
            }
        }
        ev
    }

    fn compose_report(
        &self,
        file_path: &Path,
        table: &str,
        evaluation: &Evaluation,
        started: Instant,
    ) -> VerdictReport {
        let health = HealthIndicator::calculate(
            evaluation.quality.as_ref(),
            evaluation.status,
            &evaluation.warnings,
            &evaluation.criticals,
        );
        let mut quarantine_indices = evaluation.quarantine_indices.clone();
        quarantine_indices.truncate(100);

        VerdictReport {
            timestamp: Utc::now(),
            file: file_path.display().to_string(),
            table_name: table.to_string(),
            status: evaluation.status,
            execution_time: format!("{:.2}s", started.elapsed().as_secs_f64()),
            critical_errors: evaluation.criticals.clone(),
            warnings: evaluation.warnings.clone(),
            stats_summary: evaluation.stats_summary.clone(),
            quarantine_indices,
            execution_log: evaluation.execution_log.clone(),
            quality_metrics: evaluation.quality.clone(),
            health_indicator: Some(health),
            table_priority: self.impact_resolver.priority(table),
            seasonal_analysis: evaluation.seasonal.clone(),
            consistency_result: evaluation.consistency.clone(),
            schema_evolution: SchemaEvolution {
                suggested_updates: evaluation.suggested_updates.clone(),
            },
            inferred_contract: evaluation.inferred_contract.clone(),
            active_contract: evaluation.active_contract.clone(),
        }
    }

    /// Post-promotion handoff to the warehouse. Unreachable infrastructure
    /// downgrades a clean verdict to PASS_WITH_WARNINGS; it never fails a
    /// run that already passed the quality gate.
    async fn load_downstream(&self, table: &str, staged: &Path, report: &mut VerdictReport) {
        let Some(warehouse) = &self.warehouse else {
            return;
        };
        match warehouse.load(table, staged).await {
            WarehouseOutcome::Loaded { rows } => {
                info!(table, rows, "Warehouse load complete");
            }
            WarehouseOutcome::Unreachable { detail } => {
                warn!(table, "Warehouse unreachable: {detail}");
                report.warnings.push(GateIssue::new(
                    ErrorKind::InfraTransient,
                    format!("infra unreachable: {detail}"),
                ));
                if report.status == RunStatus::Pass {
                    report.status = RunStatus::PassWithWarnings;
                }
                // Keep the health indicator coherent with the downgrade
                report.health_indicator = Some(HealthIndicator::calculate(
                    report.quality_metrics.as_ref(),
                    report.status,
                    &report.warnings,
                    &report.critical_errors,
                ));
            }
        }
    }

    fn build_record(
        &self,
        report: &VerdictReport,
        evaluation: &Evaluation,
        started: Instant,
    ) -> RunRecord {
        let violations: Vec<String> = report
            .critical_errors
            .iter()
            .chain(&report.warnings)
            .map(|issue| issue.message.clone())
            .collect();
        RunRecord {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            table_name: report.table_name.clone(),
            file_hash: evaluation.file_hash.clone(),
            row_count: evaluation.row_count,
            status: report.status,
            quality_score: evaluation
                .quality
                .as_ref()
                .map(|q| q.overall_health_score)
                .unwrap_or(0.0),
            anomaly_count: evaluation.anomaly_count,
            z_score_max: evaluation.z_score_max,
            duration_ms: started.elapsed().as_millis() as u64,
            reason: evaluation.reason.clone(),
            violations,
            profile: evaluation.stats_summary.clone(),
        }
    }

    // ── Remediation (C10 wiring) ─────────────────────────────────────

    /// Produce a gated contract revision for `table` from a schema diff.
    /// Uses the configured advisor when present, the deterministic
    /// column-append proposal otherwise. The proposal is returned, never
    /// applied here.
    pub async fn propose_contract_update(
        &self,
        table: &str,
        diff: &SchemaDiff,
    ) -> Result<Contract, WardenError> {
        let (path, current) = self
            .contract_store
            .locate(table)?
            .ok_or_else(|| crate::domain::error::DomainError::ContractNotFound(table.into()))?;

        let proposal_yaml = match &self.advisor {
            Some(advisor) => {
                let current_yaml = self.contract_store.read_raw(&path)?;
                advisor
                    .propose_schema_update(&current_yaml, &diff.describe())
                    .await?
            }
            None => SchemaRemediator::build_proposal(&current, diff)
                .to_yaml()
                .map_err(crate::infrastructure::error::InfrastructureError::Yaml)?,
        };

        Ok(SchemaRemediator::gate(&current, &proposal_yaml)?)
    }

    /// Apply a previously gated proposal: archive the active contract,
    /// replace it atomically, and invalidate cached thresholds (derived
    /// state tied to the contract version).
    pub async fn apply_contract_update(
        &self,
        table: &str,
        proposal: &Contract,
    ) -> Result<PathBuf, WardenError> {
        let (path, current) = self
            .contract_store
            .locate(table)?
            .ok_or_else(|| crate::domain::error::DomainError::ContractNotFound(table.into()))?;

        // Re-gate against the live contract; it may have moved since the
        // proposal was produced.
        let proposal_yaml = proposal
            .to_yaml()
            .map_err(crate::infrastructure::error::InfrastructureError::Yaml)?;
        SchemaRemediator::gate(&current, &proposal_yaml)?;

        let archived = self.contract_store.replace(&path, &proposal_yaml)?;
        self.baseline_store.invalidate_thresholds(table).await?;
        Ok(archived)
    }
}

/// Every stage runs under a deadline; a blown deadline fails the run with
/// the stage name in the reason.
async fn deadline<T>(
    stage: &str,
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, WardenError>>,
) -> Result<T, WardenError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| WardenError::Timeout(stage.to_string()))?
}
