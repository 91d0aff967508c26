// warden-core/src/infrastructure/actuator.rs
//
// The muscle of the gate: physically moves a judged file into the staging
// or quarantine namespace and writes the sidecar audit document next to
// it. After either operation the original path no longer exists. Actuator
// failures are fatal for the run; there is no silent data movement.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::verdict::{ErrorKind, VerdictReport};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::commit_json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub timeliness_issues: Vec<String>,
    pub schema_issues: Vec<String>,
    pub profiling_issues: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PromoteSidecar<'a> {
    original_file: String,
    moved_to: String,
    timestamp: chrono::DateTime<Utc>,
    status: &'static str,
    validation_results: &'a VerdictReport,
}

#[derive(Debug, Serialize)]
struct QuarantineSidecar<'a> {
    original_file: String,
    quarantined_to: String,
    timestamp: chrono::DateTime<Utc>,
    status: &'static str,
    error_summary: ErrorSummary,
    validation_results: &'a VerdictReport,
}

pub struct FileActuator {
    staging_dir: PathBuf,
    quarantine_dir: PathBuf,
}

impl FileActuator {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        quarantine_dir: impl Into<PathBuf>,
    ) -> Result<Self, InfrastructureError> {
        let staging_dir = staging_dir.into();
        let quarantine_dir = quarantine_dir.into();
        fs::create_dir_all(&staging_dir)?;
        fs::create_dir_all(&quarantine_dir)?;
        Ok(Self {
            staging_dir,
            quarantine_dir,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// Move an approved file into staging and write its `.meta.json`
    /// sidecar.
    pub fn promote(
        &self,
        file: &Path,
        report: &VerdictReport,
    ) -> Result<PathBuf, InfrastructureError> {
        let name = file
            .file_name()
            .ok_or_else(|| InfrastructureError::ActuatorError(format!(
                "not a file path: {}",
                file.display()
            )))?;
        let destination = self.staging_dir.join(name);
        move_file(file, &destination)?;

        let sidecar = PromoteSidecar {
            original_file: file.display().to_string(),
            moved_to: destination.display().to_string(),
            timestamp: Utc::now(),
            status: "APPROVED",
            validation_results: report,
        };
        commit_json(sidecar_path(&destination, "meta"), &sidecar)?;

        info!(to = ?destination, "Promoted file to staging");
        Ok(destination)
    }

    /// Move a rejected file into quarantine under a timestamp-uniquified
    /// name and write its `.error.json` sidecar.
    pub fn quarantine(
        &self,
        file: &Path,
        report: &VerdictReport,
    ) -> Result<PathBuf, InfrastructureError> {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| InfrastructureError::ActuatorError(format!(
                "not a file path: {}",
                file.display()
            )))?;
        let ext = file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let destination = self.quarantine_dir.join(format!("{stem}_{stamp}{ext}"));
        move_file(file, &destination)?;

        let sidecar = QuarantineSidecar {
            original_file: file.display().to_string(),
            quarantined_to: destination.display().to_string(),
            timestamp: Utc::now(),
            status: "QUARANTINED",
            error_summary: Self::summarize_errors(report),
            validation_results: report,
        };
        commit_json(sidecar_path(&destination, "error"), &sidecar)?;

        info!(to = ?destination, "Quarantined file");
        Ok(destination)
    }

    /// Categorize the verdict's issues for the human reading the sidecar.
    fn summarize_errors(report: &VerdictReport) -> ErrorSummary {
        let mut summary = ErrorSummary {
            total_errors: 0,
            timeliness_issues: Vec::new(),
            schema_issues: Vec::new(),
            profiling_issues: Vec::new(),
        };
        for issue in report.critical_errors.iter().chain(&report.warnings) {
            let bucket = match issue.kind {
                ErrorKind::Timeliness => &mut summary.timeliness_issues,
                ErrorKind::SchemaCritical | ErrorKind::SchemaWarning => {
                    &mut summary.schema_issues
                }
                _ => &mut summary.profiling_issues,
            };
            bucket.push(issue.message.clone());
        }
        summary.total_errors = report.critical_errors.len();
        summary
    }

    pub fn staging_files(&self) -> Result<Vec<PathBuf>, InfrastructureError> {
        list_data_files(&self.staging_dir)
    }

    pub fn quarantined_files(&self) -> Result<Vec<PathBuf>, InfrastructureError> {
        list_data_files(&self.quarantine_dir)
    }

    /// The error sidecar for a quarantined file, if present.
    pub fn quarantine_report(
        &self,
        quarantined: &Path,
    ) -> Result<Option<serde_json::Value>, InfrastructureError> {
        let path = sidecar_path(quarantined, "error");
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn sidecar_path(data_file: &Path, kind: &str) -> PathBuf {
    let mut name = data_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!(".{kind}.json"));
    data_file.with_file_name(name)
}

/// Rename with a copy+remove fallback for cross-device moves.
fn move_file(from: &Path, to: &Path) -> Result<(), InfrastructureError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| {
        InfrastructureError::ActuatorError(format!(
            "failed to move {} to {}: {e}",
            from.display(),
            to.display()
        ))
    })?;
    fs::remove_file(from).map_err(|e| {
        InfrastructureError::ActuatorError(format!(
            "moved {} but could not remove the original: {e}",
            from.display()
        ))
    })?;
    Ok(())
}

fn list_data_files(dir: &Path) -> Result<Vec<PathBuf>, InfrastructureError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        // Sidecars are audit metadata, not data
        if path.to_string_lossy().ends_with(".json")
            && (path.to_string_lossy().ends_with(".meta.json")
                || path.to_string_lossy().ends_with(".error.json"))
        {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
