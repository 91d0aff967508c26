// warden-core/src/infrastructure/probe.rs
//
// Pre-flight sanity check on the landed file: existence, size, content
// hash, age. Duplicate detection compares the hash against those recorded
// for prior runs of the same table.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::verdict::Decision;
use crate::infrastructure::error::InfrastructureError;

const HASH_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Fresh,
    Stale,
    Duplicate,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub decision: Decision,
    pub size_bytes: u64,
    pub size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct FileProbe;

impl FileProbe {
    /// Stop conditions: missing file, duplicate hash, or age at or beyond
    /// the freshness limit (a file exactly at the limit is stale).
    pub fn probe(
        path: &Path,
        freshness_hours: f64,
        known_hashes: &HashSet<String>,
    ) -> Result<ProbeReport, InfrastructureError> {
        if !path.exists() {
            return Ok(ProbeReport {
                status: ProbeStatus::Missing,
                decision: Decision::Stop,
                size_bytes: 0,
                size_mb: 0.0,
                hash: None,
                modified_at: None,
                age_hours: None,
                reason: Some(format!("File not found: {}", path.display())),
            });
        }

        let meta = std::fs::metadata(path)?;
        let size_bytes = meta.len();
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        let modified_at: DateTime<Utc> = meta.modified()?.into();
        let age_hours = (Utc::now() - modified_at).num_milliseconds() as f64 / 3_600_000.0;

        let hash = Self::content_hash(path)?;

        if known_hashes.contains(&hash) {
            return Ok(ProbeReport {
                status: ProbeStatus::Duplicate,
                decision: Decision::Stop,
                size_bytes,
                size_mb,
                hash: Some(hash),
                modified_at: Some(modified_at),
                age_hours: Some(age_hours),
                reason: Some("File hash already processed".into()),
            });
        }

        if age_hours >= freshness_hours {
            return Ok(ProbeReport {
                status: ProbeStatus::Stale,
                decision: Decision::Stop,
                size_bytes,
                size_mb,
                hash: Some(hash),
                modified_at: Some(modified_at),
                age_hours: Some(age_hours),
                reason: Some(format!(
                    "File is {age_hours:.1} hours old, exceeds maximum age of {freshness_hours:.1} hours"
                )),
            });
        }

        Ok(ProbeReport {
            status: ProbeStatus::Fresh,
            decision: Decision::Continue,
            size_bytes,
            size_mb,
            hash: Some(hash),
            modified_at: Some(modified_at),
            age_hours: Some(age_hours),
            reason: None,
        })
    }

    /// Streaming SHA-256 of the file contents.
    pub fn content_hash(path: &Path) -> Result<String, InfrastructureError> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// File mtime as fractional seconds since the epoch, for the smart-scan
    /// registry comparison.
    pub fn mtime_epoch(path: &Path) -> Result<f64, InfrastructureError> {
        let modified = std::fs::metadata(path)?.modified()?;
        let duration = modified
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(duration.as_secs_f64())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_stops() {
        let report =
            FileProbe::probe(Path::new("/no/such/file.csv"), 24.0, &HashSet::new()).unwrap();
        assert_eq!(report.status, ProbeStatus::Missing);
        assert_eq!(report.decision, Decision::Stop);
    }

    #[test]
    fn test_fresh_file_continues() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        let report = FileProbe::probe(&path, 24.0, &HashSet::new()).unwrap();
        assert_eq!(report.status, ProbeStatus::Fresh);
        assert_eq!(report.decision, Decision::Continue);
        assert!(report.hash.is_some());
        assert!(report.age_hours.unwrap() < 1.0);
    }

    #[test]
    fn test_duplicate_hash_stops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        let hash = FileProbe::content_hash(&path).unwrap();
        let known: HashSet<String> = [hash].into_iter().collect();

        let report = FileProbe::probe(&path, 24.0, &known).unwrap();
        assert_eq!(report.status, ProbeStatus::Duplicate);
        assert_eq!(report.decision, Decision::Stop);
    }

    #[test]
    fn test_age_at_limit_is_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        // A zero-hour freshness limit makes any file exactly at/over the edge
        let report = FileProbe::probe(&path, 0.0, &HashSet::new()).unwrap();
        assert_eq!(report.status, ProbeStatus::Stale);
        assert!(report.reason.unwrap().contains("exceeds maximum age"));
    }

    #[test]
    fn test_hash_is_content_addressed() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();
        assert_eq!(
            FileProbe::content_hash(&a).unwrap(),
            FileProbe::content_hash(&b).unwrap()
        );
    }
}
