// warden-core/src/infrastructure/fs.rs
//
// Durable artifact writes. Every document the gate emits — active
// contracts, archive copies, verdict reports, actuator sidecars — must
// land fully or not at all; a half-written sidecar would poison the
// audit trail the next reader trusts.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::infrastructure::error::InfrastructureError;

/// Commit `content` to `path` without the target ever being observable
/// half-written: bytes go to a temp file in the destination directory,
/// are flushed, and are renamed over the target in one step. Missing
/// parent directories are created on demand — the archive and report
/// namespaces only exist once something lands in them.
pub fn commit_bytes<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    // Same-directory temp file so the final rename stays on one filesystem
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(content.as_ref())?;
    staged.flush()?;
    staged.persist(path).map_err(|e| InfrastructureError::Io(e.error))?;

    Ok(())
}

/// Serialize a document (report, sidecar) and commit it in one step.
pub fn commit_json<P: AsRef<Path>, T: Serialize>(
    path: P,
    document: &T,
) -> Result<(), InfrastructureError> {
    let content = serde_json::to_string_pretty(document)?;
    commit_bytes(path, content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_commit_creates_missing_namespace() -> Result<()> {
        let dir = tempdir()?;
        // Neither contracts/ nor archive/ exist yet
        let target = dir.path().join("contracts/archive/orders_v1_20240301.yaml");

        commit_bytes(&target, "table_name: orders\n")?;

        assert_eq!(fs::read_to_string(target)?, "table_name: orders\n");
        Ok(())
    }

    #[test]
    fn test_commit_replaces_active_copy_in_place() -> Result<()> {
        let dir = tempdir()?;
        let active = dir.path().join("transactions.yaml");

        commit_bytes(&active, "info:\n  version: 1.0.0\n")?;
        commit_bytes(&active, "info:\n  version: 1.1.0\n")?;

        let content = fs::read_to_string(&active)?;
        assert!(content.contains("1.1.0"));
        assert!(!content.contains("1.0.0"));
        Ok(())
    }

    #[test]
    fn test_commit_leaves_no_temp_litter() -> Result<()> {
        let dir = tempdir()?;
        commit_bytes(dir.path().join("report.json"), "{}")?;

        let entries: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(std::result::Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name(), "report.json");
        Ok(())
    }

    #[test]
    fn test_commit_json_writes_readable_sidecar() -> Result<()> {
        #[derive(serde::Serialize)]
        struct Sidecar<'a> {
            status: &'a str,
            moved_to: &'a str,
        }

        let dir = tempdir()?;
        let path = dir.path().join("transactions.csv.meta.json");
        commit_json(
            &path,
            &Sidecar {
                status: "APPROVED",
                moved_to: "data/staging/transactions.csv",
            },
        )?;

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        assert_eq!(parsed["status"], "APPROVED");
        Ok(())
    }
}
