// warden-core/src/infrastructure/contract_store.rs
//
// On-disk contract registry: one YAML file per table, archives in a
// sibling `archive/` namespace. Every mutation archives the active copy
// first, then replaces it atomically. Reads are copy-on-read of the
// parsed document; `replace` is serialized so archive-then-replace can
// never interleave.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::domain::contract::Contract;
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::commit_bytes;

const CONTRACT_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// One parse failure during discovery. Reported, never fatal for siblings.
#[derive(Debug, Clone)]
pub struct ContractDiagnostic {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ContractDiscovery {
    pub contracts: Vec<(PathBuf, Contract)>,
    pub diagnostics: Vec<ContractDiagnostic>,
}

pub struct ContractStore {
    contracts_dir: PathBuf,
    replace_lock: Mutex<()>,
}

impl ContractStore {
    pub fn new(contracts_dir: impl Into<PathBuf>) -> Self {
        Self {
            contracts_dir: contracts_dir.into(),
            replace_lock: Mutex::new(()),
        }
    }

    pub fn contracts_dir(&self) -> &Path {
        &self.contracts_dir
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.contracts_dir.join("archive")
    }

    /// Resolve the contract for `table`. Prefers `<table>.yaml`; otherwise
    /// scans the directory for a document whose `table_name` matches.
    pub fn locate(&self, table: &str) -> Result<Option<(PathBuf, Contract)>, WardenError> {
        for ext in CONTRACT_EXTENSIONS {
            let direct = self.contracts_dir.join(format!("{table}.{ext}"));
            if direct.exists() {
                match self.load(&direct) {
                    Ok(contract) => return Ok(Some((direct, contract))),
                    Err(e) => {
                        // A broken direct match must not hide a sibling
                        warn!(path = ?direct, "Unreadable contract file: {e}");
                    }
                }
            }
        }

        let discovery = self.list()?;
        for (path, contract) in discovery.contracts {
            if contract.table_name.eq_ignore_ascii_case(table) {
                return Ok(Some((path, contract)));
            }
        }
        Ok(None)
    }

    /// Parse and structurally validate one contract file.
    pub fn load(&self, path: &Path) -> Result<Contract, WardenError> {
        let content = fs::read_to_string(path).map_err(InfrastructureError::Io)?;
        let contract = Contract::from_yaml(&content).map_err(InfrastructureError::Yaml)?;
        contract.validate()?;
        Ok(contract)
    }

    /// Raw file content, handed to advisors and embedded in reports.
    pub fn read_raw(&self, path: &Path) -> Result<String, InfrastructureError> {
        fs::read_to_string(path).map_err(InfrastructureError::Io)
    }

    /// Every active contract in the directory, excluding the archive
    /// namespace. Parse failures become per-file diagnostics and discovery
    /// of siblings continues.
    pub fn list(&self) -> Result<ContractDiscovery, WardenError> {
        let mut discovery = ContractDiscovery::default();
        if !self.contracts_dir.exists() {
            return Ok(discovery);
        }
        let archive = self.archive_dir();

        for entry in WalkDir::new(&self.contracts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !path.is_file() || path.starts_with(&archive) {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !CONTRACT_EXTENSIONS.contains(&ext) {
                continue;
            }
            match self.load(path) {
                Ok(contract) => discovery.contracts.push((path.to_path_buf(), contract)),
                Err(e) => {
                    warn!(path = ?path, "Skipping unparseable contract: {e}");
                    discovery.diagnostics.push(ContractDiagnostic {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        discovery
            .contracts
            .sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(discovery)
    }

    /// Timestamped copy of the active file into the archive namespace:
    /// `<table>_v<version>_<YYYYMMDD_HHMMSS>.<ext>`.
    pub fn archive(&self, path: &Path) -> Result<PathBuf, WardenError> {
        let content = fs::read_to_string(path).map_err(InfrastructureError::Io)?;
        let (stem, version) = match Contract::from_yaml(&content) {
            Ok(c) => (c.table_name, c.info.version),
            Err(_) => (
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "contract".into()),
                "0".into(),
            ),
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("yaml");
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = self
            .archive_dir()
            .join(format!("{stem}_v{version}_{stamp}.{ext}"));
        commit_bytes(&target, &content)?;
        info!(from = ?path, to = ?target, "Archived contract");
        Ok(target)
    }

    /// Archive-first atomic replacement of the active contract file.
    pub fn replace(&self, path: &Path, contents: &str) -> Result<PathBuf, WardenError> {
        let _guard = self
            .replace_lock
            .lock()
            .map_err(|_| WardenError::InternalError("contract store lock poisoned".into()))?;
        let archived = self.archive(path)?;
        commit_bytes(path, contents)?;
        info!(path = ?path, "Replaced active contract");
        Ok(archived)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TRANSACTIONS: &str = r#"
table_name: transactions
columns:
  - name: transaction_id
    physical_type: string
    nullable: false
    required: true
info:
  version: 1.0.0
"#;

    const USERS_ODD_NAME: &str = r#"
table_name: users
columns:
  - name: user_id
    physical_type: integer
    nullable: false
"#;

    fn store_with_fixtures() -> (tempfile::TempDir, ContractStore) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("transactions.yaml"), TRANSACTIONS).unwrap();
        // Filename does not match the table inside
        fs::write(dir.path().join("members_contract.yaml"), USERS_ODD_NAME).unwrap();
        fs::write(dir.path().join("broken.yaml"), "table_name: [[[").unwrap();
        let store = ContractStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_locate_by_filename() {
        let (_dir, store) = store_with_fixtures();
        let (path, contract) = store.locate("transactions").unwrap().unwrap();
        assert!(path.ends_with("transactions.yaml"));
        assert_eq!(contract.table_name, "transactions");
    }

    #[test]
    fn test_locate_by_scanning_contents() {
        let (_dir, store) = store_with_fixtures();
        let (path, contract) = store.locate("users").unwrap().unwrap();
        assert!(path.ends_with("members_contract.yaml"));
        assert_eq!(contract.table_name, "users");
    }

    #[test]
    fn test_locate_missing_table() {
        let (_dir, store) = store_with_fixtures();
        assert!(store.locate("ghost").unwrap().is_none());
    }

    #[test]
    fn test_list_reports_parse_diagnostics_without_aborting() {
        let (_dir, store) = store_with_fixtures();
        let discovery = store.list().unwrap();
        assert_eq!(discovery.contracts.len(), 2);
        assert_eq!(discovery.diagnostics.len(), 1);
        assert!(discovery.diagnostics[0].path.ends_with("broken.yaml"));
    }

    #[test]
    fn test_replace_archives_previous_contents() {
        let (dir, store) = store_with_fixtures();
        let active = dir.path().join("transactions.yaml");

        let updated = TRANSACTIONS.replace("1.0.0", "1.1.0");
        let archived = store.replace(&active, &updated).unwrap();

        // The archive holds the pre-replace contents
        let archived_content = fs::read_to_string(&archived).unwrap();
        assert!(archived_content.contains("1.0.0"));
        assert!(archived
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("transactions_v1.0.0_"));

        // The active file holds the new contents
        let active_content = fs::read_to_string(&active).unwrap();
        assert!(active_content.contains("1.1.0"));
    }

    #[test]
    fn test_list_excludes_archive_namespace() {
        let (dir, store) = store_with_fixtures();
        let active = dir.path().join("transactions.yaml");
        store.replace(&active, TRANSACTIONS).unwrap();

        let discovery = store.list().unwrap();
        // Still two live contracts; the archived copy is not discovered
        assert_eq!(discovery.contracts.len(), 2);
    }
}
