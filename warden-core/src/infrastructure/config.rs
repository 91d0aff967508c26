// warden-core/src/infrastructure/config.rs
//
// Project-level gatekeeper configuration (`warden.yaml`). Everything has a
// default so a bare project directory still gates; per-contract settings
// (freshness, anomaly thresholds) override these globals at run time.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::domain::contract::AnomalyThresholds;
use crate::infrastructure::error::InfrastructureError;

const CONFIG_CANDIDATES: [&str; 2] = ["warden.yaml", "warden_conf.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub load_secs: u64,
    pub validator_secs: u64,
    pub store_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            load_secs: 60,
            validator_secs: 10,
            store_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    pub contracts_dir: String,
    pub landing_dir: String,
    pub staging_dir: String,
    pub quarantine_dir: String,
    pub reports_dir: String,
    /// Where consistency checks look for `<reference_table>.csv`.
    pub reference_dir: String,
    pub store_path: String,
    pub lineage_path: String,
    pub alerts_path: String,
    pub sampling_threshold_mb: f64,
    pub sample_rate: f64,
    pub default_freshness_hours: f64,
    pub anomaly_thresholds: AnomalyThresholds,
    pub timeouts: StageTimeouts,
    pub smart_scan_epsilon_ms: u64,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            contracts_dir: "contracts".into(),
            landing_dir: "data/landing".into(),
            staging_dir: "data/staging".into(),
            quarantine_dir: "data/quarantine".into(),
            reports_dir: "reports".into(),
            reference_dir: "data/landing".into(),
            store_path: "data/system/warden.db".into(),
            lineage_path: "config/lineage.yaml".into(),
            alerts_path: "config/alerts.yaml".into(),
            sampling_threshold_mb: 500.0,
            sample_rate: 0.1,
            default_freshness_hours: 24.0,
            anomaly_thresholds: AnomalyThresholds::default(),
            timeouts: StageTimeouts::default(),
            smart_scan_epsilon_ms: 10,
        }
    }
}

impl GatekeeperConfig {
    #[instrument(skip(project_dir))]
    pub fn load(project_dir: &Path) -> Result<Self, InfrastructureError> {
        let path = find_config(project_dir)?;
        info!(path = ?path, "Loading gatekeeper configuration");
        let content = fs::read_to_string(&path)?;
        let mut config: GatekeeperConfig = serde_yaml::from_str(&content)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// A project without `warden.yaml` runs on defaults.
    pub fn load_or_default(project_dir: &Path) -> Self {
        match Self::load(project_dir) {
            Ok(config) => config,
            Err(InfrastructureError::ConfigNotFound(_)) => {
                let mut config = Self::default();
                apply_env_overrides(&mut config);
                config
            }
            Err(e) => {
                tracing::warn!("Unusable gatekeeper config, falling back to defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn resolve(&self, project_dir: &Path, relative: &str) -> PathBuf {
        let p = Path::new(relative);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            project_dir.join(p)
        }
    }
}

fn find_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, CONFIG_CANDIDATES
    )))
}

fn apply_env_overrides(config: &mut GatekeeperConfig) {
    if let Ok(val) = std::env::var("WARDEN_STORE_PATH") {
        info!(old = ?config.store_path, new = ?val, "Overriding store path via ENV");
        config.store_path = val;
    }
    if let Ok(val) = std::env::var("WARDEN_REPORTS_DIR") {
        info!(old = ?config.reports_dir, new = ?val, "Overriding reports dir via ENV");
        config.reports_dir = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let config = GatekeeperConfig::load_or_default(dir.path());
        assert_eq!(config.contracts_dir, "contracts");
        assert_eq!(config.sampling_threshold_mb, 500.0);
        assert_eq!(config.sample_rate, 0.1);
        assert_eq!(config.anomaly_thresholds.z_warn, 2.5);
        assert_eq!(config.timeouts.load_secs, 60);
    }

    #[test]
    fn test_partial_config_overrides_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("warden.yaml"),
            "contracts_dir: agreements\nsample_rate: 0.25\n",
        )
        .unwrap();
        let config = GatekeeperConfig::load(dir.path()).unwrap();
        assert_eq!(config.contracts_dir, "agreements");
        assert_eq!(config.sample_rate, 0.25);
        // Unspecified keys keep their defaults
        assert_eq!(config.staging_dir, "data/staging");
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            GatekeeperConfig::load(dir.path()),
            Err(InfrastructureError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = GatekeeperConfig::default();
        let root = Path::new("/project");
        assert_eq!(
            config.resolve(root, "contracts"),
            PathBuf::from("/project/contracts")
        );
        assert_eq!(config.resolve(root, "/abs/dir"), PathBuf::from("/abs/dir"));
    }
}
