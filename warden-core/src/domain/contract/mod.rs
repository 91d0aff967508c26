// warden-core/src/domain/contract/mod.rs
//
// The declarative per-table contract: expected schema, quality rules,
// anomaly thresholds, foreign keys, ownership metadata.

pub mod infer;
pub mod remediate;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::error::DomainError;

pub use infer::ContractInferencer;
pub use remediate::SchemaRemediator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Active,
    Deprecated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub physical_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// A required column missing from the data is a critical violation.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    /// Duplicate values in this column are a violation. Implied by
    /// `is_primary_key`, where it escalates to critical.
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// Per-contract anomaly thresholds; every field falls back to the global
/// default when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_warn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_crit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score_warn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score_block: Option<f64>,
}

/// Fully-resolved thresholds used by the anomaly engine and the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub z_warn: f64,
    pub z_crit: f64,
    pub quality_score_warn: f64,
    pub quality_score_block: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            z_warn: 2.5,
            z_crit: 3.0,
            quality_score_warn: 80.0,
            quality_score_block: 50.0,
        }
    }
}

impl ThresholdOverrides {
    pub fn resolve(&self, global: &AnomalyThresholds) -> AnomalyThresholds {
        AnomalyThresholds {
            z_warn: self.z_warn.unwrap_or(global.z_warn),
            z_crit: self.z_crit.unwrap_or(global.z_crit),
            quality_score_warn: self.quality_score_warn.unwrap_or(global.quality_score_warn),
            quality_score_block: self
                .quality_score_block
                .unwrap_or(global.quality_score_block),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    Warning,
    #[serde(alias = "critical")]
    Error,
}

impl Default for CheckSeverity {
    fn default() -> Self {
        CheckSeverity::Error
    }
}

/// A custom predicate over the loaded table, in the supported SQL subset
/// (column refs, literals, arithmetic, comparison, boolean connectives,
/// `now()`). Evaluated row by row by the embedded expression engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCheck {
    pub name: String,
    pub sql_condition: String,
    #[serde(default)]
    pub severity: CheckSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessRule {
    /// String of the form `<int>h`, e.g. `24h`.
    pub threshold: String,
}

impl FreshnessRule {
    pub fn hours(&self) -> Result<f64, DomainError> {
        let raw = self.threshold.trim();
        raw.strip_suffix('h')
            .and_then(|h| h.parse::<u64>().ok())
            .map(|h| h as f64)
            .ok_or_else(|| DomainError::InvalidFreshness(self.threshold.clone()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<FreshnessRule>,
    #[serde(default)]
    pub anomaly_thresholds: ThresholdOverrides,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_checks: Vec<CustomCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub columns: Vec<String>,
    pub reference_table: String,
    pub reference_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for ContractInfo {
    fn default() -> Self {
        Self {
            version: default_version(),
            owner: None,
            domain: None,
            lifecycle: Lifecycle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub quality: QualitySection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeySpec>,
    #[serde(default)]
    pub info: ContractInfo,
    #[serde(default)]
    pub strict_mode: bool,
}

impl Contract {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    pub fn column_names(&self) -> HashSet<String> {
        self.columns.iter().map(|c| c.name.to_lowercase()).collect()
    }

    /// Freshness limit in hours; 24 when the contract is silent.
    pub fn freshness_hours(&self) -> Result<f64, DomainError> {
        match &self.quality.freshness {
            Some(rule) => rule.hours(),
            None => Ok(24.0),
        }
    }

    /// Structural invariants, enforced at load and on every remediation
    /// proposal:
    /// - column names are unique (case-insensitive)
    /// - a primary-key column is never nullable
    /// - `pattern` rules compile
    /// - freshness thresholds parse
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.to_lowercase()) {
                return Err(DomainError::ContractInvariant {
                    table: self.table_name.clone(),
                    detail: format!("duplicate column name '{}'", col.name),
                });
            }
            if col.is_primary_key && col.nullable {
                return Err(DomainError::ContractInvariant {
                    table: self.table_name.clone(),
                    detail: format!("primary key column '{}' must not be nullable", col.name),
                });
            }
            if let Some(pattern) = &col.pattern {
                regex::Regex::new(pattern).map_err(|e| DomainError::ContractInvariant {
                    table: self.table_name.clone(),
                    detail: format!("invalid pattern on column '{}': {}", col.name, e),
                })?;
            }
        }
        self.freshness_hours()?;
        Ok(())
    }
}
