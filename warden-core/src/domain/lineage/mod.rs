// warden-core/src/domain/lineage/mod.rs
//
// The downstream blast radius of a table. The lineage graph is produced
// externally, loaded read-only, and held as an immutable adjacency map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Low => "LOW",
            Criticality::Medium => "MEDIUM",
            Criticality::High => "HIGH",
            Criticality::Critical => "CRITICAL",
        }
    }

    pub fn weight(&self) -> u32 {
        match self {
            Criticality::Low => 1,
            Criticality::Medium => 2,
            Criticality::High => 3,
            Criticality::Critical => 4,
        }
    }
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Criticality::Low),
            "MEDIUM" => Ok(Criticality::Medium),
            "HIGH" => Ok(Criticality::High),
            "CRITICAL" => Ok(Criticality::Critical),
            other => Err(format!("unknown criticality '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub name: String,
    #[serde(rename = "type")]
    pub consumer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub criticality: Criticality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetLineage {
    #[serde(default)]
    pub consumers: Vec<Consumer>,
}

/// Directed acyclic consumer graph, keyed by dataset name. Read-mostly:
/// cloned on reload, never mutated by the gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageGraph {
    #[serde(default)]
    pub datasets: HashMap<String, DatasetLineage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub dataset: String,
    pub overall_criticality: Criticality,
    pub impacted_consumers: Vec<Consumer>,
}

/// Priority summary surfaced in the verdict: how urgently this table's
/// quality issues should be looked at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePriority {
    pub priority_tier: String,
    pub priority_score: f64,
    pub consumer_count: usize,
}

impl Default for TablePriority {
    fn default() -> Self {
        Self {
            priority_tier: "UNKNOWN".into(),
            priority_score: 0.0,
            consumer_count: 0,
        }
    }
}

pub struct ImpactResolver {
    graph: LineageGraph,
}

impl ImpactResolver {
    pub fn new(graph: LineageGraph) -> Self {
        Self { graph }
    }

    /// Consumers downstream of `table`. Unknown tables default to LOW
    /// with no consumers.
    pub fn downstream(&self, table: &str) -> ImpactReport {
        let consumers = self
            .graph
            .datasets
            .get(table)
            .map(|d| d.consumers.clone())
            .unwrap_or_default();

        let overall_criticality = consumers
            .iter()
            .map(|c| c.criticality)
            .max()
            .unwrap_or(Criticality::Low);

        ImpactReport {
            dataset: table.to_string(),
            overall_criticality,
            impacted_consumers: consumers,
        }
    }

    pub fn priority(&self, table: &str) -> TablePriority {
        let impact = self.downstream(table);
        if impact.impacted_consumers.is_empty() {
            return TablePriority::default();
        }
        let score = impact.impacted_consumers.len() as f64
            * impact.overall_criticality.weight() as f64
            * 10.0;
        TablePriority {
            priority_tier: impact.overall_criticality.as_str().to_string(),
            priority_score: score,
            consumer_count: impact.impacted_consumers.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn graph() -> LineageGraph {
        serde_yaml::from_str(
            r#"
datasets:
  transactions:
    consumers:
      - name: Executive_Dashboard
        type: dashboard
        owner: Executive Team
        criticality: HIGH
      - name: Churn_Prediction_Model
        type: ml_model
        owner: Data Science
        criticality: MEDIUM
  logs:
    consumers:
      - name: Dev_Debug_Tool
        type: app
        criticality: LOW
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_overall_criticality_is_max_of_consumers() {
        let resolver = ImpactResolver::new(graph());
        let impact = resolver.downstream("transactions");
        assert_eq!(impact.overall_criticality, Criticality::High);
        assert_eq!(impact.impacted_consumers.len(), 2);
    }

    #[test]
    fn test_unknown_table_defaults_to_low() {
        let resolver = ImpactResolver::new(graph());
        let impact = resolver.downstream("mystery");
        assert_eq!(impact.overall_criticality, Criticality::Low);
        assert!(impact.impacted_consumers.is_empty());
    }

    #[test]
    fn test_criticality_ordering() {
        assert!(Criticality::Critical > Criticality::High);
        assert!(Criticality::High > Criticality::Medium);
        assert!(Criticality::Medium > Criticality::Low);
    }

    #[test]
    fn test_priority_score_scales_with_consumers() {
        let resolver = ImpactResolver::new(graph());
        let txn = resolver.priority("transactions");
        assert_eq!(txn.priority_tier, "HIGH");
        assert_eq!(txn.priority_score, 60.0); // 2 consumers * weight 3 * 10

        let unknown = resolver.priority("mystery");
        assert_eq!(unknown.priority_tier, "UNKNOWN");
        assert_eq!(unknown.priority_score, 0.0);
    }

    #[test]
    fn test_wire_format() {
        let s = serde_json::to_string(&Criticality::High).unwrap();
        assert_eq!(s, "\"HIGH\"");
        let parsed: Criticality = "critical".parse().unwrap();
        assert_eq!(parsed, Criticality::Critical);
    }
}
