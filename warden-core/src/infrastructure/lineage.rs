// warden-core/src/infrastructure/lineage.rs
//
// Loads the externally-produced lineage document. The graph is read-only
// for the gate; a missing file simply means no known downstream consumers.

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::lineage::LineageGraph;
use crate::infrastructure::error::InfrastructureError;

pub fn load_lineage(path: &Path) -> Result<LineageGraph, InfrastructureError> {
    let content = std::fs::read_to_string(path)?;
    let graph = serde_yaml::from_str(&content)?;
    Ok(graph)
}

/// Lenient variant used by the orchestrator: absence or a parse failure
/// degrades to an empty graph (every table resolves to LOW criticality).
pub fn load_lineage_or_default(path: &Path) -> LineageGraph {
    if !path.exists() {
        debug!(path = ?path, "No lineage file, assuming no downstream consumers");
        return LineageGraph::default();
    }
    match load_lineage(path) {
        Ok(graph) => graph,
        Err(e) => {
            warn!(path = ?path, "Failed to parse lineage file, assuming empty graph: {e}");
            LineageGraph::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::lineage::Criticality;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_lineage_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lineage.yaml");
        fs::write(
            &path,
            r#"
datasets:
  transactions:
    consumers:
      - name: Executive_Dashboard
        type: dashboard
        criticality: HIGH
"#,
        )
        .unwrap();
        let graph = load_lineage(&path).unwrap();
        assert_eq!(
            graph.datasets["transactions"].consumers[0].criticality,
            Criticality::High
        );
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let graph = load_lineage_or_default(Path::new("/no/such/lineage.yaml"));
        assert!(graph.datasets.is_empty());
    }

    #[test]
    fn test_parse_failure_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lineage.yaml");
        fs::write(&path, "datasets: [[[").unwrap();
        let graph = load_lineage_or_default(&path);
        assert!(graph.datasets.is_empty());
    }
}
