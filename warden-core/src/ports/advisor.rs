// warden-core/src/ports/advisor.rs
//
// Seam for externally-produced contract revisions (an LLM assistant, a
// human review queue). The gate never trusts advisor output: everything
// returned here still passes the remediation gates before it can be
// applied.

use async_trait::async_trait;

use crate::error::WardenError;

#[async_trait]
pub trait SchemaAdvisor: Send + Sync {
    /// Propose a revised contract document for `current_yaml` given a
    /// human-readable description of the observed schema drift. Returns the
    /// full proposed YAML.
    async fn propose_schema_update(
        &self,
        current_yaml: &str,
        diff_description: &str,
    ) -> Result<String, WardenError>;
}
