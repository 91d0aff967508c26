// warden-core/src/domain/contract/remediate.rs
//
// Contract remediation under safety gates. A proposal — whether built
// deterministically from a schema diff or supplied by a pluggable advisor —
// must clear both gates before the caller may apply it:
//   G1 (syntactic): parses as a contract with a non-empty column list
//   G2 (semantic non-shrink): never removes an existing column
// Applying is a separate store operation (archive first, then replace).

use crate::domain::contract::Contract;
use crate::domain::error::DomainError;
use crate::domain::schema::SchemaDiff as Diff;

pub struct SchemaRemediator;

impl SchemaRemediator {
    /// Deterministic proposal: the current contract plus a spec for every
    /// unexpected column observed in the data.
    pub fn build_proposal(current: &Contract, diff: &Diff) -> Contract {
        let mut proposal = current.clone();
        let existing = proposal.column_names();
        for suggestion in &diff.suggested_columns {
            if !existing.contains(&suggestion.name.to_lowercase()) {
                proposal.columns.push(suggestion.clone());
            }
        }
        proposal
    }

    /// Run both safety gates over proposal text. On success returns the
    /// parsed proposal; on failure the caller keeps the current contract.
    pub fn gate(current: &Contract, proposal_yaml: &str) -> Result<Contract, DomainError> {
        // G1: syntactic
        let proposal = Contract::from_yaml(proposal_yaml)
            .map_err(|e| DomainError::RemediationRejected(format!("proposal is not valid YAML: {e}")))?;
        if proposal.columns.is_empty() {
            return Err(DomainError::RemediationRejected(
                "proposal has an empty column list".into(),
            ));
        }
        proposal.validate().map_err(|e| {
            DomainError::RemediationRejected(format!("proposal violates contract invariants: {e}"))
        })?;

        // G2: semantic non-shrink
        let current_names = current.column_names();
        let proposed_names = proposal.column_names();
        let removed: Vec<String> = current_names
            .difference(&proposed_names)
            .cloned()
            .collect();
        if !removed.is_empty() {
            let mut removed = removed;
            removed.sort();
            return Err(DomainError::RemediationRejected(format!(
                "proposal removes existing columns: {}",
                removed.join(", ")
            )));
        }

        Ok(proposal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::contract::ColumnSpec;

    fn base_contract() -> Contract {
        Contract::from_yaml(
            r#"
table_name: transactions
columns:
  - name: transaction_id
    physical_type: string
    nullable: false
    required: true
  - name: amount
    physical_type: double
"#,
        )
        .unwrap()
    }

    fn suggestion(name: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            physical_type: "integer".into(),
            nullable: true,
            required: false,
            is_primary_key: false,
            unique: false,
            min_value: None,
            max_value: None,
            allowed_values: None,
            pattern: None,
            description: Some("Automatically detected column".into()),
        }
    }

    #[test]
    fn test_build_proposal_appends_suggestions() {
        let current = base_contract();
        let diff = Diff {
            suggested_columns: vec![suggestion("loyalty_score")],
            ..Diff::default()
        };
        let proposal = SchemaRemediator::build_proposal(&current, &diff);
        assert_eq!(proposal.columns.len(), 3);
        assert!(proposal.column("loyalty_score").is_some());

        // Round trip through the gates
        let yaml = proposal.to_yaml().unwrap();
        let gated = SchemaRemediator::gate(&current, &yaml).unwrap();
        assert_eq!(gated.columns.len(), 3);
    }

    #[test]
    fn test_build_proposal_skips_known_columns() {
        let current = base_contract();
        let diff = Diff {
            suggested_columns: vec![suggestion("amount")],
            ..Diff::default()
        };
        let proposal = SchemaRemediator::build_proposal(&current, &diff);
        assert_eq!(proposal.columns.len(), 2);
    }

    #[test]
    fn test_gate_rejects_unparseable_proposal() {
        let current = base_contract();
        let res = SchemaRemediator::gate(&current, "{{{ not yaml");
        assert!(matches!(res, Err(DomainError::RemediationRejected(_))));
    }

    #[test]
    fn test_gate_rejects_empty_columns() {
        let current = base_contract();
        let res = SchemaRemediator::gate(&current, "table_name: transactions\ncolumns: []\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_gate_rejects_column_removal() {
        let current = base_contract();
        let shrunk = r#"
table_name: transactions
columns:
  - name: transaction_id
    physical_type: string
    nullable: false
"#;
        let res = SchemaRemediator::gate(&current, shrunk);
        match res {
            Err(DomainError::RemediationRejected(msg)) => {
                assert!(msg.contains("amount"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_gate_superset_always_holds_on_success() {
        let current = base_contract();
        let mut grown = current.clone();
        grown.columns.push(suggestion("extra"));
        let gated = SchemaRemediator::gate(&current, &grown.to_yaml().unwrap()).unwrap();
        assert!(current.column_names().is_subset(&gated.column_names()));
    }
}
