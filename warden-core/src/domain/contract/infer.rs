// warden-core/src/domain/contract/infer.rs
//
// Draft-contract generation from an observed table and its profile.
// Output is purely advisory; a human (or the remediation gates) decides.

use crate::domain::contract::{
    ColumnSpec, Contract, ContractInfo, FreshnessRule, QualitySection,
};
use crate::domain::profile::TableProfile;
use crate::domain::table::Table;

/// Uniqueness share above which a column is proposed as unique.
const UNIQUE_PROPOSAL_PCT: f64 = 99.9;

pub struct ContractInferencer;

impl ContractInferencer {
    pub fn draft(table: &Table, profile: &TableProfile, table_name: &str) -> Contract {
        let columns = table
            .columns
            .iter()
            .map(|col| {
                let stats = profile.columns.get(&col.name);
                let null_pct = stats.map(|s| s.null_pct).unwrap_or(100.0);
                let unique_pct = stats.map(|s| s.unique_pct).unwrap_or(0.0);

                let fully_populated = null_pct == 0.0;
                let unique = unique_pct >= UNIQUE_PROPOSAL_PCT;
                // Key candidate only when uniqueness is perfect and nothing is missing
                let is_primary_key = unique_pct >= 100.0 && fully_populated;

                ColumnSpec {
                    name: col.name.clone(),
                    physical_type: col.dtype.as_str().to_string(),
                    nullable: !fully_populated,
                    required: fully_populated,
                    is_primary_key,
                    unique,
                    min_value: None,
                    max_value: None,
                    allowed_values: None,
                    pattern: None,
                    description: Some("Auto-detected".into()),
                }
            })
            .collect();

        Contract {
            table_name: table_name.to_string(),
            columns,
            quality: QualitySection {
                freshness: Some(FreshnessRule {
                    threshold: "24h".into(),
                }),
                ..QualitySection::default()
            },
            foreign_keys: vec![],
            info: ContractInfo {
                owner: Some("data-team".into()),
                ..ContractInfo::default()
            },
            strict_mode: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::profile::StatisticalProfiler;
    use crate::domain::table::{Column, ColumnType, Table, Value};

    fn sample_table() -> Table {
        Table {
            columns: vec![
                Column {
                    name: "order_id".into(),
                    dtype: ColumnType::Integer,
                    values: (0..50).map(Value::Int).collect(),
                },
                Column {
                    name: "note".into(),
                    dtype: ColumnType::Text,
                    values: (0..50)
                        .map(|i| {
                            if i % 10 == 0 {
                                Value::Null
                            } else {
                                Value::Text("ok".into())
                            }
                        })
                        .collect(),
                },
            ],
            rows_loaded: 50,
            sampled: false,
            sample_rate: 1.0,
        }
    }

    #[test]
    fn test_draft_marks_key_candidate() {
        let table = sample_table();
        let profile = StatisticalProfiler::profile(&table);
        let draft = ContractInferencer::draft(&table, &profile, "orders");

        let id = draft.column("order_id").unwrap();
        assert!(id.is_primary_key);
        assert!(id.unique);
        assert!(!id.nullable);
        assert!(id.required);

        let note = draft.column("note").unwrap();
        assert!(note.nullable);
        assert!(!note.required);
        assert!(!note.is_primary_key);
    }

    #[test]
    fn test_draft_has_default_freshness_and_loose_mode() {
        let table = sample_table();
        let profile = StatisticalProfiler::profile(&table);
        let draft = ContractInferencer::draft(&table, &profile, "orders");

        assert!(!draft.strict_mode);
        assert_eq!(draft.freshness_hours().unwrap(), 24.0);
        assert_eq!(draft.table_name, "orders");
        draft.validate().unwrap();
    }

    #[test]
    fn test_draft_roundtrips_through_yaml() {
        let table = sample_table();
        let profile = StatisticalProfiler::profile(&table);
        let draft = ContractInferencer::draft(&table, &profile, "orders");

        let yaml = draft.to_yaml().unwrap();
        let reparsed = Contract::from_yaml(&yaml).unwrap();
        assert_eq!(reparsed.columns.len(), 2);
        reparsed.validate().unwrap();
    }
}
