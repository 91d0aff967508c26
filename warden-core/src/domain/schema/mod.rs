// warden-core/src/domain/schema/mod.rs
//
// Structural validation of a loaded table against its contract.
// Produces a schema diff (missing / unexpected / type mismatches), the
// per-column rule violations, and the stop-or-continue decision.

use serde::{Deserialize, Serialize};

use crate::domain::checks::Predicate;
use crate::domain::contract::{CheckSeverity, ColumnSpec, Contract};
use crate::domain::table::{
    check_type_compat, parses_as_timestamp, Table, TypeCompat, Value,
};
use crate::domain::verdict::{Decision, Severity};

/// How many textual values are sampled when deciding whether a text column
/// satisfies a timestamp expectation.
const TIMESTAMP_SAMPLE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub column: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub missing_columns: Vec<String>,
    pub unexpected_columns: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
    /// Inferred specs for unexpected columns, handed to the remediator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_columns: Vec<ColumnSpec>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && self.type_mismatches.is_empty()
    }

    /// Human summary used when asking an advisor for a revised contract.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_columns.is_empty() {
            parts.push(format!("missing columns: {}", self.missing_columns.join(", ")));
        }
        if !self.unexpected_columns.is_empty() {
            parts.push(format!(
                "unexpected columns: {}",
                self.unexpected_columns.join(", ")
            ));
        }
        for m in &self.type_mismatches {
            parts.push(format!(
                "type mismatch on '{}': expected {}, found {}",
                m.column, m.expected, m.actual
            ));
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub issue: String,
    pub severity: Severity,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(
                f,
                "Column '{}': {} (expected: {}, actual: {})",
                col, self.issue, self.expected, self.actual
            ),
            None => write!(
                f,
                "{} (expected: {}, actual: {})",
                self.issue, self.expected, self.actual
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub diff: SchemaDiff,
    pub violations: Vec<SchemaViolation>,
    pub decision: Decision,
}

impl SchemaReport {
    pub fn critical_violations(&self) -> Vec<&SchemaViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .collect()
    }

    pub fn warning_violations(&self) -> Vec<&SchemaViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .collect()
    }
}

pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(contract: &Contract, table: &Table) -> SchemaReport {
        let mut diff = SchemaDiff::default();
        let mut violations = Vec::new();

        // 1. Missing columns
        for spec in &contract.columns {
            if table.column(&spec.name).is_none() {
                diff.missing_columns.push(spec.name.clone());
                let severity = if spec.required {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: "missing".into(),
                    severity,
                    expected: "column to exist".into(),
                    actual: "column not found".into(),
                });
            }
        }

        // 2. Unexpected columns, with an inferred spec for evolution
        let expected_names = contract.column_names();
        for col in &table.columns {
            if !expected_names.contains(&col.name.to_lowercase()) {
                diff.unexpected_columns.push(col.name.clone());
                violations.push(SchemaViolation {
                    column: Some(col.name.clone()),
                    issue: "unexpected".into(),
                    severity: Severity::Warning,
                    expected: "not defined in contract".into(),
                    actual: "column exists".into(),
                });
                diff.suggested_columns.push(ColumnSpec {
                    name: col.name.clone(),
                    physical_type: col.dtype.as_str().to_string(),
                    nullable: true,
                    required: false,
                    is_primary_key: false,
                    unique: false,
                    min_value: None,
                    max_value: None,
                    allowed_values: None,
                    pattern: None,
                    description: Some("Automatically detected column".into()),
                });
            }
        }

        // 3. Types and per-column rules for columns present on both sides
        for spec in &contract.columns {
            let Some(col) = table.column(&spec.name) else {
                continue;
            };

            let compatible = match check_type_compat(&spec.physical_type, col.dtype) {
                TypeCompat::Compatible => true,
                TypeCompat::Incompatible => false,
                TypeCompat::TextMaybeTimestamp => col
                    .values
                    .iter()
                    .filter_map(|v| match v {
                        Value::Text(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .take(TIMESTAMP_SAMPLE)
                    .all(parses_as_timestamp),
            };
            if !compatible {
                diff.type_mismatches.push(TypeMismatch {
                    column: spec.name.clone(),
                    expected: spec.physical_type.clone(),
                    actual: col.dtype.as_str().to_string(),
                });
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: "type_mismatch".into(),
                    severity: Severity::Critical,
                    expected: spec.physical_type.clone(),
                    actual: col.dtype.as_str().to_string(),
                });
                continue; // value-level rules are meaningless on the wrong type
            }

            violations.extend(Self::check_column_rules(spec, col, table.rows_loaded));
        }

        // 4. Dataset-level volume floor/ceiling
        if let Some(min_rows) = contract.quality.min_rows {
            if (table.rows_loaded as u64) < min_rows {
                violations.push(SchemaViolation {
                    column: None,
                    issue: "row_count_below_minimum".into(),
                    severity: Severity::Critical,
                    expected: format!(">= {min_rows} rows"),
                    actual: format!("{} rows", table.rows_loaded),
                });
            }
        }
        if let Some(max_rows) = contract.quality.max_rows {
            if (table.rows_loaded as u64) > max_rows {
                violations.push(SchemaViolation {
                    column: None,
                    issue: "row_count_above_maximum".into(),
                    severity: Severity::Critical,
                    expected: format!("<= {max_rows} rows"),
                    actual: format!("{} rows", table.rows_loaded),
                });
            }
        }

        // 5. Custom predicate checks
        for check in &contract.quality.custom_checks {
            let severity = match check.severity {
                CheckSeverity::Warning => Severity::Warning,
                CheckSeverity::Error => Severity::Critical,
            };
            match Predicate::parse(&check.name, &check.sql_condition)
                .and_then(|p| p.failing_rows(table).map(|rows| (p, rows)))
            {
                Ok((_, rows)) if rows.is_empty() => {}
                Ok((_, rows)) => violations.push(SchemaViolation {
                    column: None,
                    issue: format!("custom_check '{}'", check.name),
                    severity,
                    expected: check.sql_condition.clone(),
                    actual: format!("{} failing rows", rows.len()),
                }),
                Err(e) => violations.push(SchemaViolation {
                    column: None,
                    issue: format!("custom_check '{}' skipped", check.name),
                    severity: Severity::Warning,
                    expected: check.sql_condition.clone(),
                    actual: e.to_string(),
                }),
            }
        }

        // Strict mode escalates every warning-class violation to critical
        if contract.strict_mode {
            for v in &mut violations {
                v.severity = Severity::Critical;
            }
        }

        let has_critical = violations.iter().any(|v| v.severity == Severity::Critical);
        SchemaReport {
            diff,
            violations,
            decision: if has_critical {
                Decision::CriticalStop
            } else {
                Decision::Continue
            },
        }
    }

    fn check_column_rules(
        spec: &ColumnSpec,
        col: &crate::domain::table::Column,
        rows: usize,
    ) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        // Nullability
        if !spec.nullable {
            let nulls = col.null_count();
            if nulls > 0 {
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: "null_values".into(),
                    severity: Severity::Critical,
                    expected: "0 nulls".into(),
                    actual: format!("{nulls} nulls"),
                });
            }
        }

        // Uniqueness (primary key duplicates are always blocking)
        if spec.unique || spec.is_primary_key {
            let mut seen = std::collections::HashSet::new();
            let mut duplicates = 0usize;
            for value in &col.values {
                if let Some(key) = value.as_key() {
                    if !seen.insert(key) {
                        duplicates += 1;
                    }
                }
            }
            if duplicates > 0 {
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: if spec.is_primary_key {
                        "duplicate_primary_key".into()
                    } else {
                        "duplicate_values".into()
                    },
                    severity: if spec.is_primary_key {
                        Severity::Critical
                    } else {
                        Severity::Warning
                    },
                    expected: "unique values".into(),
                    actual: format!("{duplicates} duplicates"),
                });
            }
        }

        // Numeric range
        if spec.min_value.is_some() || spec.max_value.is_some() {
            let numeric = col.numeric_values();
            let below = spec
                .min_value
                .map(|min| numeric.iter().filter(|(_, v)| *v < min).count())
                .unwrap_or(0);
            let above = spec
                .max_value
                .map(|max| numeric.iter().filter(|(_, v)| *v > max).count())
                .unwrap_or(0);
            if below + above > 0 {
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: "value_out_of_range".into(),
                    severity: Severity::Warning,
                    expected: format!(
                        "within [{}, {}]",
                        spec.min_value.map_or("-inf".into(), |v| v.to_string()),
                        spec.max_value.map_or("+inf".into(), |v| v.to_string()),
                    ),
                    actual: format!("{} rows out of range", below + above),
                });
            }
        }

        // Allowed values
        if let Some(allowed) = &spec.allowed_values {
            let allowed: std::collections::HashSet<&str> =
                allowed.iter().map(String::as_str).collect();
            let offenders = col
                .values
                .iter()
                .filter_map(Value::as_key)
                .filter(|key| !allowed.contains(key.as_str()))
                .count();
            if offenders > 0 {
                violations.push(SchemaViolation {
                    column: Some(spec.name.clone()),
                    issue: "value_not_allowed".into(),
                    severity: Severity::Warning,
                    expected: format!("one of {:?}", spec.allowed_values),
                    actual: format!("{offenders} rows outside the allowed set"),
                });
            }
        }

        // Pattern (text columns only; invalid patterns are caught at
        // contract load, this compile cannot fail for a validated contract)
        if let Some(pattern) = &spec.pattern {
            if let Ok(re) = regex::Regex::new(pattern) {
                let offenders = col
                    .values
                    .iter()
                    .filter_map(|v| match v {
                        Value::Text(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .filter(|s| !re.is_match(s))
                    .count();
                if offenders > 0 {
                    violations.push(SchemaViolation {
                        column: Some(spec.name.clone()),
                        issue: "pattern_mismatch".into(),
                        severity: Severity::Warning,
                        expected: format!("matches /{pattern}/"),
                        actual: format!("{offenders} of {rows} rows do not match"),
                    });
                }
            }
        }

        violations
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::table::{Column, ColumnType};

    fn contract() -> Contract {
        Contract::from_yaml(
            r#"
table_name: transactions
columns:
  - name: transaction_id
    physical_type: string
    nullable: false
    required: true
    is_primary_key: true
  - name: amount
    physical_type: double
    nullable: false
    required: true
    min_value: 0.0
  - name: status
    physical_type: string
    allowed_values: [completed, pending, failed]
"#,
        )
        .unwrap()
    }

    fn good_table() -> Table {
        Table {
            columns: vec![
                Column {
                    name: "transaction_id".into(),
                    dtype: ColumnType::Text,
                    values: (0..10).map(|i| Value::Text(format!("txn_{i}"))).collect(),
                },
                Column {
                    name: "amount".into(),
                    dtype: ColumnType::Float,
                    values: (0..10).map(|i| Value::Float(10.0 * i as f64)).collect(),
                },
                Column {
                    name: "status".into(),
                    dtype: ColumnType::Text,
                    values: (0..10).map(|_| Value::Text("completed".into())).collect(),
                },
            ],
            rows_loaded: 10,
            sampled: false,
            sample_rate: 1.0,
        }
    }

    #[test]
    fn test_clean_table_passes() {
        let report = SchemaValidator::validate(&contract(), &good_table());
        assert!(report.violations.is_empty());
        assert_eq!(report.decision, Decision::Continue);
        assert!(report.diff.is_empty());
    }

    #[test]
    fn test_missing_required_column_is_critical() {
        let mut table = good_table();
        table.columns.remove(0); // drop transaction_id
        let report = SchemaValidator::validate(&contract(), &table);
        assert_eq!(report.diff.missing_columns, vec!["transaction_id"]);
        assert_eq!(report.decision, Decision::CriticalStop);
    }

    #[test]
    fn test_missing_optional_column_is_warning() {
        let mut c = contract();
        c.columns.push(ColumnSpec {
            name: "note".into(),
            physical_type: "string".into(),
            nullable: true,
            required: false,
            is_primary_key: false,
            unique: false,
            min_value: None,
            max_value: None,
            allowed_values: None,
            pattern: None,
            description: None,
        });
        let report = SchemaValidator::validate(&c, &good_table());
        assert_eq!(report.decision, Decision::Continue);
        assert_eq!(report.warning_violations().len(), 1);
    }

    #[test]
    fn test_unexpected_column_yields_suggestion() {
        let mut table = good_table();
        table.columns.push(Column {
            name: "loyalty_score".into(),
            dtype: ColumnType::Integer,
            values: (0..10).map(Value::Int).collect(),
        });
        let report = SchemaValidator::validate(&contract(), &table);
        assert_eq!(report.diff.unexpected_columns, vec!["loyalty_score"]);
        assert_eq!(report.decision, Decision::Continue);
        let suggestion = &report.diff.suggested_columns[0];
        assert_eq!(suggestion.name, "loyalty_score");
        assert_eq!(suggestion.physical_type, "integer");
    }

    #[test]
    fn test_strict_mode_escalates_unexpected() {
        let mut c = contract();
        c.strict_mode = true;
        let mut table = good_table();
        table.columns.push(Column {
            name: "loyalty_score".into(),
            dtype: ColumnType::Integer,
            values: (0..10).map(Value::Int).collect(),
        });
        let report = SchemaValidator::validate(&c, &table);
        assert_eq!(report.decision, Decision::CriticalStop);
    }

    #[test]
    fn test_type_mismatch_is_always_critical() {
        let mut table = good_table();
        table.columns[1].dtype = ColumnType::Text;
        table.columns[1].values = (0..10).map(|_| Value::Text("abc".into())).collect();
        let report = SchemaValidator::validate(&contract(), &table);
        assert_eq!(report.diff.type_mismatches.len(), 1);
        assert_eq!(report.decision, Decision::CriticalStop);
    }

    #[test]
    fn test_duplicate_primary_key_blocks() {
        let mut table = good_table();
        table.columns[0].values[1] = Value::Text("txn_0".into());
        let report = SchemaValidator::validate(&contract(), &table);
        assert_eq!(report.decision, Decision::CriticalStop);
        assert!(report
            .critical_violations()
            .iter()
            .any(|v| v.issue == "duplicate_primary_key"));
    }

    #[test]
    fn test_range_violation_is_warning() {
        let mut table = good_table();
        table.columns[1].values[0] = Value::Float(-5.0);
        let report = SchemaValidator::validate(&contract(), &table);
        assert_eq!(report.decision, Decision::Continue);
        assert!(report
            .warning_violations()
            .iter()
            .any(|v| v.issue == "value_out_of_range"));
    }

    #[test]
    fn test_min_rows_floor_is_critical() {
        let mut c = contract();
        c.quality.min_rows = Some(100);
        let report = SchemaValidator::validate(&c, &good_table());
        assert_eq!(report.decision, Decision::CriticalStop);
    }

    #[test]
    fn test_custom_check_failure_blocks_on_error_severity() {
        let mut c = contract();
        c.quality.custom_checks.push(crate::domain::contract::CustomCheck {
            name: "amount_cap".into(),
            sql_condition: "amount < 50".into(),
            severity: CheckSeverity::Error,
        });
        let report = SchemaValidator::validate(&c, &good_table());
        assert_eq!(report.decision, Decision::CriticalStop);
    }

    #[test]
    fn test_timestamp_expectation_accepts_parseable_text() {
        let c = Contract::from_yaml(
            r#"
table_name: events
columns:
  - name: occurred_at
    physical_type: timestamp
    required: true
"#,
        )
        .unwrap();
        let table = Table {
            columns: vec![Column {
                name: "occurred_at".into(),
                dtype: ColumnType::Text,
                values: vec![
                    Value::Text("2024-03-01 10:00:00".into()),
                    Value::Text("2024-03-02".into()),
                ],
            }],
            rows_loaded: 2,
            sampled: false,
            sample_rate: 1.0,
        };
        let report = SchemaValidator::validate(&c, &table);
        assert!(report.diff.type_mismatches.is_empty());

        let bad_table = Table {
            columns: vec![Column {
                name: "occurred_at".into(),
                dtype: ColumnType::Text,
                values: vec![Value::Text("yesterday-ish".into())],
            }],
            rows_loaded: 1,
            sampled: false,
            sample_rate: 1.0,
        };
        let report = SchemaValidator::validate(&c, &bad_table);
        assert_eq!(report.decision, Decision::CriticalStop);
    }
}
