// warden-core/src/domain/table/mod.rs
//
// In-memory columnar representation of one loaded data file.
// The loader (infrastructure) fills it; every validator reads it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Concrete dtype of a loaded column, after widening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

/// One cell. Missing values are explicit so null fractions stay honest.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view, used by the profiler and range rules.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Canonical string form, used for FK comparison and allowed_values.
    /// Integral floats print without a trailing `.0` so `1` and `1.0` join.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    Some(format!("{}", *v as i64))
                } else {
                    Some(v.to_string())
                }
            }
            Value::Bool(b) => Some(b.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(ts.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Non-null values as f64, preserving their row index.
    pub fn numeric_values(&self) -> Vec<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_f64().map(|f| (i, f)))
            .collect()
    }
}

/// A loaded data file. `rows_loaded` may be below the physical row count
/// when the loader sampled.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows_loaded: usize,
    pub sampled: bool,
    pub sample_rate: f64,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Type compatibility matrix for schema validation.
///
/// Expected (contract) -> acceptable actual (loaded) types:
///   integer   <-> int, bigint, smallint
///   float     <-> float, double
///   string    <-> varchar, text, object
///   boolean   <-> boolean
///   timestamp <-> timestamp, string-parseable-as-timestamp
///
/// The string-parseable case is decided by the caller, which has the data;
/// this function reports `TextMaybeTimestamp` so the validator can sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCompat {
    Compatible,
    Incompatible,
    /// Expected timestamp, got text: compatible only if values parse.
    TextMaybeTimestamp,
}

pub fn check_type_compat(expected: &str, actual: ColumnType) -> TypeCompat {
    let normalized = normalize_physical_type(expected);
    match (normalized, actual) {
        (Some(ColumnType::Integer), ColumnType::Integer) => TypeCompat::Compatible,
        (Some(ColumnType::Float), ColumnType::Float) => TypeCompat::Compatible,
        (Some(ColumnType::Text), ColumnType::Text) => TypeCompat::Compatible,
        (Some(ColumnType::Boolean), ColumnType::Boolean) => TypeCompat::Compatible,
        (Some(ColumnType::Timestamp), ColumnType::Timestamp) => TypeCompat::Compatible,
        (Some(ColumnType::Timestamp), ColumnType::Text) => TypeCompat::TextMaybeTimestamp,
        _ => TypeCompat::Incompatible,
    }
}

/// Collapse the zoo of physical type spellings into the widened dtype.
pub fn normalize_physical_type(raw: &str) -> Option<ColumnType> {
    let base = raw
        .split('(')
        .next()
        .unwrap_or(raw)
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "integer" | "int" | "int4" | "int8" | "int16" | "int32" | "int64" | "bigint"
        | "smallint" | "tinyint" | "hugeint" | "long" | "short" => Some(ColumnType::Integer),
        "float" | "float4" | "float8" | "float32" | "float64" | "double" | "real" | "decimal"
        | "numeric" => Some(ColumnType::Float),
        "string" | "varchar" | "text" | "char" | "object" | "utf8" => Some(ColumnType::Text),
        "boolean" | "bool" => Some(ColumnType::Boolean),
        "timestamp" | "datetime" | "date" | "timestamptz" => Some(ColumnType::Timestamp),
        _ => None,
    }
}

/// Accepted textual timestamp layouts for the `TextMaybeTimestamp` case.
pub fn parses_as_timestamp(raw: &str) -> bool {
    let s = raw.trim();
    if s.is_empty() {
        return false;
    }
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn int_col(name: &str, values: Vec<i64>) -> Column {
        Column {
            name: name.to_string(),
            dtype: ColumnType::Integer,
            values: values.into_iter().map(Value::Int).collect(),
        }
    }

    #[test]
    fn test_compat_integer_family() {
        for spelling in ["int", "bigint", "smallint", "int64"] {
            assert_eq!(
                check_type_compat(spelling, ColumnType::Integer),
                TypeCompat::Compatible
            );
        }
        assert_eq!(
            check_type_compat("integer", ColumnType::Float),
            TypeCompat::Incompatible
        );
    }

    #[test]
    fn test_compat_groups_are_disjoint() {
        // int and float expectations never satisfy each other
        assert_eq!(
            check_type_compat("double", ColumnType::Integer),
            TypeCompat::Incompatible
        );
        assert_eq!(
            check_type_compat("bigint", ColumnType::Float),
            TypeCompat::Incompatible
        );
    }

    #[test]
    fn test_compat_string_family() {
        for spelling in ["varchar", "text", "object", "string"] {
            assert_eq!(
                check_type_compat(spelling, ColumnType::Text),
                TypeCompat::Compatible
            );
        }
    }

    #[test]
    fn test_compat_timestamp_text_needs_sampling() {
        assert_eq!(
            check_type_compat("timestamp", ColumnType::Text),
            TypeCompat::TextMaybeTimestamp
        );
        assert!(parses_as_timestamp("2024-03-01 10:00:00"));
        assert!(parses_as_timestamp("2024-03-01"));
        assert!(!parses_as_timestamp("not a date"));
    }

    #[test]
    fn test_value_key_joins_int_and_float() {
        assert_eq!(Value::Int(42).as_key().unwrap(), "42");
        assert_eq!(Value::Float(42.0).as_key().unwrap(), "42");
        assert_eq!(Value::Float(42.5).as_key().unwrap(), "42.5");
        assert!(Value::Null.as_key().is_none());
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = Table {
            columns: vec![int_col("Amount", vec![1, 2, 3])],
            rows_loaded: 3,
            sampled: false,
            sample_rate: 1.0,
        };
        assert!(table.column("amount").is_some());
        assert!(table.column("missing").is_none());
    }
}
