// warden-core/src/domain/profile/mod.rs
//
// Per-column statistical profiling with adaptive outlier detection:
// Z-score for roughly normal distributions, IQR for skewed ones.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;

use crate::domain::table::{Column, Table};

const SKEW_CUTOVER: f64 = 1.0;
const ZSCORE_THRESHOLD: f64 = 3.0;
const IQR_MULTIPLIER: f64 = 1.5;
const OUTLIER_INDEX_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMethod {
    #[serde(rename = "Z-Score")]
    ZScore,
    #[serde(rename = "IQR")]
    Iqr,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub dtype: String,
    pub null_pct: f64,
    pub unique_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skewness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kurtosis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_method: Option<OutlierMethod>,
    #[serde(default)]
    pub outlier_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outlier_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableProfile {
    pub row_count: usize,
    pub columns: BTreeMap<String, ColumnProfile>,
}

impl TableProfile {
    /// Metrics fed to the anomaly engine: the mean of every numeric column
    /// and the null rate of every column. `row_count` is added by the caller.
    pub fn drift_metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        for (name, profile) in &self.columns {
            metrics.insert(format!("null_rate_{name}"), profile.null_pct / 100.0);
            if let Some(mean) = profile.mean {
                metrics.insert(format!("mean_{name}"), mean);
            }
        }
        metrics
    }

    /// All outlier row indices across columns, deduplicated and sorted.
    pub fn quarantine_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .columns
            .values()
            .flat_map(|p| p.outlier_indices.iter().copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

pub struct StatisticalProfiler;

impl StatisticalProfiler {
    pub fn profile(table: &Table) -> TableProfile {
        let mut columns = BTreeMap::new();
        for column in &table.columns {
            columns.insert(column.name.clone(), Self::profile_column(column, table.rows_loaded));
        }
        TableProfile {
            row_count: table.rows_loaded,
            columns,
        }
    }

    fn profile_column(column: &Column, rows: usize) -> ColumnProfile {
        let mut profile = ColumnProfile {
            dtype: column.dtype.as_str().to_string(),
            ..ColumnProfile::default()
        };
        if rows == 0 {
            return profile;
        }

        let null_count = column.null_count();
        profile.null_pct = (null_count as f64 / rows as f64) * 100.0;

        let distinct: std::collections::HashSet<String> = column
            .values
            .iter()
            .filter_map(|v| v.as_key())
            .collect();
        profile.unique_pct = (distinct.len() as f64 / rows as f64) * 100.0;

        if !column.dtype.is_numeric() {
            return profile;
        }

        let indexed: Vec<(usize, f64)> = column.numeric_values();
        if indexed.is_empty() {
            return profile;
        }
        let values: Vec<f64> = indexed.iter().map(|(_, v)| *v).collect();

        profile.min = Some(Statistics::min(&values));
        profile.max = Some(Statistics::max(&values));
        let mean = Statistics::mean(&values);
        profile.mean = Some(mean);
        profile.std = Some(if values.len() > 1 {
            Statistics::std_dev(&values)
        } else {
            0.0
        });

        let mut data = Data::new(values.clone());
        profile.median = Some(data.median());

        let skew = sample_skewness(&values, mean);
        profile.skewness = Some(skew);
        profile.kurtosis = Some(sample_excess_kurtosis(&values, mean));

        // Adaptive method: roughly normal -> Z-score, skewed -> IQR
        let outliers = if skew.abs() < SKEW_CUTOVER {
            profile.outlier_method = Some(OutlierMethod::ZScore);
            zscore_outliers(&indexed, ZSCORE_THRESHOLD)
        } else {
            profile.outlier_method = Some(OutlierMethod::Iqr);
            iqr_outliers(&indexed, &mut data, IQR_MULTIPLIER)
        };
        profile.outlier_count = outliers.len();
        profile.outlier_indices = outliers.into_iter().take(OUTLIER_INDEX_CAP).collect();

        profile
    }
}

/// Adjusted Fisher-Pearson skewness (matches the usual sample estimator).
fn sample_skewness(values: &[f64], mean: f64) -> f64 {
    let n = values.len() as f64;
    if n < 3.0 {
        return 0.0;
    }
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    ((n * (n - 1.0)).sqrt() / (n - 2.0)) * g1
}

/// Bias-corrected excess kurtosis.
fn sample_excess_kurtosis(values: &[f64], mean: f64) -> f64 {
    let n = values.len() as f64;
    if n < 4.0 {
        return 0.0;
    }
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    ((n - 1.0) / ((n - 2.0) * (n - 3.0))) * ((n + 1.0) * g2 + 6.0)
}

/// Z-score outliers over the population distribution of non-null values.
fn zscore_outliers(indexed: &[(usize, f64)], threshold: f64) -> Vec<usize> {
    let n = indexed.len() as f64;
    let mean = indexed.iter().map(|(_, v)| v).sum::<f64>() / n;
    let variance = indexed.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std <= f64::EPSILON {
        return Vec::new();
    }
    indexed
        .iter()
        .filter(|(_, v)| ((v - mean) / std).abs() > threshold)
        .map(|(i, _)| *i)
        .collect()
}

fn iqr_outliers(
    indexed: &[(usize, f64)],
    data: &mut Data<Vec<f64>>,
    multiplier: f64,
) -> Vec<usize> {
    let q1 = data.lower_quartile();
    let q3 = data.upper_quartile();
    let iqr = q3 - q1;
    let lower = q1 - multiplier * iqr;
    let upper = q3 + multiplier * iqr;
    indexed
        .iter()
        .filter(|(_, v)| *v < lower || *v > upper)
        .map(|(i, _)| *i)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::table::{Column, ColumnType, Value};

    fn table_of(values: Vec<Value>) -> Table {
        let rows = values.len();
        Table {
            columns: vec![Column {
                name: "amount".into(),
                dtype: ColumnType::Float,
                values,
            }],
            rows_loaded: rows,
            sampled: false,
            sample_rate: 1.0,
        }
    }

    #[test]
    fn test_null_and_unique_fractions() {
        let table = table_of(vec![
            Value::Float(1.0),
            Value::Float(2.0),
            Value::Float(2.0),
            Value::Null,
        ]);
        let profile = StatisticalProfiler::profile(&table);
        let col = &profile.columns["amount"];
        assert_eq!(col.null_pct, 25.0);
        assert_eq!(col.unique_pct, 50.0); // 2 distinct of 4 rows
    }

    #[test]
    fn test_normal_distribution_uses_zscore() {
        // Symmetric values with one far outlier
        let mut values: Vec<Value> = (0..100)
            .map(|i| Value::Float(50.0 + ((i % 11) as f64 - 5.0)))
            .collect();
        values.push(Value::Float(500.0));
        let table = table_of(values);
        let profile = StatisticalProfiler::profile(&table);
        let col = &profile.columns["amount"];
        assert_eq!(col.outlier_method, Some(OutlierMethod::ZScore));
        assert!(col.outlier_indices.contains(&100));
    }

    #[test]
    fn test_skewed_distribution_uses_iqr() {
        // Heavy right tail forces |skew| >= 1
        let mut values: Vec<Value> = (0..50).map(|_| Value::Float(1.0)).collect();
        values.extend((0..5).map(|i| Value::Float(1000.0 * (i + 1) as f64)));
        let table = table_of(values);
        let profile = StatisticalProfiler::profile(&table);
        let col = &profile.columns["amount"];
        assert_eq!(col.outlier_method, Some(OutlierMethod::Iqr));
        assert!(col.outlier_count >= 5);
    }

    #[test]
    fn test_constant_column_has_no_outliers() {
        let table = table_of(vec![Value::Float(7.0); 20]);
        let profile = StatisticalProfiler::profile(&table);
        let col = &profile.columns["amount"];
        assert_eq!(col.outlier_count, 0);
        assert_eq!(col.std, Some(0.0));
        assert_eq!(col.mean, Some(7.0));
    }

    #[test]
    fn test_non_numeric_column_gets_basic_stats_only() {
        let table = Table {
            columns: vec![Column {
                name: "status".into(),
                dtype: ColumnType::Text,
                values: vec![
                    Value::Text("ok".into()),
                    Value::Text("ok".into()),
                    Value::Text("bad".into()),
                ],
            }],
            rows_loaded: 3,
            sampled: false,
            sample_rate: 1.0,
        };
        let profile = StatisticalProfiler::profile(&table);
        let col = &profile.columns["status"];
        assert!(col.mean.is_none());
        assert!(col.outlier_method.is_none());
        assert!((col.unique_pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_drift_metrics_shape() {
        let table = table_of(vec![Value::Float(10.0), Value::Float(20.0)]);
        let profile = StatisticalProfiler::profile(&table);
        let metrics = profile.drift_metrics();
        assert_eq!(metrics["mean_amount"], 15.0);
        assert_eq!(metrics["null_rate_amount"], 0.0);
    }
}
