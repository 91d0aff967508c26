// warden-core/src/domain/anomaly/engine.rs
//
// Grades each metric of the current run against its learned baseline.
// Thresholds come from the contract (falling back to the global defaults):
// |z| > z_crit is an anomaly, (z_warn, z_crit] is a warning, and an
// initializing baseline never alarms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::anomaly::baseline::{Baseline, BaselineKind};
use crate::domain::contract::AnomalyThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricGrade {
    Normal,
    Warning,
    Critical,
    Initializing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAssessment {
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub baseline_kind: BaselineKind,
    pub z_score: f64,
    pub grade: MetricGrade,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    pub metrics: BTreeMap<String, MetricAssessment>,
    pub anomaly_count: u32,
    pub warning_count: u32,
    pub z_score_max: f64,
}

impl AnomalyAssessment {
    pub fn critical_metrics(&self) -> Vec<(&String, &MetricAssessment)> {
        self.metrics
            .iter()
            .filter(|(_, m)| m.grade == MetricGrade::Critical)
            .collect()
    }

    pub fn warning_metrics(&self) -> Vec<(&String, &MetricAssessment)> {
        self.metrics
            .iter()
            .filter(|(_, m)| m.grade == MetricGrade::Warning)
            .collect()
    }
}

pub struct AnomalyEngine;

impl AnomalyEngine {
    /// `entries` pairs each metric value with the baseline the store
    /// resolved for it.
    pub fn assess(
        entries: &[(String, f64, Baseline)],
        thresholds: &AnomalyThresholds,
    ) -> AnomalyAssessment {
        let mut assessment = AnomalyAssessment::default();

        for (name, value, baseline) in entries {
            let z = baseline.z_score(*value);
            let (grade, reason) = if baseline.kind == BaselineKind::Initializing {
                (
                    MetricGrade::Initializing,
                    "baseline initializing (insufficient history)".to_string(),
                )
            } else if z.abs() > thresholds.z_crit {
                (
                    MetricGrade::Critical,
                    format!(
                        "|z| = {:.2} exceeds critical threshold {:.2} (expected {:.2} ±{:.2}, got {})",
                        z.abs(),
                        thresholds.z_crit,
                        baseline.mean,
                        thresholds.z_crit * baseline.std,
                        value
                    ),
                )
            } else if z.abs() > thresholds.z_warn {
                (
                    MetricGrade::Warning,
                    format!(
                        "|z| = {:.2} exceeds warning threshold {:.2}",
                        z.abs(),
                        thresholds.z_warn
                    ),
                )
            } else {
                (MetricGrade::Normal, format!("normal (z = {z:.2})"))
            };

            match grade {
                MetricGrade::Critical => assessment.anomaly_count += 1,
                MetricGrade::Warning => assessment.warning_count += 1,
                _ => {}
            }
            if z.abs() > assessment.z_score_max {
                assessment.z_score_max = z.abs();
            }

            assessment.metrics.insert(
                name.clone(),
                MetricAssessment {
                    value: *value,
                    baseline_mean: baseline.mean,
                    baseline_std: baseline.std,
                    baseline_kind: baseline.kind,
                    z_score: z,
                    grade,
                    reason,
                },
            );
        }

        assessment
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn baseline(mean: f64, std: f64) -> Baseline {
        Baseline {
            mean,
            std,
            kind: BaselineKind::Seasonal,
            sample_count: 10,
        }
    }

    #[test]
    fn test_volume_drop_is_critical() {
        let entries = vec![("row_count".to_string(), 500.0, baseline(1000.0, 50.0))];
        let assessment = AnomalyEngine::assess(&entries, &AnomalyThresholds::default());
        let m = &assessment.metrics["row_count"];
        assert_eq!(m.grade, MetricGrade::Critical);
        assert_eq!(m.z_score, -10.0);
        assert_eq!(assessment.anomaly_count, 1);
        assert_eq!(assessment.z_score_max, 10.0);
    }

    #[test]
    fn test_exactly_at_crit_is_a_warning() {
        // |z| == z_crit must grade as warning: critical is strictly greater
        let entries = vec![("row_count".to_string(), 1150.0, baseline(1000.0, 50.0))];
        let assessment = AnomalyEngine::assess(&entries, &AnomalyThresholds::default());
        assert_eq!(assessment.metrics["row_count"].z_score, 3.0);
        assert_eq!(assessment.metrics["row_count"].grade, MetricGrade::Warning);
        assert_eq!(assessment.anomaly_count, 0);
        assert_eq!(assessment.warning_count, 1);
    }

    #[test]
    fn test_between_warn_and_crit_is_warning() {
        let entries = vec![("mean_amount".to_string(), 1140.0, baseline(1000.0, 50.0))];
        let assessment = AnomalyEngine::assess(&entries, &AnomalyThresholds::default());
        assert_eq!(
            assessment.metrics["mean_amount"].grade,
            MetricGrade::Warning
        );
    }

    #[test]
    fn test_initializing_baseline_never_alarms() {
        let entries = vec![(
            "row_count".to_string(),
            1_000_000.0,
            Baseline::initializing(),
        )];
        let assessment = AnomalyEngine::assess(&entries, &AnomalyThresholds::default());
        assert_eq!(
            assessment.metrics["row_count"].grade,
            MetricGrade::Initializing
        );
        assert_eq!(assessment.anomaly_count, 0);
        assert_eq!(assessment.z_score_max, 0.0);
    }

    #[test]
    fn test_contract_thresholds_override_defaults() {
        let thresholds = AnomalyThresholds {
            z_warn: 1.0,
            z_crit: 2.0,
            ..AnomalyThresholds::default()
        };
        let entries = vec![("row_count".to_string(), 1075.0, baseline(1000.0, 50.0))];
        let assessment = AnomalyEngine::assess(&entries, &thresholds);
        // z = 1.5: warning under the tightened thresholds, normal by default
        assert_eq!(assessment.metrics["row_count"].grade, MetricGrade::Warning);
    }
}
