// warden-core/src/domain/anomaly/seasonal.rs
//
// Learned calendar patterns: the expected distribution of a metric for a
// given weekday (short-term rhythm) or month (tax-season style effects).
// Day-of-week wins when both exist. Grading is 2-sigma/3-sigma, independent
// of the contract's z thresholds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub expected_mean: f64,
    pub expected_std: f64,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeasonalSeverity {
    Normal,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalCheck {
    pub is_anomaly: bool,
    pub severity: SeasonalSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_range: Option<(f64, f64)>,
    pub current_value: f64,
    pub deviation_sigma: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeasonalAnalysis {
    pub metrics: BTreeMap<String, SeasonalCheck>,
}

impl SeasonalAnalysis {
    pub fn anomalies(&self) -> Vec<(&String, &SeasonalCheck)> {
        self.metrics.iter().filter(|(_, c)| c.is_anomaly).collect()
    }
}

pub struct SeasonalDetector;

impl SeasonalDetector {
    /// Grade `current_value` against the learned weekday pattern, falling
    /// back to the monthly pattern.
    pub fn grade(
        weekday_pattern: Option<SeasonalPattern>,
        monthly_pattern: Option<SeasonalPattern>,
        weekday_name: &str,
        month_name: &str,
        current_value: f64,
    ) -> SeasonalCheck {
        let (pattern, pattern_type) = match (weekday_pattern, monthly_pattern) {
            (Some(p), _) => (p, format!("day-of-week ({weekday_name})")),
            (None, Some(p)) => (p, format!("monthly ({month_name})")),
            (None, None) => {
                return SeasonalCheck {
                    is_anomaly: false,
                    severity: SeasonalSeverity::Unknown,
                    expected_mean: None,
                    expected_range: None,
                    current_value,
                    deviation_sigma: 0.0,
                    pattern_type: None,
                    context: "Insufficient historical data for seasonal analysis".into(),
                };
            }
        };

        // A perfectly constant pattern still needs a tolerance band
        let std = if pattern.expected_std == 0.0 {
            pattern.expected_mean.abs() * 0.1
        } else {
            pattern.expected_std
        };
        let deviation_sigma = if std == 0.0 {
            0.0
        } else {
            (current_value - pattern.expected_mean).abs() / std
        };

        let low = pattern.expected_mean - 2.0 * std;
        let high = pattern.expected_mean + 2.0 * std;

        let (is_anomaly, severity, context) = if deviation_sigma <= 2.0 {
            (
                false,
                SeasonalSeverity::Normal,
                format!("Value is within expected {pattern_type} range"),
            )
        } else if deviation_sigma <= 3.0 {
            (
                true,
                SeasonalSeverity::Warning,
                format!("Value deviates {deviation_sigma:.1} sigma from {pattern_type} norm"),
            )
        } else {
            (
                true,
                SeasonalSeverity::Critical,
                format!(
                    "Significant anomaly: {deviation_sigma:.1} sigma from {pattern_type} norm"
                ),
            )
        };

        SeasonalCheck {
            is_anomaly,
            severity,
            expected_mean: Some(pattern.expected_mean),
            expected_range: Some((low, high)),
            current_value,
            deviation_sigma,
            pattern_type: Some(pattern_type),
            context,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pattern(mean: f64, std: f64) -> SeasonalPattern {
        SeasonalPattern {
            expected_mean: mean,
            expected_std: std,
            sample_count: 5,
        }
    }

    #[test]
    fn test_within_band_is_normal() {
        let check = SeasonalDetector::grade(
            Some(pattern(1000.0, 50.0)),
            None,
            "Monday",
            "March",
            1080.0,
        );
        assert!(!check.is_anomaly);
        assert_eq!(check.severity, SeasonalSeverity::Normal);
        assert_eq!(check.expected_range.unwrap(), (900.0, 1100.0));
    }

    #[test]
    fn test_between_two_and_three_sigma_warns() {
        let check = SeasonalDetector::grade(
            Some(pattern(1000.0, 50.0)),
            None,
            "Monday",
            "March",
            1130.0,
        );
        assert!(check.is_anomaly);
        assert_eq!(check.severity, SeasonalSeverity::Warning);
    }

    #[test]
    fn test_beyond_three_sigma_is_critical() {
        let check = SeasonalDetector::grade(
            Some(pattern(1000.0, 50.0)),
            None,
            "Monday",
            "March",
            500.0,
        );
        assert_eq!(check.severity, SeasonalSeverity::Critical);
        assert!(check.context.contains("Significant anomaly"));
    }

    #[test]
    fn test_weekday_pattern_preferred_over_monthly() {
        let check = SeasonalDetector::grade(
            Some(pattern(1000.0, 50.0)),
            Some(pattern(2000.0, 10.0)),
            "Friday",
            "June",
            1000.0,
        );
        assert!(check.pattern_type.unwrap().contains("day-of-week"));
        assert!(!check.is_anomaly);
    }

    #[test]
    fn test_no_patterns_is_unknown() {
        let check = SeasonalDetector::grade(None, None, "Friday", "June", 42.0);
        assert_eq!(check.severity, SeasonalSeverity::Unknown);
        assert!(!check.is_anomaly);
    }

    #[test]
    fn test_constant_pattern_gets_tolerance_band() {
        let check = SeasonalDetector::grade(
            Some(pattern(100.0, 0.0)),
            None,
            "Monday",
            "March",
            105.0,
        );
        // std widened to 10% of mean, so 105 is half a sigma away
        assert!(!check.is_anomaly);
    }
}
