// warden-core/src/domain/anomaly/baseline.rs

use serde::{Deserialize, Serialize};

/// Where a baseline's statistics came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineKind {
    /// >= 3 samples for the same weekday.
    Seasonal,
    /// Last 30 samples regardless of weekday.
    Global,
    /// Not enough history for either.
    Initializing,
}

/// Historical mean/std for one metric, as learned by the baseline store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    pub kind: BaselineKind,
    pub sample_count: u64,
}

impl Baseline {
    pub fn initializing() -> Self {
        Self {
            mean: 0.0,
            std: 0.0,
            kind: BaselineKind::Initializing,
            sample_count: 0,
        }
    }

    /// Deviation of `value` in standard deviations.
    ///
    /// A zero-std baseline (perfectly constant history) yields a capped
    /// signed score of ±10 for any departure from the constant; an
    /// initializing baseline always yields 0.
    pub fn z_score(&self, value: f64) -> f64 {
        match self.kind {
            BaselineKind::Initializing => 0.0,
            _ => {
                if self.std == 0.0 {
                    if value == self.mean {
                        0.0
                    } else if value > self.mean {
                        10.0
                    } else {
                        -10.0
                    }
                } else {
                    (value - self.mean) / self.std
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_basic() {
        let b = Baseline {
            mean: 1000.0,
            std: 50.0,
            kind: BaselineKind::Seasonal,
            sample_count: 10,
        };
        assert_eq!(b.z_score(1000.0), 0.0);
        assert_eq!(b.z_score(1100.0), 2.0);
        assert_eq!(b.z_score(500.0), -10.0);
    }

    #[test]
    fn test_zero_std_is_capped_and_signed() {
        let b = Baseline {
            mean: 100.0,
            std: 0.0,
            kind: BaselineKind::Global,
            sample_count: 5,
        };
        assert_eq!(b.z_score(100.0), 0.0);
        assert_eq!(b.z_score(101.0), 10.0);
        assert_eq!(b.z_score(99.0), -10.0);
    }

    #[test]
    fn test_initializing_never_deviates() {
        let b = Baseline::initializing();
        assert_eq!(b.z_score(1_000_000.0), 0.0);
    }
}
