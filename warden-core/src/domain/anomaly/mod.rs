// warden-core/src/domain/anomaly/mod.rs

pub mod baseline;
pub mod engine;
pub mod seasonal;

pub use baseline::{Baseline, BaselineKind};
pub use engine::{AnomalyAssessment, AnomalyEngine, MetricAssessment, MetricGrade};
pub use seasonal::{
    SeasonalAnalysis, SeasonalCheck, SeasonalDetector, SeasonalPattern, SeasonalSeverity,
};
