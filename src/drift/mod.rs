//! Drift detection module
//!
//! Two-sample distribution tests, the per-column drift report built on them,
//! and the scheduled monitor that compares logged production inputs with the
//! training reference and triggers retraining.

mod data_drift;
mod monitor;
mod report;

pub use data_drift::{ChiSquareTest, KolmogorovSmirnovTest};
pub use monitor::{
    maybe_retrain, DriftMonitor, MonitorOutcome, RetrainDecision, RetrainingLauncher,
    DRIFT_TRIGGER_REASON,
};
pub use report::{
    check_drift, check_drift_with_min_samples, DriftMetadata, DriftReport, FeatureDrift,
    DEFAULT_MIN_SAMPLES,
};

use crate::error::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Drift detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    /// Whether drift was detected
    pub drift_detected: bool,
    /// Test statistic
    pub statistic: f64,
    /// P-value (if applicable)
    pub p_value: Option<f64>,
    /// Threshold used for detection
    pub threshold: f64,
    pub message: String,
}

impl DriftResult {
    /// Drift when `p_value < alpha`
    pub fn from_p_value(statistic: f64, p_value: f64, alpha: f64, test: &str) -> Self {
        let drift_detected = p_value < alpha;
        let message = if drift_detected {
            format!("{} drift: p = {:.4} < {}", test, p_value, alpha)
        } else {
            format!("{} no drift: p = {:.4}", test, p_value)
        };
        Self {
            drift_detected,
            statistic,
            p_value: Some(p_value),
            threshold: alpha,
            message,
        }
    }
}

/// Trait for drift detectors
pub trait DriftDetector: Send + Sync {
    /// Detect drift between reference and current data
    fn detect(&self, reference: &Array1<f64>, current: &Array1<f64>) -> Result<DriftResult>;

    /// Get the threshold used for detection
    fn threshold(&self) -> f64;
}
