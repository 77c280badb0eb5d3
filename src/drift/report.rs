//! Per-column drift report between a reference and a current frame

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, warn};

use super::{DriftDetector, KolmogorovSmirnovTest};
use crate::error::Result;
use crate::utils::{column_values, is_numeric_dtype, StatsSummary};

/// Below this many current rows the p-values are flagged unreliable
pub const DEFAULT_MIN_SAMPLES: usize = 50;

/// Outcome for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drifted: bool,
    pub reference: StatsSummary,
    pub current: StatsSummary,
}

/// Drift verdict for one monitoring run; never mutated once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Tested columns, in reference order
    pub features: Vec<FeatureDrift>,
    /// True when any tested column drifted
    pub drift_detected: bool,
    pub threshold: f64,
    /// False when the current sample is smaller than the minimum
    pub reliable: bool,
    pub reference_rows: usize,
    pub current_rows: usize,
    /// Shared numeric columns with no values left after dropping nulls
    pub skipped: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted summary record of a monitoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetadata {
    pub date: String,
    pub drift_detected: bool,
    pub threshold: f64,
    pub num_features: usize,
    pub num_drifted_features: usize,
    pub drifted_features: Vec<String>,
}

impl DriftReport {
    pub fn drifted_features(&self) -> Vec<String> {
        self.features
            .iter()
            .filter(|f| f.drifted)
            .map(|f| f.feature.clone())
            .collect()
    }

    pub fn metadata(&self, date: NaiveDate) -> DriftMetadata {
        let drifted_features = self.drifted_features();
        DriftMetadata {
            date: date.format("%Y-%m-%d").to_string(),
            drift_detected: self.drift_detected,
            threshold: self.threshold,
            num_features: self.features.len(),
            num_drifted_features: drifted_features.len(),
            drifted_features,
        }
    }

    /// Human-readable comparison, one table row per feature
    pub fn render_markdown(&self, date: NaiveDate) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Data drift report for {}", date.format("%Y-%m-%d"));
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "- Reference rows: {}\n- Current rows: {}\n- Threshold (p-value): {}\n- Drift detected: **{}**",
            self.reference_rows,
            self.current_rows,
            self.threshold,
            if self.drift_detected { "yes" } else { "no" }
        );
        if !self.reliable {
            let _ = writeln!(
                out,
                "\n> Current sample is small; p-values are not statistically reliable."
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "| Feature | Ref mean | Ref std | Cur mean | Cur std | KS statistic | p-value | Verdict |"
        );
        let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
        for f in &self.features {
            let _ = writeln!(
                out,
                "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {} |",
                f.feature,
                f.reference.mean,
                f.reference.std_dev,
                f.current.mean,
                f.current.std_dev,
                f.statistic,
                f.p_value,
                if f.drifted { "drifted" } else { "stable" }
            );
        }
        if !self.skipped.is_empty() {
            let _ = writeln!(out, "\nSkipped (no values): {}", self.skipped.join(", "));
        }
        out
    }
}

fn non_null(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(column_values(df, name)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

/// Compare every numeric column the two frames share
pub fn check_drift(reference: &DataFrame, current: &DataFrame, threshold: f64) -> Result<DriftReport> {
    check_drift_with_min_samples(reference, current, threshold, DEFAULT_MIN_SAMPLES)
}

pub fn check_drift_with_min_samples(
    reference: &DataFrame,
    current: &DataFrame,
    threshold: f64,
    min_samples: usize,
) -> Result<DriftReport> {
    let ks = KolmogorovSmirnovTest::new(threshold);
    let mut features = Vec::new();
    let mut skipped = Vec::new();

    for column in reference.get_columns() {
        let name = column.name().as_str();
        let Ok(other) = current.column(name) else {
            continue;
        };
        if !is_numeric_dtype(column.dtype()) || !is_numeric_dtype(other.dtype()) {
            continue;
        }

        let ref_values = non_null(reference, name)?;
        let cur_values = non_null(current, name)?;
        if ref_values.is_empty() || cur_values.is_empty() {
            warn!(feature = name, "Column has no values on one side, skipping");
            skipped.push(name.to_string());
            continue;
        }

        let result = ks.detect(
            &Array1::from_vec(ref_values.clone()),
            &Array1::from_vec(cur_values.clone()),
        )?;
        let p_value = result.p_value.unwrap_or(1.0);
        debug!(feature = name, statistic = result.statistic, p_value, "Column tested");
        features.push(FeatureDrift {
            feature: name.to_string(),
            statistic: result.statistic,
            p_value,
            drifted: result.drift_detected,
            reference: StatsSummary::from_values(&ref_values),
            current: StatsSummary::from_values(&cur_values),
        });
    }

    if features.is_empty() {
        warn!("No shared numeric columns to compare");
    }

    let reliable = current.height() >= min_samples;
    if !reliable {
        warn!(
            rows = current.height(),
            min_samples, "Current sample is small, drift result is statistically unreliable"
        );
    }

    // Any single column is enough; no multiple-comparison correction
    let drift_detected = features.iter().any(|f| f.drifted);

    Ok(DriftReport {
        features,
        drift_detected,
        threshold,
        reliable,
        reference_rows: reference.height(),
        current_rows: current.height(),
        skipped,
        created_at: Utc::now(),
    })
}
