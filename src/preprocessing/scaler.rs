//! Feature scaling

use crate::error::{ChurnflowError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard scaling (z-score normalization): (x - mean) / std
///
/// Uses the population standard deviation. A constant column gets a scale of 1
/// so it maps to zero instead of NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
    is_fitted: bool,
}

impl StandardScaler {
    /// Create a new scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn per-column mean and scale
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(ChurnflowError::DataError(
                "Cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        self.means.clear();
        self.scales.clear();
        for column in x.axis_iter(Axis(1)) {
            let n = column.len() as f64;
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            self.means.push(mean);
            self.scales.push(if std == 0.0 || !std.is_finite() { 1.0 } else { std });
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Apply the learned parameters
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (center, scale) = (self.means[j], self.scales[j]);
            column.mapv_inplace(|v| (v - center) / scale);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Undo the scaling
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (center, scale) = (self.means[j], self.scales[j]);
            column.mapv_inplace(|v| v * scale + center);
        }
        Ok(out)
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(ChurnflowError::ModelNotFitted);
        }
        if x.ncols() != self.means.len() {
            return Err(ChurnflowError::ShapeError {
                expected: format!("{} columns", self.means.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(())
    }
}
