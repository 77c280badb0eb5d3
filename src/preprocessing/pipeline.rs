//! Fitted preprocessing pipeline shared by training and serving

use super::{FeatureEngineer, LabelEncoder, StandardScaler};
use crate::error::{ChurnflowError, Result};
use crate::utils::{frame_to_array, is_numeric_dtype};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Label encoding, feature engineering and scaling, fit once on training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    target_column: String,
    label_encoder: LabelEncoder,
    engineer: FeatureEngineer,
    /// Raw columns callers must supply, in training order
    input_columns: Vec<String>,
    /// Columns of the transformed matrix, in order
    feature_names: Vec<String>,
    scaler: StandardScaler,
    is_fitted: bool,
}

impl Preprocessor {
    pub fn new(
        target_column: impl Into<String>,
        label_encoder: LabelEncoder,
        engineer: FeatureEngineer,
    ) -> Self {
        Self {
            target_column: target_column.into(),
            label_encoder,
            engineer,
            input_columns: Vec::new(),
            feature_names: Vec::new(),
            scaler: StandardScaler::new(),
            is_fitted: false,
        }
    }

    /// Fit on the training split and return its transformed features and labels
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<(Array2<f64>, Array1<i64>)> {
        let start = Instant::now();
        let y = self.encode_target(df)?;

        let features = df.drop(&self.target_column)?;
        let input_columns: Vec<String> = features
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let engineered = self.engineer.transform(&features)?;
        let mut feature_names = Vec::with_capacity(engineered.width());
        for column in engineered.get_columns() {
            if !is_numeric_dtype(column.dtype()) {
                return Err(ChurnflowError::DataError(format!(
                    "Feature '{}' has non-numeric dtype {}",
                    column.name(),
                    column.dtype()
                )));
            }
            feature_names.push(column.name().to_string());
        }

        let x = frame_to_array(&engineered, &feature_names)?;
        let x = self.scaler.fit_transform(&x)?;

        self.input_columns = input_columns;
        self.feature_names = feature_names;
        self.is_fitted = true;

        debug!(
            rows = x.nrows(),
            features = x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Preprocessor fitted"
        );
        Ok((x, y))
    }

    /// Transform raw feature rows with the fitted parameters
    ///
    /// Extra columns (the target included) are ignored; missing required
    /// columns are an error.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ChurnflowError::ModelNotFitted);
        }
        for name in &self.input_columns {
            if df.column(name).is_err() {
                return Err(ChurnflowError::FeatureNotFound(name.clone()));
            }
        }

        let features = df.select(self.input_columns.iter().map(|s| s.as_str()))?;
        let engineered = self.engineer.transform(&features)?;
        let x = frame_to_array(&engineered, &self.feature_names)?;
        self.scaler.transform(&x)
    }

    /// Transform a labelled frame (held-out test data)
    pub fn transform_labelled(&self, df: &DataFrame) -> Result<(Array2<f64>, Array1<i64>)> {
        let x = self.transform(df)?;
        let y = self.encode_target(df)?;
        Ok((x, y))
    }

    pub fn encode_target(&self, df: &DataFrame) -> Result<Array1<i64>> {
        let column = df
            .column(&self.target_column)
            .map_err(|_| ChurnflowError::FeatureNotFound(self.target_column.clone()))?;
        self.label_encoder.encode(column)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    pub fn label_encoder(&self) -> &LabelEncoder {
        &self.label_encoder
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::utils::save_bytes(path, &self.to_bytes()?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::DerivedFeature;

    fn sample() -> DataFrame {
        df!(
            "a" => &[1i64, 2, 3, 4],
            "b" => &[2.0f64, 0.0, 4.0, 8.0],
            "target" => &["no", "yes", "no", "no"]
        )
        .unwrap()
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(
            "target",
            LabelEncoder::new("yes", "no"),
            FeatureEngineer::new(vec![DerivedFeature::ratio("a_per_b", "a", "b")], vec![]),
        )
    }

    #[test]
    fn test_fit_transform_orders_features() {
        let mut pre = preprocessor();
        let (x, y) = pre.fit_transform(&sample()).unwrap();

        assert_eq!(pre.feature_names(), &["a", "b", "a_per_b"]);
        assert_eq!(pre.input_columns(), &["a", "b"]);
        assert_eq!(x.shape(), &[4, 3]);
        assert_eq!(y.to_vec(), vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_transform_does_not_refit() {
        let mut pre = preprocessor();
        let (train_x, _) = pre.fit_transform(&sample()).unwrap();

        // Same rows, reordered columns and no target
        let raw = df!("b" => &[2.0f64], "a" => &[1i64]).unwrap();
        let x = pre.transform(&raw).unwrap();
        for j in 0..3 {
            assert!((x[[0, j]] - train_x[[0, j]]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_input_column() {
        let mut pre = preprocessor();
        pre.fit_transform(&sample()).unwrap();
        let raw = df!("a" => &[1i64]).unwrap();
        assert!(matches!(
            pre.transform(&raw),
            Err(ChurnflowError::FeatureNotFound(name)) if name == "b"
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut pre = preprocessor();
        pre.fit_transform(&sample()).unwrap();
        let restored = Preprocessor::from_bytes(&pre.to_bytes().unwrap()).unwrap();
        assert_eq!(pre, restored);
    }
}
