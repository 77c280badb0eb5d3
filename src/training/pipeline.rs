//! Preprocessor and model bundled as one deployable unit

use super::metrics::ClassificationMetrics;
use super::models::{ChurnModel, ModelFamily};
use crate::error::Result;
use crate::preprocessing::Preprocessor;
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// Raw feature rows in, churn probabilities out
///
/// Callers never touch the engineered feature space, so the feature logic
/// used at training time is the one applied at serving time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferencePipeline {
    preprocessor: Preprocessor,
    model: ChurnModel,
}

impl InferencePipeline {
    pub const DECISION_THRESHOLD: f64 = 0.5;

    pub fn new(preprocessor: Preprocessor, model: ChurnModel) -> Self {
        Self {
            preprocessor,
            model,
        }
    }

    pub fn predict_proba(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = self.preprocessor.transform(df)?;
        self.model.predict_proba(&x)
    }

    pub fn predict(&self, df: &DataFrame) -> Result<Array1<i64>> {
        Ok(self
            .predict_proba(df)?
            .mapv(|p| i64::from(p >= Self::DECISION_THRESHOLD)))
    }

    /// Score a labelled raw frame (the target column must be present)
    pub fn evaluate(&self, df: &DataFrame) -> Result<ClassificationMetrics> {
        let (x, y) = self.preprocessor.transform_labelled(df)?;
        let proba = self.model.predict_proba(&x)?;
        ClassificationMetrics::compute(&y, &proba)
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn model(&self) -> &ChurnModel {
        &self.model
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    pub fn input_columns(&self) -> &[String] {
        self.preprocessor.input_columns()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
