//! Model families and the fitted churn model

use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::random_forest::{RandomForest, RandomForestParams};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    GradientBoosted,
    RandomForest,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::GradientBoosted => f.write_str("gradient_boosted"),
            ModelFamily::RandomForest => f.write_str("random_forest"),
        }
    }
}

/// Model family plus its typed hyperparameters, as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    GradientBoosted(GradientBoostingConfig),
    RandomForest(RandomForestParams),
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::GradientBoosted(GradientBoostingConfig::default())
    }
}

impl ModelSpec {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelSpec::GradientBoosted(_) => ModelFamily::GradientBoosted,
            ModelSpec::RandomForest(_) => ModelFamily::RandomForest,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ModelSpec::GradientBoosted(config) => config.validate(),
            ModelSpec::RandomForest(params) => params.validate(),
        }
    }

    /// Flat parameter map for the experiment tracker
    pub fn params(&self) -> Vec<(String, String)> {
        let mut out = vec![("family".to_string(), self.family().to_string())];
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) {
            out.extend(
                map.into_iter()
                    .filter(|(k, _)| k != "family")
                    .map(|(k, v)| (k, v.to_string())),
            );
        }
        out
    }
}

/// A fitted classifier of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChurnModel {
    GradientBoosted(GradientBoostingClassifier),
    RandomForest(RandomForest),
}

impl ChurnModel {
    /// Fit the configured family on binary labels
    pub fn fit(spec: &ModelSpec, x: &Array2<f64>, y: &Array1<i64>) -> Result<Self> {
        let y = y.mapv(|v| v as f64);
        match spec {
            ModelSpec::GradientBoosted(config) => {
                let mut model = GradientBoostingClassifier::new(config.clone());
                model.fit(x, &y)?;
                Ok(ChurnModel::GradientBoosted(model))
            }
            ModelSpec::RandomForest(params) => {
                let mut model = RandomForest::new(params.clone());
                model.fit(x, &y)?;
                Ok(ChurnModel::RandomForest(model))
            }
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ChurnModel::GradientBoosted(_) => ModelFamily::GradientBoosted,
            ChurnModel::RandomForest(_) => ModelFamily::RandomForest,
        }
    }

    /// Probability of churn (label 1) per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            ChurnModel::GradientBoosted(model) => model.predict_proba(x),
            ChurnModel::RandomForest(model) => model.predict_proba(x),
        }
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        match self {
            ChurnModel::GradientBoosted(model) => model.feature_importances().to_vec(),
            ChurnModel::RandomForest(model) => model
                .feature_importances()
                .map(|imp| imp.to_vec())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_spec_yaml_tagging() {
        let spec: ModelSpec =
            serde_yaml::from_str("family: random_forest\nn_estimators: 7\n").unwrap();
        assert_eq!(spec.family(), ModelFamily::RandomForest);
        assert!(matches!(spec, ModelSpec::RandomForest(ref p) if p.n_estimators == 7));

        let unknown: std::result::Result<ModelSpec, _> = serde_yaml::from_str("family: svm\n");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_params_include_family() {
        let params = ModelSpec::default().params();
        assert!(params.contains(&("family".to_string(), "gradient_boosted".to_string())));
        assert!(params.iter().any(|(k, v)| k == "n_estimators" && v == "100"));
    }

    #[test]
    fn test_fit_each_family() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0i64, 0, 0, 1, 1, 1];

        for spec in [
            ModelSpec::GradientBoosted(GradientBoostingConfig {
                n_estimators: 10,
                subsample: 1.0,
                ..Default::default()
            }),
            ModelSpec::RandomForest(RandomForestParams {
                n_estimators: 10,
                ..Default::default()
            }),
        ] {
            let model = ChurnModel::fit(&spec, &x, &y).unwrap();
            assert_eq!(model.family(), spec.family());
            let proba = model.predict_proba(&x).unwrap();
            assert!(proba[5] > proba[0]);
        }
    }
}
