//! Random Forest classifier

use super::decision_tree::{Criterion, DecisionTree};
use crate::error::{ChurnflowError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for the per-tree feature subset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: Some(42),
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        if self.min_samples_split < 2 {
            return Err("min_samples_split must be at least 2".to_string());
        }
        if self.min_samples_leaf == 0 {
            return Err("min_samples_leaf must be at least 1".to_string());
        }
        if self.criterion == Criterion::MSE {
            return Err("criterion must be gini or entropy for classification".to_string());
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(format!("max_features fraction must be in (0, 1], got {}", f));
            }
        }
        Ok(())
    }
}

/// Bagged classification trees, each on a random feature subset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: RandomForestParams,
    trees: Vec<DecisionTree>,
    /// Columns each tree was trained on
    feature_subsets: Vec<Vec<usize>>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            feature_subsets: Vec::new(),
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    /// Fit on binary labels (0.0 / 1.0)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ChurnflowError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(ChurnflowError::DataError(
                "Cannot fit a forest on an empty matrix".to_string(),
            ));
        }

        let params = &self.params;
        let max_features = params.max_features.resolve(n_features);
        let base_seed = params.random_state.unwrap_or(42);

        // Trees are built in parallel, each from its own seeded stream
        let fitted: Vec<(DecisionTree, Vec<usize>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<(DecisionTree, Vec<usize>)> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = if params.bootstrap {
                    (0..n_samples)
                        .map(|_| (rng.next_u64() as usize) % n_samples)
                        .collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut columns: Vec<usize> = (0..n_features).collect();
                columns.shuffle(&mut rng);
                columns.truncate(max_features);
                columns.sort_unstable();

                let x_boot = x.select(Axis(0), &sample_indices).select(Axis(1), &columns);
                let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

                let mut tree = DecisionTree::new_classifier()
                    .with_min_samples_split(params.min_samples_split)
                    .with_min_samples_leaf(params.min_samples_leaf)
                    .with_criterion(params.criterion);
                if let Some(d) = params.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree.fit(&x_boot, &y_boot)?;

                Ok((tree, columns))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, feature_subsets): (Vec<_>, Vec<_>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.feature_subsets = feature_subsets;
        self.n_features = n_features;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for (tree, columns) in self.trees.iter().zip(&self.feature_subsets) {
            if let Some(imp) = tree.feature_importances() {
                for (j, &col) in columns.iter().enumerate() {
                    total[col] += imp[j];
                }
            }
        }

        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for imp in &mut total {
                *imp /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Fraction of trees voting for the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ChurnflowError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ChurnflowError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let votes: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .zip(self.feature_subsets.par_iter())
            .map(|(tree, columns)| tree.predict(&x.select(Axis(1), columns)))
            .collect::<Result<Vec<_>>>()?;

        let n_trees = votes.len() as f64;
        let mut proba = Array1::zeros(x.nrows());
        for tree_votes in &votes {
            for (p, &v) in proba.iter_mut().zip(tree_votes.iter()) {
                if v.round() as i64 == 1 {
                    *p += 1.0;
                }
            }
        }
        proba.mapv_inplace(|p: f64| p / n_trees);
        Ok(proba)
    }

    /// Majority vote (ties go to the positive class)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(n_estimators: usize) -> RandomForestParams {
        RandomForestParams {
            n_estimators,
            max_features: MaxFeatures::All,
            ..Default::default()
        }
    }

    #[test]
    fn test_classifier() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rf = RandomForest::new(params(10));
        rf.fit(&x, &y).unwrap();

        let accuracy = rf
            .predict(&x)
            .unwrap()
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| (*p - *a).abs() < 0.5)
            .count() as f64
            / y.len() as f64;

        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_predict_proba_in_unit_interval() {
        let x = array![[0.0, 0.0], [1.0, 1.0], [0.5, 0.2]];
        let y = array![0.0, 1.0, 0.0];

        let mut rf = RandomForest::new(RandomForestParams {
            n_estimators: 8,
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 3);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_seed_reproducibility() {
        let x = array![[0.0, 5.0], [1.0, 4.0], [2.0, 3.0], [3.0, 2.0], [4.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0];

        let mut a = RandomForest::new(params(5));
        let mut b = RandomForest::new(params(5));
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_validate() {
        assert!(RandomForestParams::default().validate().is_ok());
        assert!(params(0).validate().is_err());
        let bad = RandomForestParams {
            max_features: MaxFeatures::Fraction(1.5),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
