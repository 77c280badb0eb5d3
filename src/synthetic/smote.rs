//! SMOTE (Synthetic Minority Over-sampling Technique)

use crate::error::{ChurnflowError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Regular SMOTE, balancing every class up to the majority count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Random seed
    seed: Option<u64>,
    /// Target samples per class, ordered by label
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    /// Create new SMOTE sampler
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: None,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Euclidean distance
    fn distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest distinct neighbors, O(n log k)
    fn find_neighbors(point: &[f64], data: &[Vec<f64>], k: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, d) in data.iter().enumerate() {
            let dist = Self::distance(point, d);
            if dist <= 0.0 {
                continue; // self and exact duplicates
            }
            if heap.len() < k {
                heap.push(DistIdx(dist, i));
            } else if let Some(&DistIdx(max_dist, _)) = heap.peek() {
                if dist < max_dist {
                    heap.pop();
                    heap.push(DistIdx(dist, i));
                }
            }
        }

        // Sorted so the choice below depends only on the rng
        let mut neighbors = heap.into_vec();
        neighbors.sort_by(|a, b| a.cmp(b).then(a.1.cmp(&b.1)));
        neighbors.into_iter().map(|DistIdx(_, i)| i).collect()
    }

    /// Interpolate between a sample and its neighbor
    fn generate_sample(point: &[f64], neighbor: &[f64], rng: &mut StdRng) -> Vec<f64> {
        let gap: f64 = rng.gen();
        point
            .iter()
            .zip(neighbor.iter())
            .map(|(&p, &n)| p + gap * (n - p))
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let counts = class_counts(y);

        let max_count = match counts.values().max() {
            Some(&max) if counts.len() >= 2 => max,
            _ => {
                return Err(ChurnflowError::DataError(
                    "Need at least 2 classes for SMOTE".to_string(),
                ))
            }
        };

        let targets = counts.keys().map(|&class| (class, max_count)).collect();
        self.target_counts = Some(targets);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or(ChurnflowError::ModelNotFitted)?;

        if x.nrows() != y.len() {
            return Err(ChurnflowError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        // Original data is reused from x directly
        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = Vec::new();

        for (&class, &target_count) in targets {
            let class_idx = match indices.get(&class) {
                Some(idx) if !idx.is_empty() => idx,
                _ => {
                    n_synthetic.push(0);
                    continue;
                }
            };
            let n_to_generate = target_count.saturating_sub(class_idx.len());
            if n_to_generate == 0 {
                n_synthetic.push(0);
                continue;
            }

            let class_samples: Vec<Vec<f64>> = class_idx
                .iter()
                .map(|&i| x.row(i).iter().copied().collect())
                .collect();

            let k = self.k_neighbors.min(class_samples.len().saturating_sub(1)).max(1);

            for _ in 0..n_to_generate {
                let idx = rng.gen_range(0..class_samples.len());
                let sample = &class_samples[idx];

                let neighbors = Self::find_neighbors(sample, &class_samples, k);
                let generated = if neighbors.is_empty() {
                    // only duplicates of this point exist
                    sample.clone()
                } else {
                    let neighbor = &class_samples[neighbors[rng.gen_range(0..neighbors.len())]];
                    Self::generate_sample(sample, neighbor, &mut rng)
                };

                synthetic_x.push(generated);
                synthetic_y.push(class);
            }

            n_synthetic.push(n_to_generate);
        }

        // Original rows first, then synthetic rows
        let n_original = x.nrows();
        let n_total = n_original + synthetic_x.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[i - n_original][j]
            }
        });

        let mut all_y: Vec<i64> = y.iter().copied().collect();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // 20 majority, 5 minority
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }

        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        let x = Array2::from_shape_vec((25, 2), data).unwrap();
        (x, Array1::from_vec(labels))
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts.get(&0), Some(&20));
        assert_eq!(counts.get(&1), Some(&20));
        assert_eq!(result.n_synthetic, vec![0, 15]);

        // synthetic minority rows stay inside the minority bounding box
        for i in 25..40 {
            assert!(result.x[[i, 0]] >= 10.0 && result.x[[i, 0]] <= 12.0);
            assert!(result.x[[i, 1]] >= 10.0 && result.x[[i, 1]] <= 11.0);
        }
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            for j in 0..x.ncols() {
                assert_eq!(result.x[[i, j]], x[[i, j]]);
            }
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_smote_is_reproducible_with_seed() {
        let (x, y) = create_imbalanced_data();
        let a = SMOTE::new().with_seed(7).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(7).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x = Array2::zeros((3, 1));
        let y = Array1::from_vec(vec![1i64, 1, 1]);
        assert!(SMOTE::new().fit_resample(&x, &y).is_err());
    }

    #[test]
    fn test_duplicate_minority_points() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 5.0]).unwrap();
        let y = Array1::from_vec(vec![0i64, 0, 0, 1]);
        let result = SMOTE::new().with_seed(1).fit_resample(&x, &y).unwrap();
        assert_eq!(result.y.len(), 6);
        assert_eq!(result.x[[4, 0]], 5.0);
        assert_eq!(result.x[[5, 0]], 5.0);
    }
}
