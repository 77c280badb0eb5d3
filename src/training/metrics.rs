//! Binary classification metrics

use crate::error::{ChurnflowError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric used for acceptance and champion comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    RocAuc,
    F1,
    Accuracy,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::RocAuc => f.write_str("roc_auc"),
            MetricKind::F1 => f.write_str("f1_score"),
            MetricKind::Accuracy => f.write_str("accuracy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
    pub n_samples: usize,
}

impl ClassificationMetrics {
    /// Compute from true labels and positive-class probabilities (threshold 0.5)
    pub fn compute(y_true: &Array1<i64>, y_prob: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_prob.len() {
            return Err(ChurnflowError::ShapeError {
                expected: format!("{} scores", y_true.len()),
                actual: format!("{} scores", y_prob.len()),
            });
        }
        if y_true.is_empty() {
            return Err(ChurnflowError::DataError(
                "Cannot compute metrics on zero samples".to_string(),
            ));
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_prob.iter()) {
            match (t == 1, p >= 0.5) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            accuracy: ratio(tp + tn, y_true.len()),
            precision,
            recall,
            f1_score,
            roc_auc: roc_auc(y_true, y_prob),
            n_samples: y_true.len(),
        })
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::RocAuc => self.roc_auc,
            MetricKind::F1 => self.f1_score,
            MetricKind::Accuracy => self.accuracy,
        }
    }

    /// Named values for the experiment tracker
    pub fn to_pairs(&self, prefix: &str) -> Vec<(String, f64)> {
        vec![
            (format!("{prefix}accuracy"), self.accuracy),
            (format!("{prefix}precision"), self.precision),
            (format!("{prefix}recall"), self.recall),
            (format!("{prefix}f1_score"), self.f1_score),
            (format!("{prefix}roc_auc"), self.roc_auc),
        ]
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic
///
/// Tied scores share their average rank. Returns 0.5 when only one class is
/// present.
pub fn roc_auc(y_true: &Array1<i64>, scores: &Array1<f64>) -> f64 {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}
