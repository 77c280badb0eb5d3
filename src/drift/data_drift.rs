//! Two-sample distribution tests

use crate::drift::{DriftDetector, DriftResult};
use crate::error::{ChurnflowError, Result};
use crate::utils::stats::{chi_square_survival, kolmogorov_survival};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn finite_sorted(values: &Array1<f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    out
}

fn check_non_empty(reference: &[f64], current: &[f64]) -> Result<()> {
    if reference.is_empty() || current.is_empty() {
        return Err(ChurnflowError::DataError(
            "Drift test needs at least one value on each side".to_string(),
        ));
    }
    Ok(())
}

/// Two-sample Kolmogorov-Smirnov test
///
/// Exact D statistic, asymptotic p-value from the Kolmogorov distribution
/// with Stephens' correction `(sqrt(ne) + 0.12 + 0.11 / sqrt(ne)) * D`,
/// where `ne = n1 * n2 / (n1 + n2)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Significance level; p below it means drift
    alpha: f64,
}

impl KolmogorovSmirnovTest {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Largest gap between the two empirical CDFs (inputs sorted)
    pub fn statistic(reference: &[f64], current: &[f64]) -> f64 {
        let (n1, n2) = (reference.len() as f64, current.len() as f64);
        let (mut i, mut j) = (0, 0);
        let mut d = 0.0f64;
        while i < reference.len() && j < current.len() {
            let x = reference[i].min(current[j]);
            while i < reference.len() && reference[i] <= x {
                i += 1;
            }
            while j < current.len() && current[j] <= x {
                j += 1;
            }
            d = d.max((i as f64 / n1 - j as f64 / n2).abs());
        }
        d
    }

    pub fn p_value(d: f64, n1: usize, n2: usize) -> f64 {
        let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
        let en = ne.sqrt();
        kolmogorov_survival((en + 0.12 + 0.11 / en) * d)
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl DriftDetector for KolmogorovSmirnovTest {
    fn detect(&self, reference: &Array1<f64>, current: &Array1<f64>) -> Result<DriftResult> {
        let reference = finite_sorted(reference);
        let current = finite_sorted(current);
        check_non_empty(&reference, &current)?;

        let d = Self::statistic(&reference, &current);
        let p = Self::p_value(d, reference.len(), current.len());
        Ok(DriftResult::from_p_value(d, p, self.alpha, "KS"))
    }

    fn threshold(&self) -> f64 {
        self.alpha
    }
}

/// Chi-square test of homogeneity between two categorical samples
///
/// Each distinct value is a category; strings are compared through
/// [`ChiSquareTest::detect_categories`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChiSquareTest {
    alpha: f64,
}

impl ChiSquareTest {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Statistic and degrees of freedom over the union of categories
    fn homogeneity<K: Ord>(
        reference: impl IntoIterator<Item = K>,
        current: impl IntoIterator<Item = K>,
    ) -> (f64, usize) {
        let mut table: BTreeMap<K, (f64, f64)> = BTreeMap::new();
        let (mut n_ref, mut n_cur) = (0usize, 0usize);
        for k in reference {
            table.entry(k).or_default().0 += 1.0;
            n_ref += 1;
        }
        for k in current {
            table.entry(k).or_default().1 += 1.0;
            n_cur += 1;
        }

        let total = (n_ref + n_cur) as f64;
        let mut statistic = 0.0;
        for &(r, c) in table.values() {
            let col = r + c;
            for (observed, row_total) in [(r, n_ref as f64), (c, n_cur as f64)] {
                let expected = row_total * col / total;
                if expected > 0.0 {
                    statistic += (observed - expected).powi(2) / expected;
                }
            }
        }
        (statistic, table.len().saturating_sub(1))
    }

    pub fn detect_categories(&self, reference: &[String], current: &[String]) -> Result<DriftResult> {
        if reference.is_empty() || current.is_empty() {
            return Err(ChurnflowError::DataError(
                "Drift test needs at least one value on each side".to_string(),
            ));
        }
        let (statistic, dof) = Self::homogeneity(reference.iter(), current.iter());
        let p = chi_square_survival(statistic, dof);
        Ok(DriftResult::from_p_value(statistic, p, self.alpha, "Chi-square"))
    }
}

impl Default for ChiSquareTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl DriftDetector for ChiSquareTest {
    fn detect(&self, reference: &Array1<f64>, current: &Array1<f64>) -> Result<DriftResult> {
        let reference = finite_sorted(reference);
        let current = finite_sorted(current);
        check_non_empty(&reference, &current)?;

        // f64 is not Ord; bit patterns of finite values make a fine key
        let (statistic, dof) = Self::homogeneity(
            reference.iter().map(|v| v.to_bits()),
            current.iter().map(|v| v.to_bits()),
        );
        let p = chi_square_survival(statistic, dof);
        Ok(DriftResult::from_p_value(statistic, p, self.alpha, "Chi-square"))
    }

    fn threshold(&self) -> f64 {
        self.alpha
    }
}
