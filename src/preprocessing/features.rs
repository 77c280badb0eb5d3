//! Target encoding and derived churn features

use crate::error::{ChurnflowError, Result};
use crate::utils::{column_values, is_numeric_dtype};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// How a derived feature combines its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureOp {
    /// `inputs[0] / inputs[1]`, zero when the denominator is zero or missing
    Ratio,
    /// Product of all inputs
    Product,
}

/// A feature computed from raw numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeature {
    pub name: String,
    pub op: FeatureOp,
    pub inputs: Vec<String>,
}

impl DerivedFeature {
    pub fn ratio(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            op: FeatureOp::Ratio,
            inputs: vec![numerator.into(), denominator.into()],
        }
    }

    pub fn product(name: impl Into<String>, factors: &[&str]) -> Self {
        Self {
            name: name.into(),
            op: FeatureOp::Product,
            inputs: factors.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Activity growth and customer value
    pub fn churn_defaults() -> Vec<Self> {
        vec![
            Self::ratio("Activity_Growth", "Total_Amt_Chng_Q4_Q1", "Total_Trans_Amt"),
            Self::product(
                "Customer_Value",
                &["Total_Revolving_Bal", "Avg_Utilization_Ratio", "Credit_Limit"],
            ),
        ]
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("derived feature name cannot be empty".to_string());
        }
        match self.op {
            FeatureOp::Ratio if self.inputs.len() != 2 => Err(format!(
                "ratio feature '{}' needs exactly 2 inputs, got {}",
                self.name,
                self.inputs.len()
            )),
            FeatureOp::Product if self.inputs.is_empty() => Err(format!(
                "product feature '{}' needs at least one input",
                self.name
            )),
            _ => Ok(()),
        }
    }

    /// Evaluate against a frame
    pub fn compute(&self, df: &DataFrame) -> Result<Vec<f64>> {
        self.validate().map_err(ChurnflowError::ConfigError)?;
        let inputs = self
            .inputs
            .iter()
            .map(|name| column_values(df, name))
            .collect::<Result<Vec<_>>>()?;

        match self.op {
            FeatureOp::Ratio => Ok(inputs[0]
                .iter()
                .zip(inputs[1].iter())
                .map(|(num, den)| match (num, den) {
                    (Some(n), Some(d)) if *d != 0.0 => n / d,
                    _ => 0.0,
                })
                .collect()),
            FeatureOp::Product => (0..df.height())
                .map(|row| {
                    inputs.iter().zip(self.inputs.iter()).try_fold(1.0, |acc, (values, name)| {
                        values[row].map(|v| acc * v).ok_or_else(|| {
                            ChurnflowError::InvalidInput(format!(
                                "Column '{}' has a missing value at row {}",
                                name, row
                            ))
                        })
                    })
                })
                .collect(),
        }
    }
}

/// Adds derived features, then removes configured raw columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureEngineer {
    derived: Vec<DerivedFeature>,
    drop_columns: Vec<String>,
}

impl FeatureEngineer {
    pub fn new(derived: Vec<DerivedFeature>, drop_columns: Vec<String>) -> Self {
        Self {
            derived,
            drop_columns,
        }
    }

    pub fn derived(&self) -> &[DerivedFeature] {
        &self.derived
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for feature in &self.derived {
            let values = feature.compute(df)?;
            out.with_column(Column::new(feature.name.as_str().into(), values))?;
        }

        for name in &self.drop_columns {
            if out.column(name).is_err() {
                return Err(ChurnflowError::FeatureNotFound(name.clone()));
            }
            out = out.drop(name)?;
        }

        Ok(out)
    }
}

/// Maps the textual churn target to {0, 1}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    positive_label: String,
    negative_label: String,
}

impl Default for LabelEncoder {
    fn default() -> Self {
        Self::new("Attrited Customer", "Existing Customer")
    }
}

impl LabelEncoder {
    pub fn new(positive_label: impl Into<String>, negative_label: impl Into<String>) -> Self {
        Self {
            positive_label: positive_label.into(),
            negative_label: negative_label.into(),
        }
    }

    pub fn encode(&self, column: &Column) -> Result<Array1<i64>> {
        let name = column.name().to_string();
        let series = column.as_materialized_series();

        let encoded: Result<Vec<i64>> = if series.dtype() == &DataType::String {
            series
                .str()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value {
                    Some(v) if v == self.positive_label => Ok(1),
                    Some(v) if v == self.negative_label => Ok(0),
                    Some(v) => Err(ChurnflowError::InvalidInput(format!(
                        "Unknown label '{}' in '{}' at row {}",
                        v, name, row
                    ))),
                    None => Err(ChurnflowError::InvalidInput(format!(
                        "Missing label in '{}' at row {}",
                        name, row
                    ))),
                })
                .collect()
        } else if is_numeric_dtype(series.dtype()) {
            // already encoded
            series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value {
                    Some(v) if v == 0.0 || v == 1.0 => Ok(v as i64),
                    other => Err(ChurnflowError::InvalidInput(format!(
                        "Label in '{}' at row {} must be 0 or 1, got {:?}",
                        name, row, other
                    ))),
                })
                .collect()
        } else {
            Err(ChurnflowError::InvalidInput(format!(
                "Unsupported target dtype {} for '{}'",
                series.dtype(),
                name
            )))
        };

        Ok(Array1::from_vec(encoded?))
    }

    pub fn decode(&self, label: i64) -> &str {
        if label == 1 {
            &self.positive_label
        } else {
            &self.negative_label
        }
    }
}
