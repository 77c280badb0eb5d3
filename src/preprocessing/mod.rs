//! Data preprocessing module
//!
//! Provides the churn feature pipeline:
//! - Target label encoding
//! - Derived ratio/product features
//! - Standard scaling fit on training data only
//!
//! and the transformation stage that applies it and rebalances the
//! training split.

mod features;
mod pipeline;
mod scaler;
mod transformation;

pub use features::{DerivedFeature, FeatureEngineer, FeatureOp, LabelEncoder};
pub use pipeline::Preprocessor;
pub use scaler::StandardScaler;
pub use transformation::DataTransformation;
