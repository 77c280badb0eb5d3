//! Model training
//!
//! Tree-based classifiers, the closed set of model families the pipeline can
//! train, binary metrics, the preprocessor+model bundle that gets registered,
//! and the trainer stage itself.

mod decision_tree;
mod gradient_boosting;
mod metrics;
mod models;
mod pipeline;
mod random_forest;
mod trainer;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use metrics::{roc_auc, ClassificationMetrics, MetricKind};
pub use models::{ChurnModel, ModelFamily, ModelSpec};
pub use pipeline::InferencePipeline;
pub use random_forest::{MaxFeatures, RandomForest, RandomForestParams};
pub use trainer::ModelTrainer;
