//! Classifier bank: supervised models that learn the discovered movement
//! groups from feature vectors.

mod evaluate;
mod knn;
mod mlp;
mod model;
mod svm;
mod tree;

pub use evaluate::{
    balanced_accuracy, crossval_scores, mann_whitney_greater, mean_std, significantly_greater, stratified_folds,
};
pub use knn::Knn;
pub use mlp::{Mlp, MlpParams};
pub use model::{Classifier, ClassifierKind, Model};
pub use svm::Svm;
pub use tree::DecisionTree;
