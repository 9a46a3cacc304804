//! Classifier families and the dispatch between them.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;

use crate::classify::knn::Knn;
use crate::classify::mlp::Mlp;
use crate::classify::svm::Svm;
use crate::classify::tree::DecisionTree;
use crate::error::{Error, Result};

/// A supervised model over f64 feature rows and integer labels.
pub trait Classifier {
    /// Train on `x` (one row per sample) with labels `y`, replacing any
    /// previous fit.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()>;

    /// Predict a label per row. Must only be called after a successful fit.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    /// Distance-weighted nearest neighbours.
    Knn,
    /// RBF support-vector machine.
    Svm,
    /// CART decision tree.
    DecisionTree,
    /// Feed-forward neural network.
    Mlp,
}

impl ClassifierKind {
    pub const ALL: [Self; 4] = [Self::Knn, Self::Svm, Self::DecisionTree, Self::Mlp];

    pub fn name(self) -> &'static str {
        match self {
            Self::Knn => "knn",
            Self::Svm => "svm",
            Self::DecisionTree => "dt",
            Self::Mlp => "mlp",
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| Error::UnknownClassifier(s.to_string()))
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classifier of one of the supported families, with its fixed
/// hyper-parameters.
#[derive(Debug, Clone)]
pub enum Model {
    Knn(Knn),
    Svm(Svm),
    DecisionTree(DecisionTree),
    Mlp(Mlp),
}

impl Model {
    pub fn new(kind: ClassifierKind) -> Self {
        match kind {
            ClassifierKind::Knn => Self::Knn(Knn::default()),
            ClassifierKind::Svm => Self::Svm(Svm::default()),
            ClassifierKind::DecisionTree => Self::DecisionTree(DecisionTree::default()),
            ClassifierKind::Mlp => Self::Mlp(Mlp::default()),
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            Self::Knn(_) => ClassifierKind::Knn,
            Self::Svm(_) => ClassifierKind::Svm,
            Self::DecisionTree(_) => ClassifierKind::DecisionTree,
            Self::Mlp(_) => ClassifierKind::Mlp,
        }
    }
}

impl Classifier for Model {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        match self {
            Self::Knn(m) => m.fit(x, y),
            Self::Svm(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::Mlp(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        match self {
            Self::Knn(m) => m.predict(x),
            Self::Svm(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::Mlp(m) => m.predict(x),
        }
    }
}

/// Check a training set and return its sorted distinct labels.
pub(crate) fn check_training_set(x: ArrayView2<'_, f64>, y: &[i64]) -> Result<Vec<i64>> {
    if x.nrows() == 0 {
        return Err(Error::InvalidInput("cannot fit a classifier on zero samples".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(Error::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    Ok(classes)
}

/// Index of the largest score, the first one on ties.
pub(crate) fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate() {
        if *s > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_kind() {
        assert_eq!("knn".parse::<ClassifierKind>().unwrap(), ClassifierKind::Knn);
        assert_eq!("SVM".parse::<ClassifierKind>().unwrap(), ClassifierKind::Svm);
        assert_eq!("dt".parse::<ClassifierKind>().unwrap(), ClassifierKind::DecisionTree);
        assert_eq!("mlp".parse::<ClassifierKind>().unwrap(), ClassifierKind::Mlp);
        assert!(matches!(
            "forest".parse::<ClassifierKind>(),
            Err(Error::UnknownClassifier(name)) if name == "forest"
        ));
    }

    #[test]
    fn test_every_family_separates_two_points() {
        let x = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]];
        let y = [3, 3, 7, 7];
        for kind in [ClassifierKind::Knn, ClassifierKind::Svm, ClassifierKind::DecisionTree] {
            let mut model = Model::new(kind);
            model.fit(x.view(), &y).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.predict(array![[0.05, 0.0], [5.05, 5.0]].view()), vec![3, 7], "{kind}");
        }
    }

    #[test]
    fn test_rejects_bad_training_sets() {
        let mut model = Model::new(ClassifierKind::Knn);
        assert!(model.fit(ndarray::Array2::zeros((0, 2)).view(), &[]).is_err());
        assert!(model.fit(array![[0.0], [1.0]].view(), &[1]).is_err());
    }

    #[test]
    fn test_argmax_prefers_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), 1);
        assert_eq!(argmax(&[0.0]), 0);
    }
}
