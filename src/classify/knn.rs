use ndarray::{Array2, ArrayView2};

use crate::classify::model::{Classifier, argmax, check_training_set};
use crate::cluster::euclidean;
use crate::error::Result;

/// k-nearest-neighbours with inverse-distance voting.
///
/// Neighbours at distance zero take all of the vote when present.
#[derive(Debug, Clone)]
pub struct Knn {
    pub k: usize,
    x: Array2<f64>,
    y: Vec<i64>,
    classes: Vec<i64>,
}

impl Default for Knn {
    fn default() -> Self {
        Self::new(7)
    }
}

impl Knn {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            x: Array2::zeros((0, 0)),
            y: Vec::new(),
            classes: Vec::new(),
        }
    }
}

impl Classifier for Knn {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        self.classes = check_training_set(x, y)?;
        self.x = x.to_owned();
        self.y = y.to_vec();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        let k = self.k.clamp(1, self.y.len().max(1));
        let mut neighbours: Vec<(f64, usize)> = Vec::with_capacity(self.y.len());

        x.rows()
            .into_iter()
            .map(|q| {
                neighbours.clear();
                neighbours.extend(self.x.rows().into_iter().map(|p| euclidean(p, q)).zip(0..));
                neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                let nearest = &neighbours[..k.min(neighbours.len())];

                let exact = nearest.iter().any(|(d, _)| *d == 0.0);
                let mut votes = vec![0.0; self.classes.len()];
                for &(d, i) in nearest {
                    let w = match (exact, d == 0.0) {
                        (true, true) => 1.0,
                        (true, false) => 0.0,
                        (false, _) => 1.0 / d,
                    };
                    // classes is sorted and holds every training label
                    if let Ok(c) = self.classes.binary_search(&self.y[i]) {
                        votes[c] += w;
                    }
                }
                self.classes.get(argmax(&votes)).copied().unwrap_or(-1)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_closer_neighbours_outvote() {
        let x = array![[0.0], [1.0], [1.1], [1.2]];
        let mut knn = Knn::new(4);
        knn.fit(x.view(), &[5, 9, 9, 9]).unwrap();
        // weight for 5 is 1/0.1 = 10, for 9 roughly 1/0.9 + 1/1.0 + 1/1.1
        assert_eq!(knn.predict(array![[0.1]].view()), vec![5]);
    }

    #[test]
    fn test_exact_match_dominates() {
        let x = array![[0.0], [0.5], [0.5], [0.5]];
        let mut knn = Knn::new(4);
        knn.fit(x.view(), &[1, 2, 2, 2]).unwrap();
        assert_eq!(knn.predict(array![[0.0]].view()), vec![1]);
    }

    #[test]
    fn test_k_capped_by_training_size() {
        let mut knn = Knn::default();
        knn.fit(array![[0.0], [10.0]].view(), &[0, 1]).unwrap();
        assert_eq!(knn.predict(array![[9.0], [2.0]].view()), vec![1, 0]);
    }

    #[test]
    fn test_tie_goes_to_smallest_class() {
        let mut knn = Knn::new(2);
        knn.fit(array![[-1.0], [1.0]].view(), &[4, 2]).unwrap();
        assert_eq!(knn.predict(array![[0.0]].view()), vec![2]);
    }
}
