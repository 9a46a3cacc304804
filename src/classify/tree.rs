use ndarray::ArrayView2;

use crate::classify::model::{Classifier, check_training_set};
use crate::error::Result;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: i64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART classification tree with Gini impurity.
///
/// Rows with `x[feature] <= threshold` go left. Thresholds sit halfway
/// between consecutive distinct training values.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub max_depth: usize,
    nodes: Vec<Node>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(14)
    }
}

struct Builder<'a> {
    x: ArrayView2<'a, f64>,
    /// Class index per training row.
    y: Vec<usize>,
    classes: Vec<i64>,
    max_depth: usize,
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    fn majority(&self, counts: &[usize]) -> i64 {
        let mut best = 0;
        for (c, n) in counts.iter().enumerate() {
            if *n > counts[best] {
                best = c;
            }
        }
        self.classes[best]
    }

    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let counts = self.counts(&rows);
        let pure = counts.iter().filter(|&&n| n > 0).count() <= 1;
        let split = if pure || depth >= self.max_depth || rows.len() < 2 {
            None
        } else {
            self.best_split(&rows, &counts)
        };

        let Some((feature, threshold)) = split else {
            let class = self.majority(&counts);
            self.nodes.push(Node::Leaf { class });
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| self.x[[r, feature]] <= threshold);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { class: 0 });
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Split with the lowest weighted child impurity, if any separates the rows.
    fn best_split(&self, rows: &[usize], counts: &[usize]) -> Option<(usize, f64)> {
        let n = rows.len() as f64;
        let mut best: Option<(f64, usize, f64)> = None;
        let mut sorted = rows.to_vec();

        for feature in 0..self.x.ncols() {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let mut left = vec![0usize; counts.len()];
            let mut right = counts.to_vec();

            for i in 0..sorted.len() - 1 {
                let c = self.y[sorted[i]];
                left[c] += 1;
                right[c] -= 1;

                let here = self.x[[sorted[i], feature]];
                let next = self.x[[sorted[i + 1], feature]];
                if next <= here {
                    continue;
                }
                let nl = (i + 1) as f64;
                let nr = n - nl;
                let impurity = (nl * gini(&left, nl) + nr * gini(&right, nr)) / n;
                if best.is_none_or(|(b, _, _)| impurity < b) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some((impurity, feature, threshold));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn gini(counts: &[usize], total: f64) -> f64 {
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

impl DecisionTree {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            nodes: Vec::new(),
        }
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        let classes = check_training_set(x, y)?;
        let y = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();
        let mut builder = Builder {
            x,
            y,
            classes,
            max_depth: self.max_depth,
            nodes: Vec::new(),
        };
        builder.grow((0..x.nrows()).collect(), 0);
        self.nodes = builder.nodes;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut id = 0;
                loop {
                    match self.nodes.get(id) {
                        Some(Node::Leaf { class }) => break *class,
                        Some(Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        }) => id = if row[*feature] <= *threshold { *left } else { *right },
                        None => break -1,
                    }
                }
            })
            .collect()
    }
}
