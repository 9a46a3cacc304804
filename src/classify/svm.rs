//! RBF support-vector machine trained by sequential minimal optimization,
//! extended to many classes by one-vs-one voting.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::classify::model::{Classifier, argmax, check_training_set};
use crate::error::Result;

const KKT_TOL: f64 = 1e-3;
const MIN_ETA: f64 = 1e-12;

/// Decision function separating `positive` from `negative`.
#[derive(Debug, Clone)]
struct BinarySvm {
    positive: i64,
    negative: i64,
    /// Training row index and `alpha * y` for every support vector.
    support: Vec<(usize, f64)>,
    bias: f64,
}

#[derive(Debug, Clone)]
pub struct Svm {
    pub c: f64,
    gamma: f64,
    x: Array2<f64>,
    classes: Vec<i64>,
    machines: Vec<BinarySvm>,
}

impl Default for Svm {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl Svm {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            gamma: 1.0,
            x: Array2::zeros((0, 0)),
            classes: Vec::new(),
            machines: Vec::new(),
        }
    }

    /// Kernel width derived from the training data: `1 / (n_features * var(X))`.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[inline]
    fn kernel(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let d2: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
        (-self.gamma * d2).exp()
    }

    fn train_pair(&self, rows: &[usize], signs: &[f64]) -> (Vec<(usize, f64)>, f64) {
        let m = rows.len();
        let mut k = Array2::<f64>::zeros((m, m));
        for a in 0..m {
            for b in a..m {
                let v = self.kernel(self.x.row(rows[a]), self.x.row(rows[b]));
                k[[a, b]] = v;
                k[[b, a]] = v;
            }
        }

        let c = self.c;
        let mut alpha = vec![0.0; m];
        // F_t = sum_s alpha_s y_s K_st - y_t
        let mut f: Vec<f64> = signs.iter().map(|y| -y).collect();
        let in_up = |a: f64, y: f64| (y > 0.0 && a < c) || (y < 0.0 && a > 0.0);
        let in_low = |a: f64, y: f64| (y > 0.0 && a > 0.0) || (y < 0.0 && a < c);

        let max_iter = 1000 + 100 * m;
        let (mut up, mut low) = (None, None);
        for _ in 0..max_iter {
            up = (0..m)
                .filter(|&t| in_up(alpha[t], signs[t]))
                .min_by(|&a, &b| f[a].total_cmp(&f[b]));
            low = (0..m)
                .filter(|&t| in_low(alpha[t], signs[t]))
                .max_by(|&a, &b| f[a].total_cmp(&f[b]));
            let (Some(i2), Some(i1)) = (up, low) else {
                break;
            };
            if f[i1] - f[i2] <= 2.0 * KKT_TOL {
                break;
            }

            let (y1, y2) = (signs[i1], signs[i2]);
            let (a1, a2) = (alpha[i1], alpha[i2]);
            let (lo, hi) = if y1 != y2 {
                ((a2 - a1).max(0.0), (c + a2 - a1).min(c))
            } else {
                ((a1 + a2 - c).max(0.0), (a1 + a2).min(c))
            };
            let eta = (k[[i1, i1]] + k[[i2, i2]] - 2.0 * k[[i1, i2]]).max(MIN_ETA);
            let new_a2 = snap((a2 + y2 * (f[i1] - f[i2]) / eta).max(lo).min(hi), c);
            let d2 = new_a2 - a2;
            if d2.abs() < 1e-12 {
                break;
            }
            let new_a1 = snap(a1 - y1 * y2 * d2, c);
            let d1 = new_a1 - a1;
            alpha[i1] = new_a1;
            alpha[i2] = new_a2;

            for t in 0..m {
                f[t] += y1 * d1 * k[[i1, t]] + y2 * d2 * k[[i2, t]];
            }
        }

        let free: Vec<usize> = (0..m).filter(|&t| alpha[t] > 0.0 && alpha[t] < c).collect();
        let bias = if !free.is_empty() {
            -free.iter().map(|&t| f[t]).sum::<f64>() / free.len() as f64
        } else {
            match (up, low) {
                (Some(i2), Some(i1)) => -(f[i1] + f[i2]) / 2.0,
                (Some(t), None) | (None, Some(t)) => -f[t],
                (None, None) => 0.0,
            }
        };

        let support = (0..m)
            .filter(|&t| alpha[t] > 0.0)
            .map(|t| (rows[t], alpha[t] * signs[t]))
            .collect();
        (support, bias)
    }

    fn decision(&self, machine: &BinarySvm, q: ArrayView1<'_, f64>) -> f64 {
        machine
            .support
            .iter()
            .map(|&(i, coef)| coef * self.kernel(self.x.row(i), q))
            .sum::<f64>()
            + machine.bias
    }
}

/// Pin values within rounding distance of a box bound onto the bound.
#[inline]
fn snap(alpha: f64, c: f64) -> f64 {
    if alpha < 1e-12 {
        0.0
    } else if alpha > c - 1e-12 {
        c
    } else {
        alpha
    }
}

impl Classifier for Svm {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        self.classes = check_training_set(x, y)?;
        self.x = x.to_owned();

        let n = x.len() as f64;
        let mean = x.sum() / n;
        let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        self.gamma = if var > 0.0 { 1.0 / (x.ncols() as f64 * var) } else { 1.0 };

        self.machines.clear();
        for (a, &positive) in self.classes.iter().enumerate() {
            for &negative in &self.classes[a + 1..] {
                let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == positive || y[i] == negative).collect();
                let signs: Vec<f64> = rows.iter().map(|&i| if y[i] == positive { 1.0 } else { -1.0 }).collect();
                let (support, bias) = self.train_pair(&rows, &signs);
                self.machines.push(BinarySvm {
                    positive,
                    negative,
                    support,
                    bias,
                });
            }
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        x.rows()
            .into_iter()
            .map(|q| {
                let mut votes = vec![0.0; self.classes.len()];
                for machine in &self.machines {
                    let winner = if self.decision(machine, q) > 0.0 {
                        machine.positive
                    } else {
                        machine.negative
                    };
                    if let Ok(c) = self.classes.binary_search(&winner) {
                        votes[c] += 1.0;
                    }
                }
                self.classes.get(argmax(&votes)).copied().unwrap_or(-1)
            })
            .collect()
    }
}
