//! Feed-forward network with ReLU hidden layers and a softmax output,
//! trained by mini-batch Adam with early stopping.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::classify::model::{Classifier, argmax, check_training_set};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MlpParams {
    pub hidden: Vec<usize>,
    pub learning_rate: f64,
    /// L2 penalty on the weights.
    pub alpha: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub validation_fraction: f64,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            learning_rate: 1e-3,
            alpha: 1e-4,
            max_epochs: 500,
            batch_size: 200,
            validation_fraction: 0.1,
            patience: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone)]
struct Layer {
    w: Array2<f64>,
    b: Array1<f64>,
}

#[derive(Debug, Clone)]
struct Moments {
    mw: Array2<f64>,
    vw: Array2<f64>,
    mb: Array1<f64>,
    vb: Array1<f64>,
}

impl Layer {
    /// Glorot-uniform initialisation.
    fn new(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let mut draw = || rng.random_range(-bound..bound);
        let w = Array2::from_shape_simple_fn((fan_in, fan_out), &mut draw);
        let b = Array1::from_shape_simple_fn(fan_out, &mut draw);
        Self { w, b }
    }

    fn moments(&self) -> Moments {
        Moments {
            mw: Array2::zeros(self.w.raw_dim()),
            vw: Array2::zeros(self.w.raw_dim()),
            mb: Array1::zeros(self.b.raw_dim()),
            vb: Array1::zeros(self.b.raw_dim()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mlp {
    pub params: MlpParams,
    layers: Vec<Layer>,
    classes: Vec<i64>,
    n_epochs: usize,
}

impl Default for Mlp {
    fn default() -> Self {
        Self::new(MlpParams::default())
    }
}

impl Mlp {
    pub fn new(params: MlpParams) -> Self {
        Self {
            params,
            layers: Vec::new(),
            classes: Vec::new(),
            n_epochs: 0,
        }
    }

    /// Epochs run by the last fit.
    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    /// Activations of every layer, input first; the last entry holds class probabilities.
    fn forward(layers: &[Layer], x: ArrayView2<'_, f64>) -> Vec<Array2<f64>> {
        let mut acts = Vec::with_capacity(layers.len() + 1);
        acts.push(x.to_owned());
        for (i, layer) in layers.iter().enumerate() {
            let mut z = acts[i].dot(&layer.w) + &layer.b;
            if i + 1 < layers.len() {
                z.mapv_inplace(|v| v.max(0.0));
            } else {
                softmax_rows(&mut z);
            }
            acts.push(z);
        }
        acts
    }

    fn probabilities(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        Self::forward(&self.layers, x).pop().unwrap_or_else(|| Array2::zeros((x.nrows(), 0)))
    }

    fn accuracy(&self, layers: &[Layer], x: ArrayView2<'_, f64>, y: &[usize]) -> f64 {
        let Some(probs) = Self::forward(layers, x).pop() else {
            return 0.0;
        };
        let hits = probs
            .rows()
            .into_iter()
            .zip(y)
            .filter(|(p, c)| argmax(p.as_slice().unwrap_or(&[])) == **c)
            .count();
        hits as f64 / y.len().max(1) as f64
    }

    /// One Adam step on a mini-batch.
    fn step(&self, layers: &mut [Layer], moments: &mut [Moments], t: i32, x: ArrayView2<'_, f64>, y: &[usize]) {
        let m = x.nrows() as f64;
        let acts = Self::forward(layers, x);

        // softmax + cross-entropy gradient
        let mut delta = acts[acts.len() - 1].clone();
        for (i, &c) in y.iter().enumerate() {
            delta[[i, c]] -= 1.0;
        }
        delta /= m;

        let lr = self.params.learning_rate * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));
        for l in (0..layers.len()).rev() {
            let gw = acts[l].t().dot(&delta) + &(&layers[l].w * (self.params.alpha / m));
            let gb = delta.sum_axis(Axis(0));
            if l > 0 {
                let mut back = delta.dot(&layers[l].w.t());
                back.zip_mut_with(&acts[l], |d, a| {
                    if *a <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = back;
            }

            let mo = &mut moments[l];
            mo.mw.zip_mut_with(&gw, |m, g| *m = BETA1 * *m + (1.0 - BETA1) * g);
            mo.vw.zip_mut_with(&gw, |v, g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);
            mo.mb.zip_mut_with(&gb, |m, g| *m = BETA1 * *m + (1.0 - BETA1) * g);
            mo.vb.zip_mut_with(&gb, |v, g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);

            let layer = &mut layers[l];
            ndarray::Zip::from(&mut layer.w)
                .and(&mo.mw)
                .and(&mo.vw)
                .for_each(|w, m, v| *w -= lr * m / (v.sqrt() + EPSILON));
            ndarray::Zip::from(&mut layer.b)
                .and(&mo.mb)
                .and(&mo.vb)
                .for_each(|b, m, v| *b -= lr * m / (v.sqrt() + EPSILON));
        }
    }
}

fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn select_rows(x: ArrayView2<'_, f64>, idx: &[usize]) -> Array2<f64> {
    x.select(Axis(0), idx)
}

impl Classifier for Mlp {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        self.classes = check_training_set(x, y)?;
        let targets: Vec<usize> = y
            .iter()
            .map(|label| self.classes.binary_search(label).unwrap_or(0))
            .collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let mut sizes = vec![x.ncols()];
        sizes.extend(&self.params.hidden);
        sizes.push(self.classes.len());
        let mut layers: Vec<Layer> = sizes.windows(2).map(|w| Layer::new(w[0], w[1], &mut rng)).collect();
        let mut moments: Vec<Moments> = layers.iter().map(Layer::moments).collect();

        // hold out a validation split for early stopping
        let n = x.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let n_val = (self.params.validation_fraction * n as f64).ceil() as usize;
        let (val_idx, train_idx) = if n_val >= 1 && n_val < n {
            order.split_at(n_val)
        } else {
            (&order[..0], &order[..])
        };
        let x_val = select_rows(x, val_idx);
        let y_val: Vec<usize> = val_idx.iter().map(|&i| targets[i]).collect();

        let batch = self.params.batch_size.clamp(1, train_idx.len().max(1));
        let mut shuffled = train_idx.to_vec();
        let mut best_score = f64::NEG_INFINITY;
        let mut best_layers = layers.clone();
        let mut stale = 0;
        let mut t = 0;
        self.n_epochs = 0;

        for epoch in 0..self.params.max_epochs {
            self.n_epochs = epoch + 1;
            shuffled.shuffle(&mut rng);
            for chunk in shuffled.chunks(batch) {
                t += 1;
                let xb = select_rows(x, chunk);
                let yb: Vec<usize> = chunk.iter().map(|&i| targets[i]).collect();
                self.step(&mut layers, &mut moments, t, xb.view(), &yb);
            }

            if val_idx.is_empty() {
                continue;
            }
            let score = self.accuracy(&layers, x_val.view(), &y_val);
            trace!(epoch, score, "mlp validation");
            if score > best_score + self.params.tol {
                best_score = score;
                best_layers = layers.clone();
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.params.patience {
                    break;
                }
            }
        }

        self.layers = if val_idx.is_empty() { layers } else { best_layers };
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        let probs = self.probabilities(x);
        probs
            .rows()
            .into_iter()
            .map(|p| {
                let scores: Vec<f64> = p.to_vec();
                self.classes.get(argmax(&scores)).copied().unwrap_or(-1)
            })
            .collect()
    }
}
