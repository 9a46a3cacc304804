//! Savitzky-Golay smoothing with polynomial extrapolation at the edges.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Local polynomial regression smoother.
///
/// Interior samples are replaced by the value at the window center of the
/// least-squares polynomial fitted to the surrounding `window` samples. The
/// first and last `window / 2` samples are taken from the polynomial fitted
/// to the first and last full window respectively, evaluated at their own
/// positions ("interp" edge handling: no truncation, no mirroring).
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    poly: usize,
    /// Pseudo-inverse of the window's Vandermonde matrix, (poly + 1) x window.
    /// Row 0 doubles as the interior convolution weights.
    fit: DMatrix<f64>,
}

impl SavitzkyGolay {
    pub fn new(window: usize, poly: usize) -> Result<Self> {
        if window == 0 || window % 2 == 0 {
            return Err(Error::Config(format!(
                "smoothing window must be a positive odd number, got {window}"
            )));
        }
        if poly >= window {
            return Err(Error::Config(format!(
                "polynomial degree {poly} must be smaller than the smoothing window {window}"
            )));
        }

        let half = (window / 2) as f64;
        let vandermonde =
            DMatrix::from_fn(window, poly + 1, |r, c| (r as f64 - half).powi(c as i32));
        let fit = vandermonde
            .pseudo_inverse(1e-12)
            .map_err(|e| Error::InvalidInput(format!("savitzky-golay fit: {e}")))?;

        Ok(Self { window, poly, fit })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn poly(&self) -> usize {
        self.poly
    }

    /// Smooth `values`. Sequences shorter than the window are returned unchanged.
    pub fn smooth(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        if n < self.window {
            return values.to_vec();
        }

        let half = self.window / 2;
        let weights = self.fit.row(0);
        let mut out = vec![0.0; n];

        for i in half..n - half {
            let window = &values[i - half..=i + half];
            out[i] = weights.iter().zip(window).map(|(w, v)| w * v).sum();
        }

        let head = self.coefficients(&values[..self.window]);
        for (i, slot) in out.iter_mut().enumerate().take(half) {
            *slot = evaluate(&head, i as f64 - half as f64);
        }

        let start = n - self.window;
        let tail = self.coefficients(&values[start..]);
        for i in n - half..n {
            out[i] = evaluate(&tail, (i - start) as f64 - half as f64);
        }

        out
    }

    fn coefficients(&self, window: &[f64]) -> DVector<f64> {
        &self.fit * DVector::from_column_slice(window)
    }
}

fn evaluate(coefficients: &DVector<f64>, t: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
}
