//! Parameter sweeps for the density clustering.
//!
//! A four-way intersection has around twelve primary movements plus U-turns
//! and lane changes, so useful settings produce roughly 8 to 20 clusters on
//! normalized coordinates.

use std::ops::RangeInclusive;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::optics::{Optics, OpticsParams};
use crate::cluster::stats::ClusterStats;
use crate::error::Result;

/// Cluster counts considered plausible for an intersection.
pub const RECOMMENDED_CLUSTERS: RangeInclusive<usize> = 8..=20;

/// Standardize every column, then rescale it to [0, 1].
pub fn normalize_coordinates(points: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = points.to_owned();
    if out.nrows() == 0 {
        return out;
    }
    for mut col in out.axis_iter_mut(Axis(1)) {
        let n = col.len() as f64;
        let mean = col.sum() / n;
        let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let scale = if std == 0.0 { 1.0 } else { std };
        col.mapv_inplace(|v| (v - mean) / scale);

        let min = col.iter().copied().fold(f64::INFINITY, f64::min);
        let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        col.mapv_inplace(|v| (v - min) / (max - min + 1e-10));
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneGrid {
    pub min_samples: Vec<usize>,
    pub xi: Vec<f64>,
    pub max_eps: Vec<f64>,
}

impl Default for TuneGrid {
    fn default() -> Self {
        Self {
            min_samples: vec![15, 25, 40],
            xi: vec![0.02, 0.04, 0.06],
            max_eps: vec![0.1, 0.15, 0.2],
        }
    }
}

/// Outcome of one parameter combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneResult {
    pub min_samples: usize,
    pub xi: f64,
    pub max_eps: f64,
    pub n_clusters: usize,
    pub n_outliers: usize,
    pub pct_outliers: f64,
}

/// Fit OPTICS for every combination in `grid`, in grid order.
pub fn grid_search(points: ArrayView2<'_, f64>, grid: &TuneGrid) -> Result<Vec<TuneResult>> {
    let mut results = Vec::with_capacity(grid.min_samples.len() * grid.xi.len() * grid.max_eps.len());
    for &min_samples in &grid.min_samples {
        for &xi in &grid.xi {
            for &max_eps in &grid.max_eps {
                let optics = Optics::new(OpticsParams {
                    min_samples,
                    xi,
                    max_eps,
                    ..OpticsParams::default()
                })?;
                let stats = ClusterStats::from_labels(&optics.fit(points).labels);
                debug!(min_samples, xi, max_eps, clusters = stats.n_clusters, "grid point");
                results.push(TuneResult {
                    min_samples,
                    xi,
                    max_eps,
                    n_clusters: stats.n_clusters,
                    n_outliers: stats.n_outliers,
                    pct_outliers: stats.pct_outliers,
                });
            }
        }
    }
    Ok(results)
}

/// Results whose cluster count lies in [`RECOMMENDED_CLUSTERS`], fewest clusters first.
pub fn recommended(results: &[TuneResult]) -> Vec<TuneResult> {
    let mut good: Vec<TuneResult> = results
        .iter()
        .filter(|r| RECOMMENDED_CLUSTERS.contains(&r.n_clusters))
        .copied()
        .collect();
    good.sort_by_key(|r| r.n_clusters);
    good
}
