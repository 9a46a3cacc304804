//! Partition clustering with k-means++ seeding, used to zone exit points.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::endpoints::EntryExitPoints;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct KMeansParams {
    /// Number of groups.
    pub k: usize,
    /// Independent seedings; the lowest-inertia run is kept.
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence threshold on total centroid movement, relative to the
    /// mean per-feature variance of the data.
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 8,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansModel {
    /// k × d centroid matrix.
    pub centroids: Array2<f64>,
    /// Group per input row.
    pub labels: Vec<usize>,
    /// Sum of squared distances of rows to their centroid.
    pub inertia: f64,
    pub n_iter: usize,
}

impl KMeansModel {
    /// Index of the nearest centroid for every row of `points`.
    pub fn predict(&self, points: ArrayView2<'_, f64>) -> Vec<usize> {
        points
            .rows()
            .into_iter()
            .map(|p| nearest(p, self.centroids.view()).0)
            .collect()
    }
}

pub struct KMeans {
    params: KMeansParams,
}

impl KMeans {
    pub fn new(params: KMeansParams) -> Result<Self> {
        if params.k == 0 {
            return Err(Error::Config("k-means needs at least one group".to_string()));
        }
        if params.n_init == 0 || params.max_iter == 0 {
            return Err(Error::Config("k-means n_init and max_iter must be positive".to_string()));
        }
        if params.tol.is_nan() || params.tol < 0.0 {
            return Err(Error::Config(format!("k-means tol must be non-negative, got {}", params.tol)));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    pub fn fit(&self, points: ArrayView2<'_, f64>) -> Result<KMeansModel> {
        let (n, d) = points.dim();
        let k = self.params.k;
        if n == 0 {
            return Ok(KMeansModel {
                centroids: Array2::zeros((0, d)),
                labels: Vec::new(),
                inertia: 0.0,
                n_iter: 0,
            });
        }
        if n < k {
            return Err(Error::InvalidInput(format!(
                "cannot form {k} groups from {n} points"
            )));
        }

        let tol = self.params.tol * mean_variance(points);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut best: Option<KMeansModel> = None;
        for _ in 0..self.params.n_init {
            let run = self.run_once(points, tol, &mut rng);
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        let Some(model) = best else {
            return Err(Error::InvalidInput("k-means produced no run".to_string()));
        };
        debug!(points = n, k, inertia = model.inertia, iterations = model.n_iter, "k-means fit");
        Ok(model)
    }

    fn run_once(&self, x: ArrayView2<'_, f64>, tol: f64, rng: &mut StdRng) -> KMeansModel {
        let (n, d) = x.dim();
        let k = self.params.k;
        let mut centroids = init_centroids(x, k, rng);
        let mut labels = vec![0usize; n];
        let mut dists = vec![0.0; n];
        let mut n_iter = 0;

        for iter in 0..self.params.max_iter {
            n_iter = iter + 1;
            assign(x, centroids.view(), &mut labels, &mut dists);

            let mut counts = vec![0usize; k];
            for &l in &labels {
                counts[l] += 1;
            }
            relocate_empty(&mut labels, &mut counts, &dists);

            let mut sums = Array2::<f64>::zeros((k, d));
            for (i, &l) in labels.iter().enumerate() {
                for j in 0..d {
                    sums[[l, j]] += x[[i, j]];
                }
            }
            let mut shift = 0.0;
            for c in 0..k {
                let count = counts[c] as f64;
                for j in 0..d {
                    let updated = sums[[c, j]] / count;
                    shift += (updated - centroids[[c, j]]).powi(2);
                    centroids[[c, j]] = updated;
                }
            }
            if shift <= tol {
                break;
            }
        }

        assign(x, centroids.view(), &mut labels, &mut dists);
        let inertia = dists.iter().sum();
        KMeansModel {
            centroids,
            labels,
            inertia,
            n_iter,
        }
    }
}

#[inline]
fn sq_dist(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest centroid and its squared distance; lowest index on ties.
fn nearest(p: ArrayView1<'_, f64>, centroids: ArrayView2<'_, f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let d = sq_dist(p, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn assign(x: ArrayView2<'_, f64>, centroids: ArrayView2<'_, f64>, labels: &mut [usize], dists: &mut [f64]) {
    for (i, p) in x.rows().into_iter().enumerate() {
        let (c, d) = nearest(p, centroids);
        labels[i] = c;
        dists[i] = d;
    }
}

/// Give every empty group the point farthest from its current centroid,
/// taking only from groups that keep at least one member.
fn relocate_empty(labels: &mut [usize], counts: &mut [usize], dists: &[f64]) {
    if counts.iter().all(|&c| c > 0) {
        return;
    }
    let mut far: Vec<usize> = (0..labels.len()).collect();
    far.sort_by(|&a, &b| dists[b].total_cmp(&dists[a]));
    let mut donors = far.into_iter();

    for c in 0..counts.len() {
        if counts[c] > 0 {
            continue;
        }
        for p in donors.by_ref() {
            let old = labels[p];
            if counts[old] > 1 {
                counts[old] -= 1;
                counts[c] = 1;
                labels[p] = c;
                break;
            }
        }
    }
}

/// Greedy k-means++: each new centre is the best of a few candidates drawn
/// proportionally to squared distance from the centres chosen so far.
fn init_centroids(x: ArrayView2<'_, f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let (n, d) = x.dim();
    let mut centers = Array2::<f64>::zeros((k, d));
    let first = rng.random_range(0..n);
    centers.row_mut(0).assign(&x.row(first));
    let mut closest: Vec<f64> = x.rows().into_iter().map(|p| sq_dist(p, x.row(first))).collect();
    let trials = 2 + (k as f64).ln() as usize;

    for c in 1..k {
        let potential: f64 = closest.iter().sum();
        let chosen = if potential > 0.0 {
            let mut best: Option<(usize, f64, Vec<f64>)> = None;
            for _ in 0..trials {
                let candidate = sample_weighted(&closest, rng.random::<f64>() * potential);
                let with_candidate: Vec<f64> = closest
                    .iter()
                    .zip(x.rows())
                    .map(|(&dist, p)| dist.min(sq_dist(p, x.row(candidate))))
                    .collect();
                let pot: f64 = with_candidate.iter().sum();
                if best.as_ref().is_none_or(|b| pot < b.1) {
                    best = Some((candidate, pot, with_candidate));
                }
            }
            match best {
                Some((idx, _, updated)) => {
                    closest = updated;
                    idx
                }
                None => rng.random_range(0..n),
            }
        } else {
            rng.random_range(0..n)
        };
        centers.row_mut(c).assign(&x.row(chosen));
    }
    centers
}

/// First index whose cumulative weight exceeds `target`.
fn sample_weighted(weights: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if acc > target {
            return i;
        }
    }
    weights.len() - 1
}

fn mean_variance(x: ArrayView2<'_, f64>) -> f64 {
    let (n, d) = x.dim();
    if n == 0 || d == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for col in x.columns() {
        let mean = col.sum() / n as f64;
        total += col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    }
    total / d as f64
}

/// One row of the `exit_groups` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitGroupRecord {
    pub track_id: i64,
    pub exit_group: i64,
}

/// Coarse exit zones, independent of the density clustering.
#[derive(Debug, Clone)]
pub struct ExitGrouping {
    pub track_ids: Vec<i64>,
    pub labels: Vec<usize>,
    pub model: KMeansModel,
}

impl ExitGrouping {
    pub fn records(&self) -> Vec<ExitGroupRecord> {
        self.track_ids
            .iter()
            .zip(&self.labels)
            .map(|(&track_id, &l)| ExitGroupRecord {
                track_id,
                exit_group: l as i64,
            })
            .collect()
    }
}

/// Partition the exit positions alone into `params.k` zones.
///
/// A scene with fewer tracks than `params.k` gets one zone per track.
pub fn consolidate_by_exit(points: &EntryExitPoints, params: &KMeansParams) -> Result<ExitGrouping> {
    let mut params = params.clone();
    let n = points.len();
    if n > 0 && n < params.k {
        warn!(tracks = n, k = params.k, "fewer tracks than exit groups, using one group per track");
        params.k = n;
    }
    let model = KMeans::new(params)?.fit(points.exit_points())?;
    Ok(ExitGrouping {
        track_ids: points.track_ids().to_vec(),
        labels: model.labels.clone(),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_blobs() -> Array2<f64> {
        let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let offsets = [(0.0, 0.0), (0.1, 0.0), (0.0, 0.1), (-0.1, 0.0), (0.0, -0.1)];
        let mut rows = Vec::new();
        for (cx, cy) in centers {
            for (dx, dy) in offsets {
                rows.extend([cx + dx, cy + dy]);
            }
        }
        Array2::from_shape_vec((15, 2), rows).unwrap()
    }

    fn kmeans(k: usize) -> KMeans {
        KMeans::new(KMeansParams {
            k,
            ..KMeansParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_recovers_blobs() {
        let model = kmeans(3).fit(three_blobs().view()).unwrap();
        for blob in model.labels.chunks(5) {
            assert!(blob.iter().all(|&l| l == blob[0]));
        }
        let mut firsts = vec![model.labels[0], model.labels[5], model.labels[10]];
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts.len(), 3);
        assert!(model.inertia < 0.2);
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = kmeans(3).fit(three_blobs().view()).unwrap();
        let b = kmeans(3).fit(three_blobs().view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_matches_fit_labels() {
        let data = three_blobs();
        let model = kmeans(3).fit(data.view()).unwrap();
        assert_eq!(model.predict(data.view()), model.labels);
    }

    #[test]
    fn test_too_few_points() {
        let err = kmeans(8).fit(array![[0.0, 0.0], [1.0, 1.0]].view());
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_input() {
        let model = kmeans(8).fit(Array2::<f64>::zeros((0, 2)).view()).unwrap();
        assert!(model.labels.is_empty());
        assert_eq!(model.inertia, 0.0);
    }

    #[test]
    fn test_identical_points() {
        let data = Array2::from_elem((6, 2), 0.25);
        let model = kmeans(2).fit(data.view()).unwrap();
        assert_eq!(model.labels.len(), 6);
        assert_eq!(model.inertia, 0.0);
        assert!(model.centroids.iter().all(|v| (*v - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_relocate_keeps_donor_nonempty() {
        let mut labels = vec![0, 0, 1];
        let mut counts = vec![2, 1, 0];
        relocate_empty(&mut labels, &mut counts, &[0.1, 0.2, 5.0]);
        assert_eq!(counts, vec![1, 1, 1]);
        assert_eq!(labels, vec![0, 2, 1]);
    }

    #[test]
    fn test_consolidate_uses_exit_columns() {
        let mut matrix = Array2::zeros((6, 4));
        for i in 0..6 {
            matrix[[i, 0]] = i as f64;
            matrix[[i, 2]] = if i < 3 { 0.0 } else { 100.0 };
        }
        let points = EntryExitPoints::from_parts((1..=6).collect(), matrix).unwrap();
        let params = KMeansParams {
            k: 2,
            ..KMeansParams::default()
        };
        let grouping = consolidate_by_exit(&points, &params).unwrap();
        let records = grouping.records();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].exit_group, records[2].exit_group);
        assert_eq!(records[3].exit_group, records[5].exit_group);
        assert_ne!(records[0].exit_group, records[3].exit_group);
        assert_eq!(grouping.model.centroids.ncols(), 2);
    }

    #[test]
    fn test_consolidate_clamps_groups_to_tracks() {
        let matrix = array![[0.0, 0.0, 0.1, 0.1], [0.0, 0.0, 0.9, 0.9], [0.0, 0.0, 0.5, 0.1]];
        let points = EntryExitPoints::from_parts(vec![4, 5, 6], matrix).unwrap();
        let grouping = consolidate_by_exit(&points, &KMeansParams::default()).unwrap();
        assert_eq!(grouping.model.centroids.nrows(), 3);
        let mut labels = grouping.labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2]);
    }
}
