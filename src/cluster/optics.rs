//! Density-based ordering (OPTICS) with steepness-based cluster extraction.

use ndarray::{ArrayView1, ArrayView2};
use tracing::debug;

use crate::cluster::xi::{extract_xi_labels, xi_clusters};
use crate::error::{Error, Result};

/// Label of a point that belongs to no density cluster.
pub const NOISE: i64 = -1;

/// Configuration for OPTICS.
#[derive(Debug, Clone)]
pub struct OpticsParams {
    /// Neighbourhood size (the point itself included) required to be a core point.
    pub min_samples: usize,
    /// Relative steepness threshold for cluster boundaries on the reachability plot.
    pub xi: f64,
    /// Largest neighbourhood radius considered. `f64::INFINITY` means unbounded.
    pub max_eps: f64,
    /// Smallest accepted cluster; defaults to `min_samples`.
    pub min_cluster_size: Option<usize>,
    /// Drop cluster ends whose points were reached from outside the cluster.
    pub predecessor_correction: bool,
}

impl Default for OpticsParams {
    fn default() -> Self {
        Self {
            min_samples: 30,
            xi: 0.05,
            max_eps: f64::INFINITY,
            min_cluster_size: None,
            predecessor_correction: true,
        }
    }
}

/// Everything OPTICS produced for one input matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticsModel {
    /// Point indices in the order they were processed.
    pub ordering: Vec<usize>,
    /// Reachability distance per point (input order); infinite when unreachable.
    pub reachability: Vec<f64>,
    /// Core distance per point (input order); infinite for non-core points.
    pub core_distances: Vec<f64>,
    /// Point from which each point was reached, if any.
    pub predecessor: Vec<Option<usize>>,
    /// Cluster label per point (input order), `NOISE` for outliers.
    pub labels: Vec<i64>,
    /// Accepted clusters as inclusive (start, end) positions in `ordering`.
    pub clusters: Vec<(usize, usize)>,
}

impl OpticsModel {
    /// Reachability values in processing order, as drawn on a reachability plot.
    pub fn reachability_plot(&self) -> Vec<f64> {
        self.ordering.iter().map(|&i| self.reachability[i]).collect()
    }

    pub fn n_clusters(&self) -> usize {
        self.labels
            .iter()
            .copied()
            .max()
            .map_or(0, |m| if m >= 0 { m as usize + 1 } else { 0 })
    }
}

pub struct Optics {
    params: OpticsParams,
}

impl Optics {
    pub fn new(params: OpticsParams) -> Result<Self> {
        if params.min_samples < 2 {
            return Err(Error::Config(format!(
                "min_samples must be at least 2, got {}",
                params.min_samples
            )));
        }
        if !(0.0..=1.0).contains(&params.xi) {
            return Err(Error::Config(format!("xi must lie in [0, 1], got {}", params.xi)));
        }
        if params.max_eps.is_nan() || params.max_eps <= 0.0 {
            return Err(Error::Config(format!(
                "max_eps must be positive, got {}",
                params.max_eps
            )));
        }
        if params.min_cluster_size == Some(0) {
            return Err(Error::Config("min_cluster_size must be positive".to_string()));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &OpticsParams {
        &self.params
    }

    /// Order `points` (one row per sample) and extract clusters.
    pub fn fit(&self, points: ArrayView2<'_, f64>) -> OpticsModel {
        let n = points.nrows();
        let core_distances = self.core_distances(points);

        let mut reachability = vec![f64::INFINITY; n];
        let mut predecessor = vec![None; n];
        let mut processed = vec![false; n];
        let mut ordering = Vec::with_capacity(n);

        for _ in 0..n {
            // Smallest reachability among unprocessed points, lowest index on ties.
            let mut point = usize::MAX;
            for q in 0..n {
                if !processed[q] && (point == usize::MAX || reachability[q] < reachability[point]) {
                    point = q;
                }
            }
            processed[point] = true;
            ordering.push(point);

            let core = core_distances[point];
            if core.is_infinite() {
                continue;
            }
            let p = points.row(point);
            for q in 0..n {
                if processed[q] {
                    continue;
                }
                let d = euclidean(p, points.row(q));
                if d > self.params.max_eps {
                    continue;
                }
                let rd = d.max(core);
                if rd < reachability[q] {
                    reachability[q] = rd;
                    predecessor[q] = Some(point);
                }
            }
        }

        let plot: Vec<f64> = ordering.iter().map(|&i| reachability[i]).collect();
        let predecessor_plot: Vec<Option<usize>> = ordering.iter().map(|&i| predecessor[i]).collect();
        let min_cluster_size = self.params.min_cluster_size.unwrap_or(self.params.min_samples);
        let clusters = xi_clusters(
            &plot,
            &predecessor_plot,
            &ordering,
            self.params.xi,
            self.params.min_samples,
            min_cluster_size,
            self.params.predecessor_correction,
        );
        let labels = extract_xi_labels(&ordering, &clusters);

        let model = OpticsModel {
            ordering,
            reachability,
            core_distances,
            predecessor,
            labels,
            clusters,
        };
        debug!(
            points = n,
            clusters = model.n_clusters(),
            min_samples = self.params.min_samples,
            xi = self.params.xi,
            "optics fit"
        );
        model
    }

    /// Distance to the `min_samples`-th nearest neighbour, the point itself
    /// counted; infinite when beyond `max_eps` or when there are too few points.
    fn core_distances(&self, points: ArrayView2<'_, f64>) -> Vec<f64> {
        let n = points.nrows();
        let k = self.params.min_samples;
        if n < k {
            return vec![f64::INFINITY; n];
        }

        let mut dists = vec![0.0; n];
        (0..n)
            .map(|i| {
                let p = points.row(i);
                for (j, d) in dists.iter_mut().enumerate() {
                    *d = euclidean(p, points.row(j));
                }
                let (_, kth, _) = dists.select_nth_unstable_by(k - 1, f64::total_cmp);
                if *kth > self.params.max_eps {
                    f64::INFINITY
                } else {
                    *kth
                }
            })
            .collect()
    }
}

#[inline]
pub(crate) fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn optics(min_samples: usize) -> Optics {
        Optics::new(OpticsParams {
            min_samples,
            ..OpticsParams::default()
        })
        .unwrap()
    }

    /// Two tight blobs far apart plus one isolated point.
    fn blobs() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..10 {
            let d = i as f64 * 0.01;
            rows.extend([0.0 + d, 0.0, 1.0 + d, 1.0]);
        }
        for i in 0..10 {
            let d = i as f64 * 0.01;
            rows.extend([5.0 + d, 5.0, 9.0, 9.0 + d]);
        }
        rows.extend([20.0, -20.0, 30.0, 40.0]);
        Array2::from_shape_vec((21, 4), rows).unwrap()
    }

    #[test]
    fn test_rejects_bad_params() {
        assert!(Optics::new(OpticsParams { min_samples: 1, ..OpticsParams::default() }).is_err());
        assert!(Optics::new(OpticsParams { xi: 1.5, ..OpticsParams::default() }).is_err());
        assert!(Optics::new(OpticsParams { max_eps: 0.0, ..OpticsParams::default() }).is_err());
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = array![[0.0], [1.0], [3.0]];
        let model = optics(2).fit(points.view());
        assert_eq!(model.core_distances, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_ordering_is_a_permutation() {
        let model = optics(3).fit(blobs().view());
        let mut seen = model.ordering.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..21).collect::<Vec<_>>());
        assert_eq!(model.ordering[0], 0);
        assert!(model.reachability[0].is_infinite());
    }

    #[test]
    fn test_separates_blobs_and_flags_isolated_point() {
        let model = Optics::new(OpticsParams {
            min_samples: 3,
            max_eps: 1.0,
            ..OpticsParams::default()
        })
        .unwrap()
        .fit(blobs().view());
        assert_eq!(model.n_clusters(), 2);
        let first = model.labels[0];
        let second = model.labels[10];
        assert!(first >= 0 && second >= 0 && first != second);
        assert!(model.labels[..10].iter().all(|&l| l == first));
        assert!(model.labels[10..20].iter().all(|&l| l == second));
        assert_eq!(model.labels[20], NOISE);
    }

    #[test]
    fn test_identical_points() {
        let points = Array2::from_elem((12, 4), 0.5);
        let model = optics(4).fit(points.view());
        assert!(model.reachability.iter().any(|r| r.is_finite()));
        let all_one_cluster = model.labels.iter().all(|&l| l == 0);
        let all_noise = model.labels.iter().all(|&l| l == NOISE);
        assert!(all_one_cluster || all_noise);
    }

    #[test]
    fn test_fewer_points_than_min_samples() {
        let points = array![[0.0, 0.0], [0.0, 0.0]];
        let model = optics(5).fit(points.view());
        assert_eq!(model.labels, vec![NOISE, NOISE]);
        assert!(model.core_distances.iter().all(|c| c.is_infinite()));
    }

    #[test]
    fn test_max_eps_makes_far_points_unreachable() {
        let points = array![[0.0], [0.1], [0.2], [10.0]];
        let model = Optics::new(OpticsParams {
            min_samples: 2,
            max_eps: 1.0,
            ..OpticsParams::default()
        })
        .unwrap()
        .fit(points.view());
        assert!(model.reachability[3].is_infinite());
        assert!(model.reachability[1].is_finite());
    }

    #[test]
    fn test_empty_input() {
        let model = optics(2).fit(Array2::<f64>::zeros((0, 4)).view());
        assert!(model.ordering.is_empty());
        assert!(model.labels.is_empty());
        assert_eq!(model.n_clusters(), 0);
    }
}
