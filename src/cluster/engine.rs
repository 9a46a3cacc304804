//! Movement discovery: density clustering of entry/exit geometry, outlier
//! report and exit-zone consolidation in one pass.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::endpoints::EntryExitPoints;
use crate::cluster::kmeans::{ExitGrouping, KMeansParams, consolidate_by_exit};
use crate::cluster::optics::{Optics, OpticsModel, OpticsParams};
use crate::cluster::outliers::{OutlierRecord, analyze_outliers};
use crate::cluster::stats::ClusterStats;
use crate::error::Result;
use crate::trajectory::Trajectory;

/// One row of the `clusters` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub track_id: i64,
    pub cluster: i64,
}

/// Result of the density pass alone: movements and outliers.
#[derive(Debug, Clone)]
pub struct DensityClusters {
    pub points: EntryExitPoints,
    pub model: OpticsModel,
    pub stats: ClusterStats,
    /// Noise points, most anomalous first.
    pub outliers: Vec<OutlierRecord>,
}

impl DensityClusters {
    pub fn cluster_records(&self) -> Vec<ClusterRecord> {
        cluster_records(&self.points, &self.model)
    }

    /// Outliers whose raw reachability was infinite.
    pub fn n_unreachable(&self) -> usize {
        self.outliers.iter().filter(|o| o.is_unreachable).count()
    }
}

#[derive(Debug, Clone)]
pub struct MovementAnalysis {
    pub points: EntryExitPoints,
    pub model: OpticsModel,
    pub stats: ClusterStats,
    /// Noise points, most anomalous first.
    pub outliers: Vec<OutlierRecord>,
    pub exit_groups: ExitGrouping,
}

impl MovementAnalysis {
    pub fn cluster_records(&self) -> Vec<ClusterRecord> {
        cluster_records(&self.points, &self.model)
    }

    /// Outliers whose raw reachability was infinite.
    pub fn n_unreachable(&self) -> usize {
        self.outliers.iter().filter(|o| o.is_unreachable).count()
    }
}

fn cluster_records(points: &EntryExitPoints, model: &OpticsModel) -> Vec<ClusterRecord> {
    points
        .track_ids()
        .iter()
        .zip(&model.labels)
        .map(|(&track_id, &cluster)| ClusterRecord { track_id, cluster })
        .collect()
}

pub struct MovementClusterer {
    optics: Optics,
    exit_params: KMeansParams,
}

impl MovementClusterer {
    pub fn new(optics: OpticsParams, exit_params: KMeansParams) -> Result<Self> {
        Ok(Self {
            optics: Optics::new(optics)?,
            exit_params,
        })
    }

    /// Cluster trajectories (ascending track id) by their first and last positions.
    pub fn analyze_trajectories(&self, trajectories: &[Trajectory]) -> Result<MovementAnalysis> {
        self.analyze(EntryExitPoints::from_trajectories(trajectories))
    }

    pub fn analyze(&self, points: EntryExitPoints) -> Result<MovementAnalysis> {
        let density = self.cluster_density(points);
        self.consolidate(density)
    }

    /// OPTICS over the entry/exit matrix plus the outlier report.
    pub fn cluster_density(&self, points: EntryExitPoints) -> DensityClusters {
        let params = self.optics.params();
        info!(
            tracks = points.len(),
            min_samples = params.min_samples,
            xi = params.xi,
            max_eps = params.max_eps,
            "clustering entry/exit points"
        );

        let model = self.optics.fit(points.matrix());
        let stats = ClusterStats::from_labels(&model.labels);
        let outliers = analyze_outliers(&points, &model.labels, &model.reachability);
        info!(
            total = stats.n_total,
            clusters = stats.n_clusters,
            outliers = stats.n_outliers,
            pct_outliers = format_args!("{:.1}", stats.pct_outliers),
            "density clustering done"
        );

        DensityClusters {
            points,
            model,
            stats,
            outliers,
        }
    }

    /// Zone the exit positions of an already clustered scene.
    pub fn consolidate(&self, density: DensityClusters) -> Result<MovementAnalysis> {
        let exit_groups = consolidate_by_exit(&density.points, &self.exit_params)?;
        info!(
            k = exit_groups.model.centroids.nrows(),
            inertia = exit_groups.model.inertia,
            "exit groups consolidated"
        );

        let DensityClusters {
            points,
            model,
            stats,
            outliers,
        } = density;
        Ok(MovementAnalysis {
            points,
            model,
            stats,
            outliers,
            exit_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(track_id: i64, from: (f64, f64), to: (f64, f64), n: usize) -> Trajectory {
        let t = |i: usize| i as f64 / (n - 1) as f64;
        let x: Vec<f64> = (0..n).map(|i| from.0 + (to.0 - from.0) * t(i)).collect();
        let y: Vec<f64> = (0..n).map(|i| from.1 + (to.1 - from.1) * t(i)).collect();
        Trajectory {
            track_id,
            frame: (0..n as u32).collect(),
            vx: vec![0.0; n],
            vy: vec![0.0; n],
            ax: vec![0.0; n],
            ay: vec![0.0; n],
            x,
            y,
        }
    }

    fn scene() -> Vec<Trajectory> {
        let mut trajs = Vec::new();
        for i in 0..8 {
            let j = i as f64 * 0.002;
            trajs.push(line(i, (0.0 + j, 0.5), (1.0, 0.5 + j), 5));
        }
        for i in 8..16 {
            let j = (i - 8) as f64 * 0.002;
            trajs.push(line(i, (0.5, 0.0 + j), (0.5 + j, 1.0), 5));
        }
        trajs
    }

    fn clusterer() -> MovementClusterer {
        MovementClusterer::new(
            OpticsParams {
                min_samples: 3,
                max_eps: 0.2,
                ..OpticsParams::default()
            },
            KMeansParams {
                k: 2,
                ..KMeansParams::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_two_movements() {
        let analysis = clusterer().analyze_trajectories(&scene()).unwrap();
        assert_eq!(analysis.stats.n_total, 16);
        assert_eq!(analysis.stats.n_clusters, 2);
        assert_eq!(analysis.stats.n_outliers, analysis.outliers.len());

        let records = analysis.cluster_records();
        assert_eq!(records.len(), 16);
        assert!(records[..8].iter().all(|r| r.cluster == records[0].cluster));
        assert!(records[8..].iter().all(|r| r.cluster == records[8].cluster));
        assert_ne!(records[0].cluster, records[8].cluster);

        let exits = analysis.exit_groups.records();
        assert_ne!(exits[0].exit_group, exits[8].exit_group);
    }

    #[test]
    fn test_no_tracks() {
        let analysis = clusterer().analyze_trajectories(&[]).unwrap();
        assert_eq!(analysis.stats, ClusterStats::default());
        assert!(analysis.outliers.is_empty());
        assert!(analysis.exit_groups.records().is_empty());
    }

    #[test]
    fn test_fewer_tracks_than_exit_groups() {
        let clusterer = MovementClusterer::new(OpticsParams::default(), KMeansParams::default()).unwrap();
        let analysis = clusterer.analyze_trajectories(&scene()[..5]).unwrap();
        assert_eq!(analysis.stats.n_total, 5);
        assert_eq!(analysis.stats.n_clusters, 0);
        assert_eq!(analysis.outliers.len(), 5);
        assert_eq!(analysis.exit_groups.records().len(), 5);
    }
}
