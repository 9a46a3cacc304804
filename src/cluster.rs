//! Movement clustering engine.
//!
//! Tracks are described by their entry and exit positions; OPTICS groups
//! them into movements and flags outliers, and k-means independently zones
//! the exit positions into a small number of exit groups.

mod endpoints;
mod engine;
mod explore;
mod kmeans;
mod optics;
mod outliers;
mod stats;
mod tune;
mod xi;

pub use endpoints::EntryExitPoints;
pub use engine::{ClusterRecord, DensityClusters, MovementAnalysis, MovementClusterer};
pub use explore::{OutlierSpread, OutlierSummary, Range, TopOutlier, top_outlier_rows};
pub use kmeans::{ExitGroupRecord, ExitGrouping, KMeans, KMeansModel, KMeansParams, consolidate_by_exit};
pub(crate) use optics::euclidean;
pub use optics::{NOISE, Optics, OpticsModel, OpticsParams};
pub use outliers::{OutlierRecord, analyze_outliers, clean_reachability};
pub use stats::{ClusterStats, outlier_ids};
pub use tune::{RECOMMENDED_CLUSTERS, TuneGrid, TuneResult, grid_search, normalize_coordinates, recommended};
