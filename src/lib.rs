//! Discovery of recurring traffic movements at an intersection.
//!
//! Vehicle tracks from a traffic camera are smoothed into trajectories,
//! described by their entry and exit positions, and grouped with OPTICS into
//! movements such as "straight through" or "left turn". Tracks that fit no
//! movement are reported as outliers, exit positions are zoned into a few
//! exit groups with k-means, and a classifier bank learns the groups from
//! feature vectors.
//!
//! Stages communicate through newline-delimited JSON tables (see [`store`])
//! and are driven by [`pipeline::Pipeline`]:
//!
//! ```no_run
//! use traffic_movements::{Config, Pipeline};
//!
//! let config = Config::load(None, &["dataset.legacy_json=entities.json".to_string()])?;
//! let pipeline = Pipeline::new(config)?;
//! pipeline.import_legacy(None)?;
//! pipeline.build_trajectories()?;
//! pipeline.generate_features()?;
//! let analysis = pipeline.cluster_tracks()?;
//! println!("{} movements", analysis.stats.n_clusters);
//! # Ok::<(), traffic_movements::Error>(())
//! ```

pub mod classify;
pub mod cluster;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod store;
pub mod trajectory;

pub use classify::{Classifier, ClassifierKind, Model};
pub use cluster::{
    ClusterStats, EntryExitPoints, KMeans, KMeansParams, MovementAnalysis, MovementClusterer, NOISE, Optics,
    OpticsParams, OutlierRecord,
};
pub use config::Config;
pub use error::{Error, Result};
pub use features::{FeatureSpec, FeatureTable};
pub use ingest::{Detection, FrameSource, TrackIngestor};
pub use pipeline::{BatchReport, Pipeline, TrainReport};
pub use store::DatasetPaths;
pub use trajectory::{Trajectory, TrajectoryBuilder};
