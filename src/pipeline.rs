//! Stage orchestration.
//!
//! Each stage reads its whole input table, computes its whole output and
//! writes it before returning. Stages only communicate through the tables
//! under the dataset directories.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::classify::{ClassifierKind, crossval_scores, mean_std};
use crate::cluster::{
    ClusterRecord, EntryExitPoints, ExitGroupRecord, MovementAnalysis, MovementClusterer, OutlierRecord,
    OutlierSummary, TuneGrid, TuneResult, grid_search, normalize_coordinates, recommended, top_outlier_rows,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::FeatureTable;
use crate::ingest::{Detection, FrameResultsFile, FrameSource, TrackIngestor, load_legacy_json};
use crate::store::{self, DatasetPaths};
use crate::trajectory::{Trajectory, TrajectoryRow, group_rows};

/// Which table supplied the training labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    ExitGroups,
    Clusters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub classifier: ClassifierKind,
    pub label_source: LabelSource,
    pub n_samples: usize,
    /// Balanced accuracy, one entry per cross-validation repeat.
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

/// Outcome of a multi-file tracking run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

pub struct Pipeline {
    config: Config,
    paths: DatasetPaths,
}

impl Pipeline {
    /// Validates `config` before any stage can run.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let paths = DatasetPaths::from_config(&config.dataset);
        Ok(Self { config, paths })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &DatasetPaths {
        &self.paths
    }

    /// Import a legacy entity archive into the `tracks` table.
    ///
    /// `input` defaults to `dataset.legacy_json`.
    pub fn import_legacy(&self, input: Option<&Path>) -> Result<usize> {
        let input = input
            .or(self.config.dataset.legacy_json.as_deref())
            .ok_or_else(|| Error::Config("no legacy archive given and dataset.legacy_json is not set".into()))?;
        self.paths.ensure_dirs()?;

        let rows = load_legacy_json(input, self.config.dataset.class_map.as_ref())?;
        let out = self.paths.tracks();
        store::write_rows(&out, &rows)?;
        info!(input = %input.display(), rows = rows.len(), out = %out.display(), "imported legacy tracks");
        Ok(rows.len())
    }

    /// Ingest a frame-results file into the `tracks` table.
    ///
    /// `source` defaults to `dataset.video`.
    pub fn track_frames(&self, source: Option<&Path>) -> Result<usize> {
        let source = source
            .or(self.config.dataset.video.as_deref())
            .ok_or_else(|| Error::Config("no frame-results source given and dataset.video is not set".into()))?;
        self.ingest_frames(FrameResultsFile::open(source)?)
    }

    /// Ingest any frame source into the `tracks` table, applying the
    /// detector's confidence threshold and class filter.
    pub fn ingest_frames<S>(&self, source: S) -> Result<usize>
    where
        S: FrameSource,
        Error: From<S::Error>,
    {
        self.paths.ensure_dirs()?;
        let tracked = self.config.tracker.is_enabled();
        let mut ingestor = TrackIngestor::new(source, tracked);
        let all = ingestor.ingest()?;
        let total = all.len();
        let rows: Vec<Detection> = all.into_iter().filter(|d| self.config.detect.accepts(d)).collect();
        let unscored = rows.iter().filter(|d| d.conf.is_none()).count();

        let out = self.paths.tracks();
        store::write_rows(&out, &rows)?;
        info!(
            rows = rows.len(),
            dropped = total - rows.len(),
            unscored,
            tracker = %self.config.tracker.name,
            out = %out.display(),
            "wrote tracks"
        );
        Ok(rows.len())
    }

    /// Smooth and differentiate every track into the `trajectories` table.
    pub fn build_trajectories(&self) -> Result<Vec<Trajectory>> {
        let detections: Vec<Detection> = store::read_rows(&self.paths.tracks())?;
        let builder = self.config.trajectory_builder()?;
        let trajectories = builder.build(&detections);

        let rows: Vec<TrajectoryRow> = trajectories.iter().flat_map(|t| t.rows()).collect();
        let out = self.paths.trajectories();
        store::write_rows(&out, &rows)?;
        info!(
            detections = detections.len(),
            tracks = trajectories.len(),
            rows = rows.len(),
            out = %out.display(),
            "wrote trajectories"
        );
        Ok(trajectories)
    }

    fn load_trajectories(&self) -> Result<(Vec<TrajectoryRow>, Vec<Trajectory>)> {
        let rows: Vec<TrajectoryRow> = store::read_rows(&self.paths.trajectories())?;
        let trajectories = group_rows(&rows);
        Ok((rows, trajectories))
    }

    /// Vectorize every trajectory with the configured preset into the `features` table.
    pub fn generate_features(&self) -> Result<FeatureTable> {
        let spec = self.config.features.spec()?;
        let (_, trajectories) = self.load_trajectories()?;
        let table = FeatureTable::from_trajectories(&trajectories, &spec)?;

        let out = self.paths.features();
        store::write_features(&out, &table)?;
        info!(preset = %spec, tracks = table.len(), dims = table.width(), out = %out.display(), "wrote features");
        Ok(table)
    }

    /// Density clustering and outlier report, then exit-group consolidation.
    ///
    /// The clusters and outliers tables are written before consolidation runs.
    pub fn cluster_tracks(&self) -> Result<MovementAnalysis> {
        let cluster = &self.config.dataset.cluster;
        let (_, trajectories) = self.load_trajectories()?;
        let clusterer = MovementClusterer::new(cluster.optics_params(), cluster.kmeans_params())?;
        let density = clusterer.cluster_density(EntryExitPoints::from_trajectories(&trajectories));
        store::write_rows(&self.paths.clusters(), &density.cluster_records())?;
        store::write_rows(&self.paths.outliers(), &density.outliers)?;

        let analysis = clusterer.consolidate(density)?;
        store::write_rows(&self.paths.exit_groups(), &analysis.exit_groups.records())?;
        info!(
            scene = %self.config.dataset.scene,
            clusters = analysis.stats.n_clusters,
            outliers = analysis.stats.n_outliers,
            unreachable = analysis.n_unreachable(),
            out = %self.paths.processed.display(),
            "wrote clusters, outliers and exit groups"
        );
        Ok(analysis)
    }

    fn load_labels(&self) -> Result<Option<(LabelSource, HashMap<i64, i64>)>> {
        let exit_groups = self.paths.exit_groups();
        if store::table_exists(&exit_groups) {
            let rows: Vec<ExitGroupRecord> = store::read_rows(&exit_groups)?;
            let labels = rows.into_iter().map(|r| (r.track_id, r.exit_group)).collect();
            return Ok(Some((LabelSource::ExitGroups, labels)));
        }
        let clusters = self.paths.clusters();
        if store::table_exists(&clusters) {
            let rows: Vec<ClusterRecord> = store::read_rows(&clusters)?;
            let labels = rows.into_iter().map(|r| (r.track_id, r.cluster)).collect();
            return Ok(Some((LabelSource::Clusters, labels)));
        }
        Ok(None)
    }

    /// Cross-validate the configured classifier on the feature table.
    ///
    /// Labels come from exit groups when present, else from clusters. Returns
    /// `None` without error when no label table exists or there are no
    /// features. Tracks missing from the label table get label -1.
    pub fn train_classifier(&self) -> Result<Option<TrainReport>> {
        let clf = &self.config.clf;
        let kind = clf.kind()?;
        let features = store::read_features(&self.paths.features())?;

        let Some((label_source, labels)) = self.load_labels()? else {
            warn!("no label tables found; run the cluster stage first");
            return Ok(None);
        };
        if features.is_empty() {
            warn!("no features found; run the feature stage first");
            return Ok(None);
        }

        let y: Vec<i64> = features
            .track_ids()
            .iter()
            .map(|id| labels.get(id).copied().unwrap_or(-1))
            .collect();
        let x = features.to_f64();
        let scores = crossval_scores(kind, x.view(), &y, clf.folds, clf.repeats, clf.seed)?;
        let (mean, std) = mean_std(&scores);
        info!(
            classifier = %kind,
            labels = ?label_source,
            samples = y.len(),
            mean = format_args!("{mean:.3}"),
            std = format_args!("{std:.3}"),
            "balanced accuracy"
        );

        Ok(Some(TrainReport {
            classifier: kind,
            label_source,
            n_samples: y.len(),
            scores,
            mean,
            std,
        }))
    }

    /// Summarize the outlier report and write the trajectories of the
    /// `top_n` most anomalous tracks.
    pub fn explore_outliers(&self, top_n: usize) -> Result<OutlierSummary> {
        let outliers: Vec<OutlierRecord> = store::read_rows(&self.paths.outliers())?;
        let clusters: Vec<ClusterRecord> = store::read_rows(&self.paths.clusters())?;
        let (rows, _) = self.load_trajectories()?;

        let summary = OutlierSummary::new(&outliers, &clusters, &rows, top_n);
        info!(
            scene = %self.config.dataset.scene,
            total = summary.n_total,
            clustered = summary.n_clustered,
            outliers = summary.n_outliers,
            pct_outliers = format_args!("{:.1}", summary.pct_of_total(summary.n_outliers)),
            "outlier summary"
        );
        match &summary.spread {
            Some(spread) => info!(
                min = spread.reachability.min,
                max = spread.reachability.max,
                mean = spread.mean_reachability,
                median = spread.median_reachability,
                "outlier reachability"
            ),
            None => info!("no outliers found"),
        }

        let top = top_outlier_rows(&outliers, &rows, top_n);
        store::write_rows(&self.paths.top_outliers(), &top)?;
        Ok(summary)
    }

    /// Sweep OPTICS parameters over normalized entry/exit coordinates.
    pub fn tune(&self, grid: &TuneGrid) -> Result<Vec<TuneResult>> {
        let (_, trajectories) = self.load_trajectories()?;
        let points = EntryExitPoints::from_trajectories(&trajectories);
        let normalized = normalize_coordinates(points.matrix());
        let results = grid_search(normalized.view(), grid)?;
        store::write_rows(&self.paths.tuning(), &results)?;

        let good = recommended(&results);
        info!(
            tracks = points.len(),
            combinations = results.len(),
            recommended = good.len(),
            "parameter sweep done"
        );
        for r in &good {
            info!(
                min_samples = r.min_samples,
                xi = r.xi,
                max_eps = r.max_eps,
                clusters = r.n_clusters,
                pct_outliers = format_args!("{:.1}", r.pct_outliers),
                "recommended setting"
            );
        }
        Ok(results)
    }

    /// Run the tracking stage for every file under `source` with one of
    /// `extensions`. Each file's tracks go to `interim/<file stem>/`.
    ///
    /// A failing file is logged and recorded; the remaining files still run.
    pub fn run_batch(&self, source: &Path, extensions: &[String], recursive: bool) -> Result<BatchReport> {
        let files = collect_sources(source, extensions, recursive)?;
        if files.is_empty() {
            warn!(source = %source.display(), ?extensions, "no input files found");
        }

        let mut report = BatchReport::default();
        for file in files {
            let stem = file.file_stem().and_then(OsStr::to_str).unwrap_or("source").to_string();
            let per_file = Pipeline {
                config: self.config.clone(),
                paths: self.paths.with_interim_subdir(&stem),
            };
            info!(file = %file.display(), "tracking");
            match per_file.track_frames(Some(&file)) {
                Ok(_) => report.succeeded.push(file),
                Err(e) => {
                    error!(file = %file.display(), error = %e, "tracking failed; continuing");
                    report.failed.push((file, e.to_string()));
                }
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        Ok(report)
    }
}

/// `source` itself when it is a file, otherwise the matching files below it, sorted.
fn collect_sources(source: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.exists() {
        return Err(Error::io(
            source,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source not found"),
        ));
    }

    let mut walker = WalkDir::new(source).follow_links(true).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{BoxBuilder, FrameResult, MemoryFrameSource};
    use std::fs;

    fn pipeline(root: &Path) -> Pipeline {
        let mut config = Config::default();
        config.dataset.raw_dir = root.join("raw");
        config.dataset.interim_dir = root.join("interim");
        config.dataset.processed_dir = root.join("processed");
        Pipeline::new(config).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.trajectory.window = 4;
        assert!(matches!(Pipeline::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_ingest_filters_and_drops_ids_without_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let frames = vec![FrameResult::new(
            0,
            vec![
                BoxBuilder::new().xyxy(0.0, 0.0, 10.0, 20.0).class(2).score(0.9).track_id(5).build(),
                BoxBuilder::new().xyxy(0.0, 0.0, 10.0, 20.0).class(2).score(0.1).track_id(6).build(),
            ],
        )];

        assert_eq!(p.ingest_frames(MemoryFrameSource::new(frames)).unwrap(), 1);
        let rows: Vec<Detection> = store::read_rows(&p.paths().tracks()).unwrap();
        assert_eq!(rows[0].track_id, -1);
        assert_eq!((rows[0].cx, rows[0].cy, rows[0].w, rows[0].h), (5.0, 10.0, 10.0, 20.0));
    }

    #[test]
    fn test_ingest_keeps_boxes_without_score() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let frames = vec![FrameResult::new(
            3,
            vec![BoxBuilder::new().xyxy(0.0, 0.0, 4.0, 4.0).class(2).track_id(9).build()],
        )];

        assert_eq!(p.ingest_frames(MemoryFrameSource::new(frames)).unwrap(), 1);
        let rows: Vec<Detection> = store::read_rows(&p.paths().tracks()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].frame, 3);
        assert_eq!(rows[0].conf, None);
    }

    #[test]
    fn test_missing_sources_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert!(matches!(p.import_legacy(None), Err(Error::Config(_))));
        assert!(matches!(p.track_frames(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_stage_without_input_table() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert!(matches!(p.build_trajectories(), Err(Error::MissingTable(_))));
    }

    #[test]
    fn test_train_without_labels_returns_early() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let table = FeatureTable::new(vec![1, 2], ndarray::array![[0.0f32, 1.0], [1.0, 0.0]]).unwrap();
        store::write_features(&p.paths().features(), &table).unwrap();
        assert_eq!(p.train_classifier().unwrap(), None);
    }

    #[test]
    fn test_collect_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        for name in ["b.jsonl", "a.JSONL", "notes.txt", "sub/c.jsonl"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let ext = vec!["jsonl".to_string()];

        let flat = collect_sources(dir.path(), &ext, false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.JSONL"), dir.path().join("b.jsonl")]);
        let deep = collect_sources(dir.path(), &ext, true).unwrap();
        assert_eq!(deep.len(), 3);
        let single = collect_sources(&dir.path().join("notes.txt"), &ext, false).unwrap();
        assert_eq!(single.len(), 1);
        assert!(collect_sources(&dir.path().join("nope"), &ext, false).is_err());
    }
}
