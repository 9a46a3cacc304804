//! Run configuration.
//!
//! A YAML document with the sections `dataset`, `trajectory`, `detect`,
//! `tracker`, `features`, `clf` and `viz`. Every field has a default, so an
//! empty document (or no file at all) is a valid configuration. Dotted
//! overrides such as `dataset.cluster.min_samples=20` are applied to the YAML
//! tree before it is deserialized.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::classify::ClassifierKind;
use crate::cluster::{KMeansParams, OpticsParams};
use crate::error::{Error, Result};
use crate::features::FeatureSpec;
use crate::ingest::{ClassMap, Detection};
use crate::trajectory::TrajectoryBuilder;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub trajectory: TrajectoryConfig,
    pub detect: DetectConfig,
    pub tracker: TrackerConfig,
    pub features: FeaturesConfig,
    pub clf: ClfConfig,
    pub viz: VizConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub scene: String,
    pub raw_dir: PathBuf,
    pub interim_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Frame-results file (or directory of them, for batch runs) to track.
    pub video: Option<PathBuf>,
    pub fps: f64,
    pub legacy_json: Option<PathBuf>,
    /// Label string to class id, used by legacy import.
    pub class_map: Option<ClassMap>,
    pub visualize: bool,
    pub cluster: ClusterConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            scene: "default".into(),
            raw_dir: PathBuf::from("data/raw"),
            interim_dir: PathBuf::from("data/interim"),
            processed_dir: PathBuf::from("data/processed"),
            video: None,
            fps: 30.0,
            legacy_json: None,
            class_map: None,
            visualize: false,
            cluster: ClusterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_samples: usize,
    pub xi: f64,
    /// Unbounded when absent.
    pub max_eps: Option<f64>,
    pub exit_groups: usize,
    pub kmeans_init: usize,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            xi: 0.05,
            max_eps: None,
            exit_groups: 8,
            kmeans_init: 10,
            seed: 42,
        }
    }
}

impl ClusterConfig {
    pub fn optics_params(&self) -> OpticsParams {
        OpticsParams {
            min_samples: self.min_samples,
            xi: self.xi,
            max_eps: self.max_eps.unwrap_or(f64::INFINITY),
            ..OpticsParams::default()
        }
    }

    pub fn kmeans_params(&self) -> KMeansParams {
        KMeansParams {
            k: self.exit_groups,
            n_init: self.kmeans_init,
            seed: self.seed,
            ..KMeansParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Smoothing window length, odd.
    pub window: usize,
    pub poly: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self { window: 9, poly: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub weights: String,
    /// Minimum confidence for a box to be ingested.
    pub conf: f64,
    pub device: String,
    /// Class ids to keep; all classes when absent.
    pub classes: Option<Vec<i64>>,
    pub imgsz: Option<u32>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            weights: "yolov8n.pt".into(),
            conf: 0.25,
            device: "auto".into(),
            classes: None,
            imgsz: None,
        }
    }
}

impl DetectConfig {
    /// Whether a detection passes the confidence threshold and class filter.
    ///
    /// The threshold only applies to detections that carry a score.
    pub fn accepts(&self, det: &Detection) -> bool {
        det.conf.is_none_or(|c| c >= self.conf) && self.classes.as_ref().is_none_or(|c| c.contains(&det.cls))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// `"none"` runs detection only: every row gets track id -1.
    pub name: String,
    pub yaml_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "none".into(),
            yaml_path: None,
        }
    }
}

impl TrackerConfig {
    pub fn is_enabled(&self) -> bool {
        !self.name.eq_ignore_ascii_case("none")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub preset: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { preset: "ReVeRs".into() }
    }
}

impl FeaturesConfig {
    pub fn spec(&self) -> Result<FeatureSpec> {
        FeatureSpec::parse(&self.preset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClfConfig {
    pub name: String,
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
}

impl Default for ClfConfig {
    fn default() -> Self {
        Self {
            name: "knn".into(),
            folds: 5,
            repeats: 2,
            seed: 42,
        }
    }
}

impl ClfConfig {
    pub fn kind(&self) -> Result<ClassifierKind> {
        self.name.parse()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub class_names: BTreeMap<i64, String>,
    /// RGB per class id.
    pub colors: BTreeMap<i64, [u8; 3]>,
}

impl Config {
    /// Load `path` (defaults when `None`), apply `key=value` overrides and validate.
    pub fn load(path: Option<&Path>, overrides: &[String]) -> Result<Self> {
        let mut tree = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                serde_yaml::from_str(&text)?
            }
            None => Value::Null,
        };
        for item in overrides {
            apply_override(&mut tree, item)?;
        }
        if tree.is_null() {
            tree = Value::Mapping(Mapping::new());
        }

        let config: Config = serde_yaml::from_value(tree)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without overrides.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let tree: Value = serde_yaml::from_str(text)?;
        let config: Config = if tree.is_null() {
            Config::default()
        } else {
            serde_yaml::from_value(tree)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail later stages, before any work starts.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dataset;
        for (name, dir) in [
            ("dataset.raw_dir", &d.raw_dir),
            ("dataset.interim_dir", &d.interim_dir),
            ("dataset.processed_dir", &d.processed_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        if !(d.fps.is_finite() && d.fps > 0.0) {
            return Err(Error::Config(format!("dataset.fps must be positive, got {}", d.fps)));
        }

        let t = &self.trajectory;
        if t.window == 0 || t.window % 2 == 0 {
            return Err(Error::Config(format!(
                "trajectory.window must be a positive odd number, got {}",
                t.window
            )));
        }
        if t.poly >= t.window {
            return Err(Error::Config(format!(
                "trajectory.poly ({}) must be less than trajectory.window ({})",
                t.poly, t.window
            )));
        }

        let c = &d.cluster;
        if c.min_samples < 2 {
            return Err(Error::Config(format!(
                "dataset.cluster.min_samples must be at least 2, got {}",
                c.min_samples
            )));
        }
        if !(c.xi > 0.0 && c.xi < 1.0) {
            return Err(Error::Config(format!("dataset.cluster.xi must lie in (0, 1), got {}", c.xi)));
        }
        if let Some(eps) = c.max_eps {
            if eps.is_nan() || eps <= 0.0 {
                return Err(Error::Config(format!("dataset.cluster.max_eps must be positive, got {eps}")));
            }
        }
        if c.exit_groups == 0 {
            return Err(Error::Config("dataset.cluster.exit_groups must be at least 1".into()));
        }
        if c.kmeans_init == 0 {
            return Err(Error::Config("dataset.cluster.kmeans_init must be at least 1".into()));
        }

        if !(0.0..=1.0).contains(&self.detect.conf) {
            return Err(Error::Config(format!(
                "detect.conf must lie in [0, 1], got {}",
                self.detect.conf
            )));
        }

        self.features.spec()?;
        self.clf.kind()?;
        if self.clf.folds < 2 {
            return Err(Error::Config(format!("clf.folds must be at least 2, got {}", self.clf.folds)));
        }
        if self.clf.repeats == 0 {
            return Err(Error::Config("clf.repeats must be at least 1".into()));
        }

        if d.visualize {
            let names: Vec<&i64> = self.viz.class_names.keys().collect();
            let colors: Vec<&i64> = self.viz.colors.keys().collect();
            if names != colors {
                return Err(Error::Config(format!(
                    "viz.class_names keys {names:?} and viz.colors keys {colors:?} differ"
                )));
            }
        }
        Ok(())
    }

    pub fn trajectory_builder(&self) -> Result<TrajectoryBuilder> {
        TrajectoryBuilder::new(self.dataset.fps, self.trajectory.window, self.trajectory.poly)
    }
}

/// Apply one `dotted.key=value` override to a YAML tree.
///
/// Missing intermediate mappings are created. The value is parsed as YAML, so
/// `20` becomes a number, `true` a bool and `[1, 2]` a sequence.
pub fn apply_override(tree: &mut Value, item: &str) -> Result<()> {
    let (key, raw) = item
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("override {item:?} is not of the form key=value")))?;
    let segments: Vec<&str> = key.trim().split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::Config(format!("override {item:?} has an empty key segment")));
    }
    let value: Value = serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut node = tree;
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(Error::Config(format!("override {item:?} has no key"))),
    };
    for (depth, segment) in parents.iter().enumerate() {
        if node.is_null() {
            *node = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = node else {
            return Err(Error::Config(format!(
                "cannot override {key}: {} is not a mapping",
                segments[..depth].join(".")
            )));
        };
        node = map
            .entry(Value::String((*segment).to_string()))
            .or_insert(Value::Null);
    }
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(map) = node else {
        return Err(Error::Config(format!(
            "cannot override {key}: {} is not a mapping",
            parents.join(".")
        )));
    };
    debug!(key, value = ?value, "config override");
    map.insert(Value::String((*last).to_string()), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dataset.fps, 30.0);
        assert_eq!(config.dataset.cluster.min_samples, 30);
        assert_eq!(config.dataset.cluster.exit_groups, 8);
        assert_eq!(config.trajectory.window, 9);
        assert_eq!(config.features.preset, "ReVeRs");
        assert_eq!(config.clf.name, "knn");
        assert!(!config.tracker.is_enabled());
        assert_eq!(config.dataset.cluster.optics_params().max_eps, f64::INFINITY);
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_yaml_str(
            "dataset:\n  fps: 25\n  class_map: {car: 2, truck: 7}\n  cluster:\n    max_eps: 0.15\nclf:\n  name: svm\n",
        )
        .unwrap();
        assert_eq!(config.dataset.fps, 25.0);
        assert_eq!(config.dataset.class_map.as_ref().and_then(|m| m.get("truck")), Some(&7));
        assert_eq!(config.dataset.cluster.optics_params().max_eps, 0.15);
        assert_eq!(config.dataset.cluster.min_samples, 30);
        assert_eq!(config.clf.kind().unwrap(), ClassifierKind::Svm);
    }

    #[test]
    fn test_overrides() {
        let mut tree: Value = serde_yaml::from_str("dataset:\n  fps: 25\n").unwrap();
        apply_override(&mut tree, "dataset.cluster.min_samples=12").unwrap();
        apply_override(&mut tree, "features.preset=ReVe").unwrap();
        apply_override(&mut tree, "dataset.visualize=true").unwrap();
        apply_override(&mut tree, "detect.classes=[2, 7]").unwrap();
        let config: Config = serde_yaml::from_value(tree).unwrap();
        assert_eq!(config.dataset.fps, 25.0);
        assert_eq!(config.dataset.cluster.min_samples, 12);
        assert_eq!(config.features.preset, "ReVe");
        assert!(config.dataset.visualize);
        assert_eq!(config.detect.classes, Some(vec![2, 7]));
    }

    #[test]
    fn test_override_errors() {
        let mut tree: Value = serde_yaml::from_str("dataset:\n  fps: 25\n").unwrap();
        assert!(matches!(apply_override(&mut tree, "dataset.fps"), Err(Error::Config(_))));
        assert!(matches!(apply_override(&mut tree, "dataset.fps.x=1"), Err(Error::Config(_))));
        assert!(matches!(apply_override(&mut tree, "dataset..fps=1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects() {
        let cases: &[fn(&mut Config)] = &[
            |c| c.dataset.processed_dir = PathBuf::new(),
            |c| c.dataset.fps = 0.0,
            |c| c.trajectory.window = 8,
            |c| c.trajectory.poly = 9,
            |c| c.dataset.cluster.min_samples = 1,
            |c| c.dataset.cluster.xi = 1.0,
            |c| c.dataset.cluster.max_eps = Some(0.0),
            |c| c.dataset.cluster.exit_groups = 0,
            |c| c.dataset.cluster.kmeans_init = 0,
            |c| c.clf.folds = 1,
            |c| c.clf.repeats = 0,
            |c| c.detect.conf = 1.5,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }

        let mut config = Config::default();
        config.features.preset = "ReVx".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clf.name = "forest".into();
        assert!(matches!(config.validate(), Err(Error::UnknownClassifier(_))));
    }

    #[test]
    fn test_viz_keys_checked_only_when_visualizing() {
        let mut config = Config::default();
        config.viz.class_names.insert(2, "car".into());
        config.viz.colors.insert(3, [255, 0, 0]);
        assert!(config.validate().is_ok());

        config.dataset.visualize = true;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.viz.colors.clear();
        config.viz.colors.insert(2, [255, 0, 0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detect_filter() {
        let det = Detection {
            frame: 0,
            track_id: 1,
            cls: 2,
            conf: Some(0.5),
            cx: 0.0,
            cy: 0.0,
            w: 1.0,
            h: 1.0,
        };
        let mut detect = DetectConfig::default();
        assert!(detect.accepts(&det));
        detect.classes = Some(vec![7]);
        assert!(!detect.accepts(&det));
        detect.classes = None;
        detect.conf = 0.6;
        assert!(!detect.accepts(&det));

        let unscored = Detection { conf: None, ..det };
        assert!(detect.accepts(&unscored));
        detect.classes = Some(vec![7]);
        assert!(!detect.accepts(&unscored));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "trajectory:\n  window: 7\n").unwrap();
        let config = Config::load(Some(&path), &["trajectory.poly=3".to_string()]).unwrap();
        assert_eq!(config.trajectory.window, 7);
        assert_eq!(config.trajectory.poly, 3);

        let err = Config::load(Some(&path), &["trajectory.poly=7".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::load(None, &[]).is_ok());
    }
}
