//! Persisted tables.
//!
//! Every table is a newline-delimited JSON file holding one row object per
//! line. Stages read a whole table and write a whole table; nothing is
//! appended in place.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::DatasetConfig;
use crate::error::{Error, Result};
use crate::features::FeatureTable;

/// Locations of the tables of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub raw: PathBuf,
    pub interim: PathBuf,
    pub processed: PathBuf,
}

impl DatasetPaths {
    pub fn new(raw: impl Into<PathBuf>, interim: impl Into<PathBuf>, processed: impl Into<PathBuf>) -> Self {
        Self {
            raw: raw.into(),
            interim: interim.into(),
            processed: processed.into(),
        }
    }

    pub fn from_config(dataset: &DatasetConfig) -> Self {
        Self::new(&dataset.raw_dir, &dataset.interim_dir, &dataset.processed_dir)
    }

    /// Same layout with the interim directory moved to a subdirectory, used
    /// to keep the tracks of each batch input apart.
    pub fn with_interim_subdir(&self, name: &str) -> Self {
        Self {
            interim: self.interim.join(name),
            ..self.clone()
        }
    }

    /// Create the three directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.raw, &self.interim, &self.processed] {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }

    pub fn tracks(&self) -> PathBuf {
        self.interim.join("tracks.jsonl")
    }

    pub fn trajectories(&self) -> PathBuf {
        self.processed.join("trajectories.jsonl")
    }

    pub fn features(&self) -> PathBuf {
        self.processed.join("features.jsonl")
    }

    pub fn clusters(&self) -> PathBuf {
        self.processed.join("clusters.jsonl")
    }

    pub fn outliers(&self) -> PathBuf {
        self.processed.join("outliers.jsonl")
    }

    pub fn exit_groups(&self) -> PathBuf {
        self.processed.join("exit_groups.jsonl")
    }

    /// Trajectory rows of the most anomalous outliers, written by outlier exploration.
    pub fn top_outliers(&self) -> PathBuf {
        self.processed.join("top_outliers.jsonl")
    }

    /// Parameter sweep results.
    pub fn tuning(&self) -> PathBuf {
        self.processed.join("tuning.jsonl")
    }
}

/// Write `rows` to `path`, one JSON object per line, replacing any previous
/// content. Parent directories are created.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut out, row).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        out.write_all(b"\n").map_err(|e| Error::io(path, e))?;
    }
    out.flush().map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(rows.len())
}

/// Read every row of a table. A missing file is [`Error::MissingTable`];
/// blank lines are ignored.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(Error::MissingTable(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut rows = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    debug!(path = %path.display(), rows = rows.len(), "read table");
    Ok(rows)
}

pub fn table_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn write_features(path: &Path, table: &FeatureTable) -> Result<usize> {
    write_rows(path, &table.to_records())
}

pub fn read_features(path: &Path) -> Result<FeatureTable> {
    let records: Vec<Map<String, Value>> = read_rows(path)?;
    FeatureTable::from_records(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRecord;
    use crate::ingest::Detection;
    use ndarray::array;

    #[test]
    fn test_layout() {
        let paths = DatasetPaths::new("r", "i", "p");
        assert_eq!(paths.tracks(), PathBuf::from("i/tracks.jsonl"));
        assert_eq!(paths.exit_groups(), PathBuf::from("p/exit_groups.jsonl"));
        let nested = paths.with_interim_subdir("cam1");
        assert_eq!(nested.tracks(), PathBuf::from("i/cam1/tracks.jsonl"));
        assert_eq!(nested.processed, paths.processed);
    }

    #[test]
    fn test_rows_survive_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/tracks.jsonl");
        let rows = vec![
            Detection {
                frame: 3,
                track_id: 7,
                cls: 2,
                conf: Some(0.8),
                cx: 1.5,
                cy: 2.5,
                w: 4.0,
                h: 3.0,
            };
            3
        ];
        assert_eq!(write_rows(&path, &rows).unwrap(), 3);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("{\"frame\":3,\"track_id\":7"));
        let back: Vec<Detection> = read_rows(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.jsonl");
        assert!(!table_exists(&path));
        let err = read_rows::<ClusterRecord>(&path).unwrap_err();
        assert!(matches!(err, Error::MissingTable(p) if p == path));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.jsonl");
        fs::write(&path, "{\"track_id\":1,\"cluster\":0}\n\n{\"track_id\":2\n").unwrap();
        assert!(matches!(read_rows::<ClusterRecord>(&path), Err(Error::Json { .. })));
    }

    #[test]
    fn test_feature_table_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.jsonl");
        let table = FeatureTable::new(vec![4, 9], array![[0.5f32, 1.0], [2.0, -3.0]]).unwrap();
        write_features(&path, &table).unwrap();

        let first = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert_eq!(first, "{\"track_id\":4,\"0\":0.5,\"1\":1.0}");
        let back = read_features(&path).unwrap();
        assert_eq!(back.track_ids(), &[4, 9]);
        assert_eq!(back.matrix(), table.matrix());
    }
}
