//! Fixed-length descriptors of trajectories.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::features::spec::{FeatureSpec, ReferencePoint};
use crate::trajectory::Trajectory;

/// Reduce `traj` to the vector described by `spec`.
///
/// Components are single precision, matching the stored feature table.
/// Empty trajectories have no reference points and are rejected.
pub fn vectorize(traj: &Trajectory, spec: &FeatureSpec) -> Result<Array1<f32>> {
    let n = traj.len();
    if n == 0 {
        return Err(Error::InvalidInput(format!(
            "track {} has no samples to vectorize",
            traj.track_id
        )));
    }

    let entry = ReferencePoint::Entry.index(n);
    let mut fv: Vec<f32> = Vec::with_capacity(spec.len());
    let mut push = |(a, b): (f64, f64)| {
        fv.push(a as f32);
        fv.push(b as f32);
    };

    if spec.entry_position {
        push(traj.position(entry));
    }
    if spec.entry_velocity {
        push(traj.velocity(entry));
    }
    if spec.entry_acceleration {
        push(traj.acceleration(entry));
    }
    if spec.start_position {
        push(traj.position(ReferencePoint::Start.index(n)));
    }
    if spec.mid_position {
        push(traj.position(ReferencePoint::Mid.index(n)));
    }

    Ok(Array1::from_vec(fv))
}

/// Feature vectors of many tracks, one row per track.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    track_ids: Vec<i64>,
    matrix: Array2<f32>,
}

impl FeatureTable {
    /// Vectorize every non-empty trajectory, preserving input order.
    pub fn from_trajectories(trajectories: &[Trajectory], spec: &FeatureSpec) -> Result<Self> {
        let width = spec.len();
        let mut track_ids = Vec::with_capacity(trajectories.len());
        let mut data = Vec::with_capacity(trajectories.len() * width);

        for traj in trajectories.iter().filter(|t| !t.is_empty()) {
            data.extend(vectorize(traj, spec)?.iter().copied());
            track_ids.push(traj.track_id);
        }

        let matrix = Array2::from_shape_vec((track_ids.len(), width), data)
            .map_err(|e| Error::InvalidInput(format!("feature matrix shape: {e}")))?;
        Ok(Self { track_ids, matrix })
    }

    pub fn new(track_ids: Vec<i64>, matrix: Array2<f32>) -> Result<Self> {
        if track_ids.len() != matrix.nrows() {
            return Err(Error::InvalidInput(format!(
                "{} track ids for {} feature rows",
                track_ids.len(),
                matrix.nrows()
            )));
        }
        Ok(Self { track_ids, matrix })
    }

    pub fn track_ids(&self) -> &[i64] {
        &self.track_ids
    }

    pub fn matrix(&self) -> ArrayView2<'_, f32> {
        self.matrix.view()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f32> {
        self.matrix.row(i)
    }

    /// Features widened to double precision for model fitting.
    pub fn to_f64(&self) -> Array2<f64> {
        self.matrix.mapv(f64::from)
    }

    pub fn len(&self) -> usize {
        self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }

    pub fn width(&self) -> usize {
        self.matrix.ncols()
    }

    /// Rows for the `features` table: `track_id` followed by columns "0".."D-1".
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.track_ids
            .iter()
            .zip(self.matrix.rows())
            .map(|(id, row)| {
                let mut record = Map::new();
                record.insert("track_id".into(), Value::from(*id));
                for (j, v) in row.iter().enumerate() {
                    record.insert(j.to_string(), Value::from(*v));
                }
                record
            })
            .collect()
    }

    /// Rebuild from `features` table rows. Every row must carry the same columns.
    pub fn from_records(records: &[Map<String, Value>]) -> Result<Self> {
        let width = records.first().map_or(0, |r| r.len().saturating_sub(1));
        let mut track_ids = Vec::with_capacity(records.len());
        let mut data = Vec::with_capacity(records.len() * width);

        for (i, record) in records.iter().enumerate() {
            let id = record
                .get("track_id")
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::InvalidInput(format!("feature row {i} has no track_id")))?;
            if record.len() != width + 1 {
                return Err(Error::InvalidInput(format!(
                    "feature row {i} has {} columns, expected {}",
                    record.len() - 1,
                    width
                )));
            }
            for j in 0..width {
                let v = record
                    .get(&j.to_string())
                    .and_then(Value::as_f64)
                    .ok_or_else(|| Error::InvalidInput(format!("feature row {i} lacks column {j}")))?;
                data.push(v as f32);
            }
            track_ids.push(id);
        }

        let matrix = Array2::from_shape_vec((track_ids.len(), width), data)
            .map_err(|e| Error::InvalidInput(format!("feature matrix shape: {e}")))?;
        Ok(Self { track_ids, matrix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory(track_id: i64, n: usize) -> Trajectory {
        let seq = |scale: f64| (0..n).map(|i| scale * i as f64).collect::<Vec<_>>();
        Trajectory {
            track_id,
            frame: (0..n as u32).collect(),
            x: seq(1.0),
            y: seq(10.0),
            vx: seq(100.0),
            vy: seq(1000.0),
            ax: seq(-1.0),
            ay: seq(-10.0),
        }
    }

    #[test]
    fn test_field_order() {
        let spec = FeatureSpec::parse("ReVeAeRsRm").unwrap();
        let fv = vectorize(&trajectory(1, 5), &spec).unwrap();
        let expected = [4.0, 40.0, 400.0, 4000.0, -4.0, -40.0, 0.0, 0.0, 2.0, 20.0];
        assert_eq!(fv.to_vec(), expected.to_vec());
    }

    #[test]
    fn test_entry_is_last_sample() {
        let fv = vectorize(&trajectory(1, 3), &FeatureSpec::RE).unwrap();
        assert_eq!(fv.to_vec(), vec![2.0, 20.0]);
    }

    #[test]
    fn test_single_sample_points_coincide() {
        let spec = FeatureSpec::parse("ReRsRm").unwrap();
        let fv = vectorize(&trajectory(1, 1), &spec).unwrap();
        assert_eq!(fv.to_vec(), vec![0.0; 6]);
    }

    #[test]
    fn test_empty_trajectory_rejected() {
        assert!(vectorize(&trajectory(1, 0), &FeatureSpec::RE).is_err());
    }

    #[test]
    fn test_constant_length_per_preset() {
        let trajs: Vec<Trajectory> = (1..8).map(|n| trajectory(n as i64, n)).collect();
        for name in ["Re", "ReVe", "ReVeRs", "AeRm"] {
            let spec = FeatureSpec::parse(name).unwrap();
            let table = FeatureTable::from_trajectories(&trajs, &spec).unwrap();
            assert_eq!(table.width(), spec.len());
            assert_eq!(table.len(), trajs.len());
        }
    }

    #[test]
    fn test_table_skips_empty_and_keeps_width() {
        let table = FeatureTable::from_trajectories(&[trajectory(3, 0)], &FeatureSpec::RE_VE_RS).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.width(), 6);
    }

    #[test]
    fn test_records_round_trip() {
        let trajs = vec![trajectory(4, 3), trajectory(9, 6)];
        let table = FeatureTable::from_trajectories(&trajs, &FeatureSpec::RE_VE).unwrap();
        let records = table.to_records();
        assert_eq!(records[0].keys().cloned().collect::<Vec<_>>(), ["track_id", "0", "1", "2", "3"]);
        assert_eq!(FeatureTable::from_records(&records).unwrap(), table);
    }
}
