//! Entry/exit geometry of tracks, the input space of the clustering engine.

use ndarray::{Array2, ArrayView2, s};

use crate::error::{Error, Result};
use crate::trajectory::Trajectory;

/// One row per track: `[x_entry, y_entry, x_exit, y_exit]`.
///
/// Entry and exit are the literal first and last smoothed positions of the
/// track, unlike the feature vectorizer's reference points.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryExitPoints {
    track_ids: Vec<i64>,
    matrix: Array2<f64>,
}

impl EntryExitPoints {
    /// Collect endpoints in the order given, skipping empty trajectories.
    pub fn from_trajectories(trajectories: &[Trajectory]) -> Self {
        let mut track_ids = Vec::with_capacity(trajectories.len());
        let mut rows: Vec<[f64; 4]> = Vec::with_capacity(trajectories.len());
        for traj in trajectories {
            let (Some((x0, y0)), Some((x1, y1))) = (traj.first_position(), traj.last_position()) else {
                continue;
            };
            rows.push([x0, y0, x1, y1]);
            track_ids.push(traj.track_id);
        }
        let matrix = Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j]);
        Self { track_ids, matrix }
    }

    /// `matrix` must have four columns and one row per track id.
    pub fn from_parts(track_ids: Vec<i64>, matrix: Array2<f64>) -> Result<Self> {
        if matrix.ncols() != 4 {
            return Err(Error::InvalidInput(format!(
                "entry/exit matrix needs 4 columns, got {}",
                matrix.ncols()
            )));
        }
        if track_ids.len() != matrix.nrows() {
            return Err(Error::InvalidInput(format!(
                "{} track ids for {} entry/exit rows",
                track_ids.len(),
                matrix.nrows()
            )));
        }
        Ok(Self { track_ids, matrix })
    }

    pub fn track_ids(&self) -> &[i64] {
        &self.track_ids
    }

    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    /// The `[x_exit, y_exit]` columns.
    pub fn exit_points(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![.., 2..4])
    }

    #[inline]
    pub fn entry(&self, i: usize) -> (f64, f64) {
        (self.matrix[[i, 0]], self.matrix[[i, 1]])
    }

    #[inline]
    pub fn exit(&self, i: usize) -> (f64, f64) {
        (self.matrix[[i, 2]], self.matrix[[i, 3]])
    }

    pub fn len(&self) -> usize {
        self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }
}
