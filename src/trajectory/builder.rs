//! Per-track smoothing and differentiation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ingest::{Detection, UNTRACKED};
use crate::trajectory::gradient::time_derivative;
use crate::trajectory::savgol::SavitzkyGolay;

/// Smoothed position, velocity and acceleration of one track.
///
/// All arrays have one entry per retained detection, in ascending frame order.
/// Velocity and acceleration are per second (scaled by the frame rate) and can
/// be large at the two ends of short or jagged tracks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    pub track_id: i64,
    pub frame: Vec<u32>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub ax: Vec<f64>,
    pub ay: Vec<f64>,
}

/// One row of the `trajectories` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub track_id: i64,
    pub frame: u32,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Smoothed position at sample `idx`.
    #[inline]
    pub fn position(&self, idx: usize) -> (f64, f64) {
        (self.x[idx], self.y[idx])
    }

    #[inline]
    pub fn velocity(&self, idx: usize) -> (f64, f64) {
        (self.vx[idx], self.vy[idx])
    }

    #[inline]
    pub fn acceleration(&self, idx: usize) -> (f64, f64) {
        (self.ax[idx], self.ay[idx])
    }

    /// First observed (smoothed) position.
    pub fn first_position(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then(|| self.position(0))
    }

    /// Last observed (smoothed) position.
    pub fn last_position(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then(|| self.position(self.len() - 1))
    }

    /// Flatten into table rows.
    pub fn rows(&self) -> impl Iterator<Item = TrajectoryRow> + '_ {
        (0..self.len()).map(move |i| TrajectoryRow {
            track_id: self.track_id,
            frame: self.frame[i],
            x: self.x[i],
            y: self.y[i],
            vx: self.vx[i],
            vy: self.vy[i],
            ax: self.ax[i],
            ay: self.ay[i],
        })
    }

    fn push(&mut self, row: &TrajectoryRow) {
        self.frame.push(row.frame);
        self.x.push(row.x);
        self.y.push(row.y);
        self.vx.push(row.vx);
        self.vy.push(row.vy);
        self.ax.push(row.ax);
        self.ay.push(row.ay);
    }
}

/// Regroup table rows into trajectories, ascending by track id, each sorted by frame.
pub fn group_rows(rows: &[TrajectoryRow]) -> Vec<Trajectory> {
    let mut sorted: Vec<&TrajectoryRow> = rows.iter().collect();
    sorted.sort_by_key(|r| r.frame);

    let mut grouped: BTreeMap<i64, Trajectory> = BTreeMap::new();
    for row in sorted {
        grouped
            .entry(row.track_id)
            .or_insert_with(|| Trajectory {
                track_id: row.track_id,
                ..Trajectory::default()
            })
            .push(row);
    }
    grouped.into_values().collect()
}

/// Builds one `Trajectory` per distinct track id.
#[derive(Debug, Clone)]
pub struct TrajectoryBuilder {
    fps: f64,
    smoother: SavitzkyGolay,
}

impl TrajectoryBuilder {
    /// `window` must be odd and larger than `poly`; `fps` must be positive.
    pub fn new(fps: f64, window: usize, poly: usize) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(Error::Config(format!("fps must be positive, got {fps}")));
        }
        Ok(Self {
            fps,
            smoother: SavitzkyGolay::new(window, poly)?,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn build(&self, detections: &[Detection]) -> Vec<Trajectory> {
        // Stable: duplicate frames keep their input order.
        let mut sorted: Vec<&Detection> = detections.iter().collect();
        sorted.sort_by_key(|d| d.frame);

        let mut grouped: BTreeMap<i64, Vec<&Detection>> = BTreeMap::new();
        for det in sorted {
            grouped.entry(det.track_id).or_default().push(det);
        }

        if let Some(untracked) = grouped.get(&UNTRACKED) {
            warn!(
                rows = untracked.len(),
                "untracked detections (track_id -1) are grouped into a single trajectory"
            );
        }

        let trajectories: Vec<Trajectory> = grouped
            .into_iter()
            .map(|(track_id, dets)| self.build_track(track_id, &dets))
            .collect();

        let short = trajectories
            .iter()
            .filter(|t| t.len() < self.smoother.window())
            .count();
        debug!(
            tracks = trajectories.len(),
            unsmoothed = short,
            window = self.smoother.window(),
            "built trajectories"
        );
        trajectories
    }

    fn build_track(&self, track_id: i64, dets: &[&Detection]) -> Trajectory {
        let cx: Vec<f64> = dets.iter().map(|d| d.cx).collect();
        let cy: Vec<f64> = dets.iter().map(|d| d.cy).collect();

        let x = self.smoother.smooth(&cx);
        let y = self.smoother.smooth(&cy);
        let vx = time_derivative(&x, self.fps);
        let vy = time_derivative(&y, self.fps);
        let ax = time_derivative(&vx, self.fps);
        let ay = time_derivative(&vy, self.fps);

        Trajectory {
            track_id,
            frame: dets.iter().map(|d| d.frame).collect(),
            x,
            y,
            vx,
            vy,
            ax,
            ay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn det(frame: u32, track_id: i64, cx: f64, cy: f64) -> Detection {
        Detection {
            frame,
            track_id,
            cls: 2,
            conf: Some(0.9),
            cx,
            cy,
            w: 1.0,
            h: 1.0,
        }
    }

    #[test]
    fn test_short_track_is_not_smoothed() {
        let dets: Vec<Detection> = [0.1, 0.4, 0.2, 0.9, 0.5]
            .iter()
            .enumerate()
            .map(|(i, &v)| det(i as u32, 1, v, 1.0 - v))
            .collect();
        let builder = TrajectoryBuilder::new(30.0, 9, 2).unwrap();
        let trajs = builder.build(&dets);

        assert_eq!(trajs.len(), 1);
        assert_eq!(trajs[0].x, vec![0.1, 0.4, 0.2, 0.9, 0.5]);
        assert_eq!(trajs[0].y, dets.iter().map(|d| d.cy).collect::<Vec<_>>());
    }

    #[test]
    fn test_tracks_sorted_by_id_and_frame() {
        let dets = vec![
            det(3, 7, 3.0, 0.0),
            det(1, 2, 1.0, 0.0),
            det(0, 7, 0.0, 0.0),
            det(0, 2, 0.0, 0.0),
            det(2, 7, 2.0, 0.0),
        ];
        let trajs = TrajectoryBuilder::new(10.0, 9, 2).unwrap().build(&dets);
        assert_eq!(trajs.iter().map(|t| t.track_id).collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(trajs[1].frame, vec![0, 2, 3]);
        assert_eq!(trajs[1].x, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_constant_velocity_track() {
        let dets: Vec<Detection> = (0..20).map(|i| det(i, 5, 2.0 * i as f64, 1.0)).collect();
        let trajs = TrajectoryBuilder::new(25.0, 9, 2).unwrap().build(&dets);
        let t = &trajs[0];
        assert_eq!(t.len(), 20);
        for i in 0..t.len() {
            assert_abs_diff_eq!(t.x[i], 2.0 * i as f64, epsilon = 1e-9);
            assert_abs_diff_eq!(t.vx[i], 50.0, epsilon = 1e-7);
            assert_abs_diff_eq!(t.vy[i], 0.0, epsilon = 1e-7);
            assert_abs_diff_eq!(t.ax[i], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_empty_input() {
        let builder = TrajectoryBuilder::new(30.0, 9, 2).unwrap();
        assert!(builder.build(&[]).is_empty());
    }

    #[test]
    fn test_duplicate_frames_are_kept() {
        let dets = vec![det(0, 1, 0.0, 0.0), det(0, 1, 1.0, 0.0), det(1, 1, 2.0, 0.0)];
        let trajs = TrajectoryBuilder::new(30.0, 9, 2).unwrap().build(&dets);
        assert_eq!(trajs[0].frame, vec![0, 0, 1]);
    }

    #[test]
    fn test_single_sample_track() {
        let trajs = TrajectoryBuilder::new(30.0, 9, 2)
            .unwrap()
            .build(&[det(4, 1, 0.5, 0.5)]);
        assert_eq!(trajs[0].vx, vec![0.0]);
        assert_eq!(trajs[0].ay, vec![0.0]);
    }

    #[test]
    fn test_rows_round_trip_through_grouping() {
        let dets: Vec<Detection> = (0..12)
            .flat_map(|i| [det(i, 1, i as f64, 0.0), det(i, 3, 0.0, i as f64)])
            .collect();
        let trajs = TrajectoryBuilder::new(30.0, 9, 2).unwrap().build(&dets);
        let rows: Vec<TrajectoryRow> = trajs.iter().flat_map(|t| t.rows()).collect();
        assert_eq!(group_rows(&rows), trajs);
    }

    #[test]
    fn test_rejects_non_positive_fps() {
        assert!(TrajectoryBuilder::new(0.0, 9, 2).is_err());
    }
}
