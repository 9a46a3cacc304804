//! Descriptive summary of an outlier report, for manual inspection.

use std::collections::{HashMap, HashSet};

use crate::cluster::engine::ClusterRecord;
use crate::cluster::outliers::OutlierRecord;
use crate::trajectory::TrajectoryRow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(r) => Some(Self {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }
}

/// Reachability distribution and spatial extent of the outliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierSpread {
    pub reachability: Range,
    pub mean_reachability: f64,
    pub median_reachability: f64,
    pub x_entry: Range,
    pub y_entry: Range,
    pub x_exit: Range,
    pub y_exit: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopOutlier {
    pub record: OutlierRecord,
    /// Number of trajectory samples of the track.
    pub duration: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierSummary {
    pub n_total: usize,
    pub n_clustered: usize,
    pub n_outliers: usize,
    /// `None` when there are no outliers.
    pub spread: Option<OutlierSpread>,
    pub top: Vec<TopOutlier>,
}

impl OutlierSummary {
    /// Summarize a report that is already sorted most anomalous first.
    pub fn new(
        outliers: &[OutlierRecord],
        clusters: &[ClusterRecord],
        trajectories: &[TrajectoryRow],
        top_n: usize,
    ) -> Self {
        let mut durations: HashMap<i64, usize> = HashMap::new();
        for row in trajectories {
            *durations.entry(row.track_id).or_default() += 1;
        }

        let top = outliers
            .iter()
            .take(top_n)
            .map(|o| TopOutlier {
                record: *o,
                duration: durations.get(&o.track_id).copied().unwrap_or(0),
            })
            .collect();

        Self {
            n_total: clusters.len(),
            n_clustered: clusters.iter().filter(|c| c.cluster >= 0).count(),
            n_outliers: outliers.len(),
            spread: spread(outliers),
            top,
        }
    }

    pub fn pct_of_total(&self, count: usize) -> f64 {
        if self.n_total == 0 {
            0.0
        } else {
            100.0 * count as f64 / self.n_total as f64
        }
    }
}

fn spread(outliers: &[OutlierRecord]) -> Option<OutlierSpread> {
    let reachability = Range::of(outliers.iter().map(|o| o.reachability))?;
    let mut sorted: Vec<f64> = outliers.iter().map(|o| o.reachability).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    };

    Some(OutlierSpread {
        reachability,
        mean_reachability: sorted.iter().sum::<f64>() / n as f64,
        median_reachability: median,
        x_entry: Range::of(outliers.iter().map(|o| o.x_entry))?,
        y_entry: Range::of(outliers.iter().map(|o| o.y_entry))?,
        x_exit: Range::of(outliers.iter().map(|o| o.x_exit))?,
        y_exit: Range::of(outliers.iter().map(|o| o.y_exit))?,
    })
}

/// Trajectory rows of the first `top_n` outliers of the report.
pub fn top_outlier_rows(outliers: &[OutlierRecord], trajectories: &[TrajectoryRow], top_n: usize) -> Vec<TrajectoryRow> {
    let ids: HashSet<i64> = outliers.iter().take(top_n).map(|o| o.track_id).collect();
    trajectories
        .iter()
        .filter(|r| ids.contains(&r.track_id))
        .copied()
        .collect()
}
