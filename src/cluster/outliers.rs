//! Reachability report for tracks the density clustering left unassigned.

use serde::{Deserialize, Serialize};

use crate::cluster::endpoints::EntryExitPoints;
use crate::cluster::optics::NOISE;

/// One row of the `outliers` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierRecord {
    pub track_id: i64,
    pub x_entry: f64,
    pub y_entry: f64,
    pub x_exit: f64,
    pub y_exit: f64,
    /// Cleaned reachability: always finite.
    pub reachability: f64,
    /// Whether the raw reachability was infinite.
    pub is_unreachable: bool,
}

/// Replace infinite reachabilities so they can be stored and plotted.
///
/// Infinite values become twice the largest finite value in `raw`, or 1.0
/// when `raw` has no finite value. Returns the cleaned values and, per value,
/// whether it was infinite.
pub fn clean_reachability(raw: &[f64]) -> (Vec<f64>, Vec<bool>) {
    let max_finite = raw
        .iter()
        .copied()
        .filter(|r| r.is_finite())
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |m| m.max(r))));
    let substitute = max_finite.map_or(1.0, |m| 2.0 * m);

    raw.iter()
        .map(|&r| {
            if r.is_infinite() {
                (substitute, true)
            } else {
                (r, false)
            }
        })
        .unzip()
}

/// Build the outlier report: one record per point labelled as noise, most
/// anomalous (highest cleaned reachability) first.
///
/// `reachability` and `labels` are indexed like the rows of `points`.
pub fn analyze_outliers(points: &EntryExitPoints, labels: &[i64], reachability: &[f64]) -> Vec<OutlierRecord> {
    let idx: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l == NOISE)
        .map(|(i, _)| i)
        .collect();
    let raw: Vec<f64> = idx.iter().map(|&i| reachability[i]).collect();
    let (cleaned, unreachable) = clean_reachability(&raw);

    let mut records: Vec<OutlierRecord> = idx
        .iter()
        .zip(cleaned.iter().zip(unreachable.iter()))
        .map(|(&i, (&reach, &is_unreachable))| {
            let (x_entry, y_entry) = points.entry(i);
            let (x_exit, y_exit) = points.exit(i);
            OutlierRecord {
                track_id: points.track_ids()[i],
                x_entry,
                y_entry,
                x_exit,
                y_exit,
                reachability: reach,
                is_unreachable,
            }
        })
        .collect();

    records.sort_by(|a, b| b.reachability.total_cmp(&a.reachability));
    records
}
