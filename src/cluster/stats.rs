use serde::{Deserialize, Serialize};

use crate::cluster::optics::NOISE;

/// Summary counts of a labelling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub n_total: usize,
    pub n_outliers: usize,
    /// Share of outliers in percent; 0 for an empty labelling.
    pub pct_outliers: f64,
    /// Largest non-negative label plus one, or 0 when every point is noise.
    pub n_clusters: usize,
}

impl ClusterStats {
    pub fn from_labels(labels: &[i64]) -> Self {
        let n_total = labels.len();
        let n_outliers = labels.iter().filter(|&&l| l == NOISE).count();
        let pct_outliers = if n_total == 0 {
            0.0
        } else {
            100.0 * n_outliers as f64 / n_total as f64
        };
        let n_clusters = labels
            .iter()
            .copied()
            .filter(|&l| l >= 0)
            .max()
            .map_or(0, |m| m as usize + 1);
        Self {
            n_total,
            n_outliers,
            pct_outliers,
            n_clusters,
        }
    }
}

/// Identifiers of the points labelled as noise, in input order.
pub fn outlier_ids(labels: &[i64], ids: &[i64]) -> Vec<i64> {
    labels
        .iter()
        .zip(ids)
        .filter(|(l, _)| **l == NOISE)
        .map(|(_, id)| *id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let stats = ClusterStats::from_labels(&[0, 0, 1, -1, -1]);
        assert_eq!(stats.n_total, 5);
        assert_eq!(stats.n_outliers, 2);
        assert!((stats.pct_outliers - 40.0).abs() < 1e-9);
        assert_eq!(stats.n_clusters, 2);
    }

    #[test]
    fn test_empty_and_all_noise() {
        assert_eq!(ClusterStats::from_labels(&[]), ClusterStats::default());
        let noise = ClusterStats::from_labels(&[-1, -1, -1]);
        assert_eq!(noise.n_clusters, 0);
        assert_eq!(noise.pct_outliers, 100.0);
    }

    #[test]
    fn test_outlier_ids() {
        assert_eq!(outlier_ids(&[0, -1, 2, -1], &[10, 11, 12, 13]), vec![11, 13]);
    }
}
