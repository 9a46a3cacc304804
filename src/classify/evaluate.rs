//! Repeated stratified cross-validation and score comparison.

use std::collections::BTreeMap;

use ndarray::{ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::classify::model::{Classifier, ClassifierKind, Model};
use crate::error::{Error, Result};

/// Split sample indices into `folds` test folds, keeping class proportions.
///
/// Each class's indices are shuffled and dealt round-robin; the dealing
/// position carries over from one class to the next so fold sizes stay even.
pub fn stratified_folds(y: &[i64], folds: usize, rng: &mut StdRng) -> Result<Vec<Vec<usize>>> {
    if folds < 2 {
        return Err(Error::Config(format!("need at least 2 folds, got {folds}")));
    }
    if folds > y.len() {
        return Err(Error::InvalidInput(format!(
            "cannot split {} samples into {folds} folds",
            y.len()
        )));
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, label) in y.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }
    if let Some(smallest) = by_class.values().map(Vec::len).min() {
        if smallest < folds {
            warn!(smallest, folds, "least populated class has fewer members than folds");
        }
    }

    let mut out = vec![Vec::new(); folds];
    let mut next = 0;
    for members in by_class.values_mut() {
        members.shuffle(rng);
        for &i in members.iter() {
            out[next % folds].push(i);
            next += 1;
        }
    }
    for fold in &mut out {
        fold.sort_unstable();
    }
    Ok(out)
}

/// Mean per-class recall over the classes present in `y_true`.
pub fn balanced_accuracy(y_true: &[i64], y_pred: &[i64]) -> f64 {
    let mut per_class: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
    for (t, p) in y_true.iter().zip(y_pred) {
        let entry = per_class.entry(*t).or_default();
        entry.1 += 1;
        if t == p {
            entry.0 += 1;
        }
    }
    if per_class.is_empty() {
        return 0.0;
    }
    let total: f64 = per_class.values().map(|&(hit, n)| hit as f64 / n as f64).sum();
    total / per_class.len() as f64
}

/// Balanced accuracy of `kind` under repeated stratified k-fold, one mean
/// score per repeat.
pub fn crossval_scores(
    kind: ClassifierKind,
    x: ArrayView2<'_, f64>,
    y: &[i64],
    folds: usize,
    repeats: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    if x.nrows() != y.len() {
        return Err(Error::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    let mut seeds = StdRng::seed_from_u64(seed);
    let mut scores = Vec::with_capacity(repeats);

    for repeat in 0..repeats {
        let mut rng = StdRng::seed_from_u64(seeds.random::<u64>());
        let test_folds = stratified_folds(y, folds, &mut rng)?;
        let mut fold_scores = Vec::with_capacity(folds);

        for test in &test_folds {
            let mut in_test = vec![false; y.len()];
            for &i in test {
                in_test[i] = true;
            }
            let train: Vec<usize> = (0..y.len()).filter(|&i| !in_test[i]).collect();
            let y_train: Vec<i64> = train.iter().map(|&i| y[i]).collect();
            let y_test: Vec<i64> = test.iter().map(|&i| y[i]).collect();

            let mut model = Model::new(kind);
            model.fit(x.select(Axis(0), &train).view(), &y_train)?;
            let predicted = model.predict(x.select(Axis(0), test).view());
            fold_scores.push(balanced_accuracy(&y_test, &predicted));
        }

        let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!(classifier = %kind, repeat, score = mean, "cross-validation repeat");
        scores.push(mean);
    }
    Ok(scores)
}

/// Mean and population standard deviation.
pub fn mean_std(scores: &[f64]) -> (f64, f64) {
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// One-sided Mann–Whitney U test that `a` tends to be greater than `b`.
///
/// Uses the normal approximation with tie and continuity correction and
/// returns the p-value; 1.0 when either side is empty or all values tie.
pub fn mann_whitney_greater(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return 1.0;
    }

    let mut all: Vec<(f64, bool)> = a.iter().map(|&v| (v, true)).chain(b.iter().map(|&v| (v, false))).collect();
    all.sort_by(|p, q| p.0.total_cmp(&q.0));

    let n = all.len();
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && all[j + 1].0 == all[i].0 {
            j += 1;
        }
        // midrank of positions i..=j, ranks starting at 1
        let rank = (i + j) as f64 / 2.0 + 1.0;
        let t = (j - i + 1) as f64;
        tie_term += t * t * t - t;
        rank_sum_a += rank * all[i..=j].iter().filter(|(_, from_a)| *from_a).count() as f64;
        i = j + 1;
    }

    let (n1f, n2f, nf) = (n1 as f64, n2 as f64, n as f64);
    let u1 = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
    let mu = n1f * n2f / 2.0;
    let sigma = (n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)))).sqrt();
    if sigma.is_nan() || sigma <= 0.0 {
        return 1.0;
    }
    let z = (u1 - mu - 0.5) / sigma;
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

/// Whether `a` is significantly greater than `b` at level `alpha`.
pub fn significantly_greater(a: &[f64], b: &[f64], alpha: f64) -> bool {
    mann_whitney_greater(a, b) < alpha
}

/// Complementary error function, fractional error below 1.2e-7.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98 + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_folds_partition_and_stratify() {
        let y: Vec<i64> = [0; 10].into_iter().chain([1; 5]).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let folds = stratified_folds(&y, 5, &mut rng).unwrap();

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..15).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.len(), 3);
            assert_eq!(fold.iter().filter(|&&i| y[i] == 1).count(), 1);
        }
    }

    #[test]
    fn test_fold_count_checked() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(stratified_folds(&[0, 1, 0], 1, &mut rng).is_err());
        assert!(stratified_folds(&[0, 1, 0], 4, &mut rng).is_err());
    }

    #[test]
    fn test_balanced_accuracy() {
        // class 0: 3/4 right, class 1: 1/2 right
        let truth = [0, 0, 0, 0, 1, 1];
        let pred = [0, 0, 0, 1, 1, 0];
        assert_abs_diff_eq!(balanced_accuracy(&truth, &pred), 0.625, epsilon = 1e-12);
        // predicted-only classes do not count
        assert_abs_diff_eq!(balanced_accuracy(&[3, 3], &[3, 9]), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_crossval_on_separable_data() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if i < 10 { j as f64 * 0.01 + i as f64 * 0.001 } else { 5.0 + i as f64 * 0.001 });
        let y: Vec<i64> = (0..20).map(|i| if i < 10 { 0 } else { 1 }).collect();
        let scores = crossval_scores(ClassifierKind::Knn, x.view(), &y, 5, 3, 42).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (*s - 1.0).abs() < 1e-12));

        let again = crossval_scores(ClassifierKind::Knn, x.view(), &y, 5, 3, 42).unwrap();
        assert_eq!(scores, again);
    }

    #[test]
    fn test_mann_whitney() {
        let high = [0.91, 0.93, 0.95, 0.97, 0.99];
        let low = [0.51, 0.53, 0.55, 0.57, 0.59];
        // U = 25, mu = 12.5, sigma = sqrt(275 / 12)
        let expected_z: f64 = (25.0 - 12.5 - 0.5) / (275.0_f64 / 12.0).sqrt();
        assert_abs_diff_eq!(
            mann_whitney_greater(&high, &low),
            0.5 * erfc(expected_z / std::f64::consts::SQRT_2),
            epsilon = 1e-12
        );
        assert!(significantly_greater(&high, &low, 0.05));
        assert!(!significantly_greater(&low, &high, 0.05));
        assert_eq!(mann_whitney_greater(&[0.5, 0.5], &[0.5, 0.5]), 1.0);
        assert_eq!(mann_whitney_greater(&[], &low), 1.0);
    }

    #[test]
    fn test_erfc_reference_values() {
        assert_abs_diff_eq!(erfc(0.0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(erfc(1.0), 0.157_299_207, epsilon = 1e-6);
        assert_abs_diff_eq!(erfc(-1.0), 1.842_700_793, epsilon = 1e-6);
    }

    #[test]
    fn test_mean_std() {
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        let (m, s) = mean_std(&[1.0, 3.0]);
        assert_eq!((m, s), (2.0, 1.0));
    }
}
