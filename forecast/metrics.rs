//! # Submission Scoring Metrics
//!
//! Pure functions over `ndarray` views. None of them return NaN: inputs for which a
//! score is undefined are reported as a `MetricError`.
//!
//! - `a_value` / `mauc`: the rank-sum AUC approximation of Hand & Till (2001),
//!   equations 3 and 7.
//! - `calc_bca`: balanced classification accuracy over class pairs.
//! - `calculate_wes`: error weighted by inverse confidence-interval width.
//! - `calculate_cpa`: distance of 50% interval coverage from its nominal level.

use itertools::Itertools;
use ndarray::{ArrayView1, ArrayView2, Zip};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error(
        "Class pair ({zero_label}, {one_label}) is degenerate: class {missing_label} has no instances."
    )]
    DegenerateClassPair {
        zero_label: usize,
        one_label: usize,
        missing_label: usize,
    },
    #[error("Interval {index} has zero width (lower == upper == {bound}).")]
    ZeroWidthInterval { index: usize, bound: f64 },
    #[error("Input '{name}' has {found} entries, but {expected} were expected.")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Cannot compute {0} on empty input.")]
    EmptyInput(&'static str),
    #[error("Class label {label} has no column in a probability matrix with {num_columns} columns.")]
    LabelOutOfRange { label: usize, num_columns: usize },
    #[error("At least 2 classes are needed, found {0}.")]
    TooFewClasses(usize),
}

fn check_len(name: &'static str, expected: usize, found: usize) -> Result<(), MetricError> {
    if expected == found {
        Ok(())
    } else {
        Err(MetricError::LengthMismatch {
            name,
            expected,
            found,
        })
    }
}

/// Approximates the AUC separating `zero_label` from `one_label` (Hand & Till 2001, eq. 3).
///
/// Instances whose true label is neither class are ignored. The remaining instances are
/// ranked by the probability they assign to `zero_label`, ascending; the sort is stable,
/// so tied instances keep their input order. The result depends on which class plays
/// the role of `zero_label`.
///
/// # Arguments
/// * `labels`: True class of each instance, in `0..num_classes`.
/// * `probabilities`: Shape `[n_instances, num_classes]`; column `c` holds the
///   probability of class `c`.
pub fn a_value(
    labels: ArrayView1<'_, usize>,
    probabilities: ArrayView2<'_, f64>,
    zero_label: usize,
    one_label: usize,
) -> Result<f64, MetricError> {
    check_len("probabilities", labels.len(), probabilities.nrows())?;
    if zero_label >= probabilities.ncols() {
        return Err(MetricError::LabelOutOfRange {
            label: zero_label,
            num_columns: probabilities.ncols(),
        });
    }

    let mut ranked: Vec<(usize, f64)> = labels
        .iter()
        .zip(probabilities.column(zero_label))
        .filter(|&(&label, _)| label == zero_label || label == one_label)
        .map(|(&label, &p)| (label, p))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut n0 = 0usize;
    let mut n1 = 0usize;
    let mut sum_ranks = 0usize;
    for (idx, &(label, _)) in ranked.iter().enumerate() {
        if label == zero_label {
            n0 += 1;
            sum_ranks += idx + 1;
        } else {
            n1 += 1;
        }
    }

    let missing_label = match (n0, n1) {
        (0, _) => Some(zero_label),
        (_, 0) => Some(one_label),
        _ => None,
    };
    if let Some(missing_label) = missing_label {
        return Err(MetricError::DegenerateClassPair {
            zero_label,
            one_label,
            missing_label,
        });
    }

    let (n0, n1) = (n0 as f64, n1 as f64);
    Ok((sum_ranks as f64 - n0 * (n0 + 1.0) / 2.0) / (n0 * n1))
}

/// Multi-class AUC (Hand & Till 2001, eq. 7).
///
/// Sums `a_value` over every ordered pair of distinct classes, so each unordered pair
/// contributes twice, and divides by `k * (k - 1)`.
///
/// When `num_classes` is `None` it is inferred as the number of probability columns
/// minus one. This reproduces the historical MAUCpy convention and drops the last
/// class; pass the class count explicitly to score all classes.
pub fn mauc(
    labels: ArrayView1<'_, usize>,
    probabilities: ArrayView2<'_, f64>,
    num_classes: Option<usize>,
) -> Result<f64, MetricError> {
    let k = match num_classes {
        Some(k) => k,
        None => {
            if probabilities.nrows() == 0 {
                return Err(MetricError::EmptyInput("MAUC"));
            }
            probabilities.ncols().saturating_sub(1)
        }
    };
    if k < 2 {
        return Err(MetricError::TooFewClasses(k));
    }

    let mut total = 0.0;
    for pair in (0..k).permutations(2) {
        total += a_value(labels, probabilities, pair[0], pair[1])?;
    }
    Ok(total / (k * (k - 1)) as f64)
}

/// Balanced classification accuracy.
///
/// For every pair `c0 < c1`, with `c0` as the positive and `c1` as the negative class,
/// computes `(sensitivity + specificity) / 2` and averages over pairs. A sensitivity
/// or specificity with an empty denominator counts as 0.5.
pub fn calc_bca(
    estimated: ArrayView1<'_, usize>,
    truth: ArrayView1<'_, usize>,
    num_classes: usize,
) -> Result<f64, MetricError> {
    check_len("truth", estimated.len(), truth.len())?;
    if num_classes < 2 {
        return Err(MetricError::TooFewClasses(num_classes));
    }

    let count = |est: usize, tru: usize| {
        Zip::from(&estimated)
            .and(&truth)
            .fold(0usize, |acc, &e, &t| acc + usize::from(e == est && t == tru))
    };
    let ratio_or_half = |num: usize, den: usize| {
        if den == 0 {
            0.5
        } else {
            num as f64 / den as f64
        }
    };

    let pair_scores: Vec<f64> = (0..num_classes)
        .tuple_combinations()
        .map(|(c0, c1)| {
            let tp = count(c0, c0);
            let tn = count(c1, c1);
            let fp = count(c1, c0);
            let fn_count = count(c0, c1);
            let sensitivity = ratio_or_half(tp, tp + fn_count);
            let specificity = ratio_or_half(tn, tn + fp);
            0.5 * (sensitivity + specificity)
        })
        .collect();

    Ok(pair_scores.iter().sum::<f64>() / pair_scores.len() as f64)
}

fn check_interval_inputs(
    estimates: ArrayView1<'_, f64>,
    lowers: ArrayView1<'_, f64>,
    uppers: ArrayView1<'_, f64>,
    trues: ArrayView1<'_, f64>,
    metric: &'static str,
) -> Result<(), MetricError> {
    let n = estimates.len();
    check_len("lowers", n, lowers.len())?;
    check_len("uppers", n, uppers.len())?;
    check_len("trues", n, trues.len())?;
    if n == 0 {
        return Err(MetricError::EmptyInput(metric));
    }
    Ok(())
}

/// Weighted error score: `sum(w * |estimate - true|) / sum(w)` with `w = 1 / (upper - lower)`,
/// so confident (narrow) forecasts carry more weight.
pub fn calculate_wes(
    estimates: ArrayView1<'_, f64>,
    lowers: ArrayView1<'_, f64>,
    uppers: ArrayView1<'_, f64>,
    trues: ArrayView1<'_, f64>,
) -> Result<f64, MetricError> {
    check_interval_inputs(estimates, lowers, uppers, trues, "WES")?;

    let mut weighted_error = 0.0;
    let mut total_weight = 0.0;
    for (index, (((&est, &lo), &up), &tru)) in estimates
        .iter()
        .zip(lowers)
        .zip(uppers)
        .zip(trues)
        .enumerate()
    {
        let width = up - lo;
        if width == 0.0 {
            return Err(MetricError::ZeroWidthInterval { index, bound: lo });
        }
        let weight = 1.0 / width;
        weighted_error += weight * (est - tru).abs();
        total_weight += weight;
    }
    Ok(weighted_error / total_weight)
}

/// Coverage probability accuracy of nominal 50% intervals: `|coverage - 0.5|`.
///
/// A true value counts as covered only when it lies strictly inside its interval.
pub fn calculate_cpa(
    estimates: ArrayView1<'_, f64>,
    lowers: ArrayView1<'_, f64>,
    uppers: ArrayView1<'_, f64>,
    trues: ArrayView1<'_, f64>,
) -> Result<f64, MetricError> {
    check_interval_inputs(estimates, lowers, uppers, trues, "CPA")?;

    let covered = Zip::from(&lowers)
        .and(&uppers)
        .and(&trues)
        .fold(0usize, |acc, &lo, &up, &tru| {
            acc + usize::from(lo < tru && up > tru)
        });
    let coverage = covered as f64 / trues.len() as f64;
    Ok((coverage - 0.5).abs())
}

/// Mean absolute error, reported next to WES and CPA on the leaderboard.
pub fn mean_absolute_error(
    estimates: ArrayView1<'_, f64>,
    trues: ArrayView1<'_, f64>,
) -> Result<f64, MetricError> {
    check_len("trues", estimates.len(), trues.len())?;
    if estimates.is_empty() {
        return Err(MetricError::EmptyInput("MAE"));
    }
    let total = Zip::from(&estimates)
        .and(&trues)
        .fold(0.0, |acc, &est, &tru| acc + (est - tru).abs());
    Ok(total / estimates.len() as f64)
}
