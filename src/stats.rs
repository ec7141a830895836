//! Robust statistics and interpolation helpers shared by the conditioning stages.
//!
//! All functions return `None` on an empty input instead of producing NaN, so
//! callers must decide explicitly what an empty valid subset means for them.

use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile with linear interpolation between closest ranks (`q` in 0..=100).
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    Some(percentile_of_sorted(&v, q))
}

fn percentile_of_sorted(v: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 100.0);
    let pos = q / 100.0 * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        v[lo]
    } else {
        v[lo] + (v[hi] - v[lo]) * (pos - lo as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Median and the given percentile of absolute deviations from that median.
pub fn median_and_deviation(values: &[f64], q: f64) -> Option<(f64, f64, f64)> {
    let med = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let devs = sorted(&deviations);
    let mad = percentile_of_sorted(&devs, 50.0);
    let pad = percentile_of_sorted(&devs, q);
    Some((med, mad, pad))
}

pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    median_and_deviation(values, 50.0).map(|(_, mad, _)| mad)
}

/// Piecewise-linear interpolation of `(xp, fp)` evaluated at every `x`.
///
/// `xp` must be increasing. Points left of `xp[0]` take `fp[0]` and points
/// right of the last knot take the last value. Returns `None` when there are
/// no knots.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Option<Vec<f64>> {
    if xp.is_empty() || xp.len() != fp.len() {
        return None;
    }
    let last = xp.len() - 1;
    Some(
        x.iter()
            .map(|&t| {
                if t <= xp[0] {
                    return fp[0];
                }
                if t >= xp[last] {
                    return fp[last];
                }
                // First knot strictly greater than t; always in 1..=last here.
                let hi = xp.partition_point(|&k| k.partial_cmp(&t) != Some(Ordering::Greater));
                let lo = hi - 1;
                let span = xp[hi] - xp[lo];
                if span <= 0.0 {
                    return fp[hi];
                }
                fp[lo] + (fp[hi] - fp[lo]) * (t - xp[lo]) / span
            })
            .collect(),
    )
}

/// Values of `signal` at positions where `mask` is true.
pub fn select_valid(signal: &[f64], mask: &[bool]) -> Vec<f64> {
    signal
        .iter()
        .zip(mask)
        .filter_map(|(&v, &ok)| ok.then_some(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_matches_linear_ranks() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert!((percentile(&v, 70.0).unwrap() - 3.1).abs() < 1e-12);
        assert_eq!(median(&v), Some(2.5));
    }

    #[test]
    fn test_empty_inputs_are_none() {
        assert!(median(&[]).is_none());
        assert!(median_and_deviation(&[], 70.0).is_none());
        assert!(interp(&[1.0], &[], &[]).is_none());
    }

    #[test]
    fn test_median_absolute_deviation() {
        let v = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        assert_eq!(median_absolute_deviation(&v), Some(1.0));
    }

    #[test]
    fn test_interp_clamps_outside_knots() {
        let out = interp(&[0.0, 1.0, 1.5, 2.0, 5.0], &[1.0, 2.0], &[10.0, 20.0]).unwrap();
        assert_eq!(out, vec![10.0, 10.0, 15.0, 20.0, 20.0]);
    }

    #[test]
    fn test_select_valid() {
        let out = select_valid(&[1.0, 2.0, 3.0], &[true, false, true]);
        assert_eq!(out, vec![1.0, 3.0]);
    }
}
