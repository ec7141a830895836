//! Gap interpolation over invalid FHR samples and physiological range clamping.

use crate::error::{check_len, CtgError, Result};
use crate::spline::SmoothingSpline;
use crate::stats;
use crate::types::{ClampOptions, InterpolationMode};

/// Valid `(timestamp, value)` pairs, checked to be strictly increasing in time.
fn valid_pairs(signal: &[f64], timestamps: &[f64], mask: &[bool]) -> Result<(Vec<f64>, Vec<f64>)> {
    let (ts, vs): (Vec<f64>, Vec<f64>) = timestamps
        .iter()
        .zip(signal)
        .zip(mask)
        .filter_map(|((&t, &v), &ok)| ok.then_some((t, v)))
        .unzip();

    if ts.len() < 2 {
        return Err(CtgError::InsufficientData(format!(
            "interpolation needs at least 2 valid samples, got {}",
            ts.len()
        )));
    }
    if let Some(pos) = ts.windows(2).position(|w| !(w[1] > w[0])) {
        return Err(CtgError::NonMonotonicTimestamps(pos + 1));
    }
    Ok((ts, vs))
}

/// Reconstruct the signal at invalid positions.
///
/// Valid samples pass through untouched in every mode; only positions where
/// `mask` is false are replaced by the interpolant evaluated at their
/// timestamp.
///
/// # Arguments
/// * `signal` - Raw samples
/// * `timestamps` - Sample times, same length as `signal`
/// * `mask` - Validity mask, same length as `signal`
/// * `mode` - Linear or smoothing-spline interpolation
pub fn fill_gaps(
    signal: &[f64],
    timestamps: &[f64],
    mask: &[bool],
    mode: &InterpolationMode,
) -> Result<Vec<f64>> {
    check_len("timestamps", signal.len(), timestamps.len())?;
    check_len("mask", signal.len(), mask.len())?;

    let (ts, vs) = valid_pairs(signal, timestamps, mask)?;
    let gaps: Vec<usize> = (0..signal.len()).filter(|&i| !mask[i]).collect();
    let gap_times: Vec<f64> = gaps.iter().map(|&i| timestamps[i]).collect();

    let estimates = match mode {
        InterpolationMode::SmoothingSpline { smoothing } if ts.len() >= 3 => {
            let s = smoothing.unwrap_or(ts.len() as f64);
            let spline = SmoothingSpline::fit(&ts, &vs, s)?;
            gap_times.iter().map(|&t| spline.evaluate(t)).collect()
        }
        InterpolationMode::SmoothingSpline { .. } => {
            log::debug!("Only {} valid samples, falling back to linear interpolation", ts.len());
            linear_estimates(&gap_times, &ts, &vs)?
        }
        InterpolationMode::Linear => linear_estimates(&gap_times, &ts, &vs)?,
    };

    let mut filled = signal.to_vec();
    for (&i, v) in gaps.iter().zip(estimates) {
        filled[i] = v;
    }

    log::debug!(
        "Filled {} of {} samples from {} valid points",
        gaps.len(),
        signal.len(),
        ts.len()
    );
    Ok(filled)
}

fn linear_estimates(at: &[f64], ts: &[f64], vs: &[f64]) -> Result<Vec<f64>> {
    stats::interp(at, ts, vs)
        .ok_or_else(|| CtgError::InsufficientData("no valid samples to interpolate".to_string()))
}

/// Bound the filled series to `[min(raw[valid]), upper_bpm]`.
///
/// # Returns
/// The clamped series and the data-derived floor
pub fn clamp_range(
    filled: &[f64],
    raw: &[f64],
    mask: &[bool],
    options: &ClampOptions,
) -> Result<(Vec<f64>, f64)> {
    check_len("raw", filled.len(), raw.len())?;
    let floor = clamp_floor(raw, mask)?;
    Ok((clamp_to(filled, floor, options), floor))
}

/// Smallest valid raw sample, the lower clamp bound.
pub fn clamp_floor(raw: &[f64], mask: &[bool]) -> Result<f64> {
    check_len("mask", raw.len(), mask.len())?;
    stats::select_valid(raw, mask)
        .into_iter()
        .reduce(f64::min)
        .ok_or_else(|| {
            CtgError::InsufficientData("no valid raw samples to derive clamp floor".to_string())
        })
}

/// Clip `values` to `[floor, upper_bpm]`; the ceiling wins if the bounds cross.
pub fn clamp_to(values: &[f64], floor: f64, options: &ClampOptions) -> Vec<f64> {
    if floor > options.upper_bpm {
        log::warn!(
            "Clamp floor {:.1} exceeds ceiling {:.1}; ceiling wins",
            floor,
            options.upper_bpm
        );
    }
    values
        .iter()
        .map(|&v| v.max(floor).min(options.upper_bpm))
        .collect()
}
