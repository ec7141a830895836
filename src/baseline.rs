//! Resting-rate baseline estimation.
//!
//! The default method slides a trailing window across the recording one
//! minute at a time and trusts a window's median only when the window is
//! internally quiet: the chosen percentile of absolute deviations from the
//! median must stay below the stability threshold. Windows dominated by a
//! deceleration or acceleration fail that test and are left out, so no event
//! boundaries are needed up front. Accepted medians are joined piecewise
//! linearly.
//!
//! The two-pass method is the older estimator: a high percentile of long
//! forward windows, recomputed once after dropping samples far from the first
//! estimate.

use crate::error::{check_len, Result};
use crate::stats;
use crate::types::{
    AnchorPoint, BaselineEstimate, BaselineMethod, BaselineOptions, BaselineQuality,
    SegmentStability,
};

/// Estimate the baseline of a gap-filled, clamped FHR series.
///
/// # Arguments
/// * `hr` - FHR estimate with no gaps
/// * `mask` - Validity of each sample of `hr`
/// * `samples_per_min` - Anchor spacing and window unit
/// * `options` - Method and stability parameters
///
/// # Returns
/// A baseline defined at every index. When no window can be trusted the
/// baseline is flat and `quality` is `Fallback`.
pub fn estimate_baseline(
    hr: &[f64],
    mask: &[bool],
    samples_per_min: usize,
    options: &BaselineOptions,
) -> Result<BaselineEstimate> {
    options.validate()?;
    check_len("mask", hr.len(), mask.len())?;
    let samples_per_min = samples_per_min.max(1);

    match options.method {
        BaselineMethod::WindowedStability => {
            Ok(windowed_stability(hr, mask, samples_per_min, options))
        }
        BaselineMethod::TwoPass {
            window_min,
            percentile,
            deviation_bpm,
            pad,
        } => Ok(two_pass(
            hr,
            mask,
            samples_per_min,
            &TwoPassParams {
                window_len: window_min * samples_per_min,
                percentile,
                deviation_bpm,
                pad,
                min_valid_fraction: options.min_valid_fraction,
                include_points: options.include_points,
            },
        )),
    }
}

/// Stability records for every trailing window `[anchor - segment_len, anchor)`
/// whose valid fraction reaches `min_valid_fraction`, anchors one minute apart.
pub fn scan_segments(
    hr: &[f64],
    mask: &[bool],
    segment_len: usize,
    step: usize,
    min_valid_fraction: f64,
    percentile: f64,
) -> Vec<SegmentStability> {
    let mut segments = Vec::new();
    let step = step.max(1);
    let required = min_valid_fraction * segment_len as f64;

    let mut anchor = segment_len.max(1);
    while anchor < hr.len() {
        let window = anchor.saturating_sub(segment_len)..anchor;
        let values = stats::select_valid(&hr[window.clone()], &mask[window]);

        if !values.is_empty() && values.len() as f64 >= required {
            if let Some((median, mad, spread)) = stats::median_and_deviation(&values, percentile) {
                segments.push(SegmentStability {
                    anchor_index: anchor,
                    median_value: median,
                    median_absolute_deviation: mad,
                    percentile_absolute_deviation: spread,
                });
            }
        }
        anchor += step;
    }
    segments
}

fn windowed_stability(
    hr: &[f64],
    mask: &[bool],
    samples_per_min: usize,
    options: &BaselineOptions,
) -> BaselineEstimate {
    let segment_len = options.segment_size_min * samples_per_min;
    let segments = scan_segments(
        hr,
        mask,
        segment_len,
        samples_per_min,
        options.min_valid_fraction,
        options.stability_percentile,
    );

    let anchors: Vec<AnchorPoint> = segments
        .iter()
        .filter(|s| s.is_stable(options.stability_threshold))
        .map(|s| AnchorPoint {
            index: s.anchor_index,
            value: s.median_value,
        })
        .collect();

    log::info!(
        "Baseline: {} windows assessed, {} stable (threshold {} bpm at p{})",
        segments.len(),
        anchors.len(),
        options.stability_threshold,
        options.stability_percentile
    );

    let points = options.include_points.then(|| anchors.clone());
    match interpolate_anchors(hr.len(), &anchors) {
        Some(values) => BaselineEstimate {
            values,
            quality: BaselineQuality::Normal,
            points,
            segments,
        },
        None => {
            let medians: Vec<f64> = segments.iter().map(|s| s.median_value).collect();
            let value = stats::median(&medians).unwrap_or_else(|| flat_level(hr, mask));
            log::warn!(
                "Unable to find a stable baseline window, using flat baseline of {:.1} bpm",
                value
            );
            BaselineEstimate {
                values: vec![value; hr.len()],
                quality: BaselineQuality::Fallback,
                points,
                segments,
            }
        }
    }
}

/// Median of the valid samples, or of all samples when none is valid.
fn flat_level(hr: &[f64], mask: &[bool]) -> f64 {
    let valid = stats::select_valid(hr, mask);
    stats::median(&valid)
        .or_else(|| stats::median(hr))
        .unwrap_or(0.0)
}

/// Piecewise-linear baseline through the anchors, held flat beyond the ends.
fn interpolate_anchors(len: usize, anchors: &[AnchorPoint]) -> Option<Vec<f64>> {
    if anchors.is_empty() {
        return None;
    }
    let xp: Vec<f64> = anchors.iter().map(|a| a.index as f64).collect();
    let fp: Vec<f64> = anchors.iter().map(|a| a.value).collect();
    let x: Vec<f64> = (0..len).map(|i| i as f64).collect();
    stats::interp(&x, &xp, &fp)
}

struct TwoPassParams {
    window_len: usize,
    percentile: f64,
    deviation_bpm: f64,
    pad: (usize, usize),
    min_valid_fraction: f64,
    include_points: bool,
}

/// One pass of the forward-window percentile estimate.
///
/// Windows start every minute; qualifying windows are edge-padded by
/// `pad` windows and placed one minute apart, which centres each window
/// value when the padding is half the window length.
fn forward_window_pass(
    hr: &[f64],
    mask: &[bool],
    samples_per_min: usize,
    params: &TwoPassParams,
) -> Option<(Vec<f64>, Vec<AnchorPoint>)> {
    let n = params.window_len;
    let required = params.min_valid_fraction * n as f64;

    let mut flags = Vec::new();
    let mut values = Vec::new();
    for start in (0..hr.len().saturating_sub(n)).step_by(samples_per_min) {
        let window = start..start + n;
        let valid = stats::select_valid(&hr[window.clone()], &mask[window]);
        let qualifies = !valid.is_empty() && valid.len() as f64 > required;
        flags.push(qualifies);
        values.push(if qualifies {
            stats::percentile(&valid, params.percentile).unwrap_or(0.0)
        } else {
            0.0
        });
    }

    let (first_flag, last_flag) = (*flags.first()?, *flags.last()?);
    let (first_val, last_val) = (*values.first()?, *values.last()?);
    let (before, after) = params.pad;

    let padded_flags = std::iter::repeat(first_flag)
        .take(before)
        .chain(flags.iter().copied())
        .chain(std::iter::repeat(last_flag).take(after));
    let padded_values = std::iter::repeat(first_val)
        .take(before)
        .chain(values.iter().copied())
        .chain(std::iter::repeat(last_val).take(after));

    let anchors: Vec<AnchorPoint> = padded_flags
        .zip(padded_values)
        .enumerate()
        .filter(|(_, (ok, _))| *ok)
        .map(|(k, (_, value))| AnchorPoint {
            index: k * samples_per_min,
            value,
        })
        .collect();

    let baseline = interpolate_anchors(hr.len(), &anchors)?;
    Some((baseline, anchors))
}

fn two_pass(
    hr: &[f64],
    mask: &[bool],
    samples_per_min: usize,
    params: &TwoPassParams,
) -> BaselineEstimate {
    let Some((first, first_anchors)) = forward_window_pass(hr, mask, samples_per_min, params)
    else {
        let value = flat_level(hr, mask);
        log::warn!(
            "No qualifying {}-sample window, using flat baseline of {:.1} bpm",
            params.window_len,
            value
        );
        return BaselineEstimate {
            values: vec![value; hr.len()],
            quality: BaselineQuality::Fallback,
            points: params.include_points.then(Vec::new),
            segments: Vec::new(),
        };
    };

    let revised: Vec<bool> = mask
        .iter()
        .zip(hr.iter().zip(&first))
        .map(|(&ok, (&v, &b))| ok && (v - b).abs() <= params.deviation_bpm)
        .collect();

    let (values, anchors) = match forward_window_pass(hr, &revised, samples_per_min, params) {
        Some(refined) => refined,
        None => {
            log::warn!("Refined baseline pass found no qualifying window, keeping first pass");
            (first, first_anchors)
        }
    };

    log::info!("Two-pass baseline from {} anchors", anchors.len());

    BaselineEstimate {
        values,
        quality: BaselineQuality::Normal,
        points: params.include_points.then_some(anchors),
        segments: Vec::new(),
    }
}
