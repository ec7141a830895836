//! End-to-end conditioning of one recording.
//!
//! mask → dilate → fill → (decimate) → clamp → baseline, with the band
//! filters run on the clamped estimate and, independently, on the raw UC
//! channel.

use crate::baseline::estimate_baseline;
use crate::error::{CtgError, Result};
use crate::filter::{filter_signal, FilterSpec};
use crate::gap_fill::{clamp_floor, clamp_to, fill_gaps};
use crate::mask::{compute_validity_mask, dilate_mask, sentinel_mask};
use crate::resample::downsample;
use crate::stats;
use crate::types::{
    samples_per_minute, BandOptions, BaselineEstimate, BaselineQuality, ConditionedRecording,
    ConditioningOptions, Diagnostic, HrBands, Recording,
};

/// Runs the conditioning stages with one validated set of options.
#[derive(Debug, Clone)]
pub struct Conditioner {
    options: ConditioningOptions,
}

/// Series handed from the fill stage to the baseline and band stages.
struct Stage {
    sample_rate: f64,
    timestamps: Vec<f64>,
    raw_fhr: Vec<f64>,
    mask: Vec<bool>,
    filled: Vec<f64>,
    raw_uc: Option<Vec<f64>>,
}

impl Conditioner {
    /// Create a conditioner, rejecting out-of-range options up front.
    pub fn new(options: ConditioningOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ConditioningOptions {
        &self.options
    }

    /// Condition a single recording.
    ///
    /// Data-quality problems are reported in `diagnostics`. A recording with
    /// fewer than two valid FHR samples still yields a result: the estimate
    /// and baseline are flat at the median of its non-dropout samples and
    /// `Diagnostic::InsufficientData` is attached. Only invalid options fail.
    pub fn condition(&self, recording: &Recording) -> Result<ConditionedRecording> {
        let opts = &self.options;
        let mut diagnostics = Vec::new();

        log::info!(
            "Conditioning {} samples ({:.1} min at {} Hz)",
            recording.len(),
            recording.duration_minutes(),
            recording.sample_rate
        );

        let validity = compute_validity_mask(&recording.fhr, recording.sample_rate, &opts.mask)?;
        if !validity.seeded {
            diagnostics.push(Diagnostic::NoReferenceWindow);
        }

        let mask = dilate_mask(&validity.mask, &opts.dilation);
        let valid_samples = mask.iter().filter(|&&v| v).count();
        log::debug!(
            "Mask: {} valid before dilation, {} after",
            validity.valid_count(),
            valid_samples
        );

        let (filled, floor) =
            match fill_gaps(&recording.fhr, &recording.timestamps, &mask, &opts.interpolation) {
                Ok(filled) => {
                    let floor = clamp_floor(&recording.fhr, &mask)?;
                    (filled, Some(floor))
                }
                Err(CtgError::InsufficientData(reason)) => {
                    let level = dropout_free_median(&recording.fhr);
                    log::warn!("{}; using flat estimate of {:.1} bpm", reason, level);
                    diagnostics.push(Diagnostic::InsufficientData { valid_samples });
                    (vec![level; recording.len()], None)
                }
                Err(e) => return Err(e),
            };

        let stage = self.decimate(recording, mask, filled)?;
        let clamp_floor = floor.unwrap_or_else(|| stage.filled.first().copied().unwrap_or(0.0));
        let estimated_hr = clamp_to(&stage.filled, clamp_floor, &opts.clamp);

        let baseline = if floor.is_some() {
            let baseline = estimate_baseline(
                &estimated_hr,
                &stage.mask,
                samples_per_minute(stage.sample_rate),
                &opts.baseline,
            )?;
            if baseline.is_fallback() {
                let value = baseline.values.first().copied().unwrap_or_default();
                diagnostics.push(if baseline.segments.is_empty() {
                    Diagnostic::NoBaselineWindows { value }
                } else {
                    Diagnostic::BaselineFallback { value }
                });
            }
            baseline
        } else {
            BaselineEstimate {
                values: estimated_hr.clone(),
                quality: BaselineQuality::Fallback,
                points: opts.baseline.include_points.then(Vec::new),
                segments: Vec::new(),
            }
        };

        let bands = compute_bands(&estimated_hr, stage.sample_rate, &opts.bands)?;
        let uc_trend = stage
            .raw_uc
            .as_deref()
            .map(|uc| uc_trend(uc, stage.sample_rate, &opts.bands))
            .transpose()?;

        Ok(ConditionedRecording {
            sample_rate: stage.sample_rate,
            timestamps: stage.timestamps,
            raw_fhr: stage.raw_fhr,
            mask: stage.mask,
            estimated_hr,
            clamp_floor,
            baseline,
            bands,
            raw_uc: stage.raw_uc,
            uc_trend,
            diagnostics,
        })
    }

    /// Reduce the filled FHR, its mask and the UC channel by the configured
    /// factor. Raw FHR keeps every `factor`-th sample.
    fn decimate(&self, recording: &Recording, mask: Vec<bool>, filled: Vec<f64>) -> Result<Stage> {
        let factor = match self.options.decimation {
            Some(factor) if factor > 1 => factor,
            _ => {
                return Ok(Stage {
                    sample_rate: recording.sample_rate,
                    timestamps: recording.timestamps.clone(),
                    raw_fhr: recording.fhr.clone(),
                    mask,
                    filled,
                    raw_uc: recording.uc.clone(),
                })
            }
        };

        let fhr = downsample(
            &filled,
            &mask,
            &recording.timestamps,
            recording.sample_rate,
            factor,
        )?;
        let raw_uc = match recording.uc {
            Some(ref uc) => {
                let uc_mask = sentinel_mask(uc);
                let decimated =
                    downsample(uc, &uc_mask, &recording.timestamps, recording.sample_rate, factor)?;
                Some(decimated.signal)
            }
            None => None,
        };
        log::debug!(
            "Decimated by {}: {} -> {} samples",
            factor,
            recording.len(),
            fhr.signal.len()
        );

        Ok(Stage {
            sample_rate: fhr.sample_rate,
            raw_fhr: recording
                .fhr
                .iter()
                .step_by(factor)
                .take(fhr.signal.len())
                .copied()
                .collect(),
            timestamps: fhr.timestamps,
            mask: fhr.mask,
            filled: fhr.signal,
            raw_uc,
        })
    }
}

/// Median of the non-dropout samples, or 0 when every sample is a dropout.
fn dropout_free_median(fhr: &[f64]) -> f64 {
    let valid = stats::select_valid(fhr, &sentinel_mask(fhr));
    stats::median(&valid).unwrap_or(0.0)
}

/// Condition a recording with the given options.
pub fn condition_recording(
    recording: &Recording,
    options: &ConditioningOptions,
) -> Result<ConditionedRecording> {
    Conditioner::new(options.clone())?.condition(recording)
}

fn band_spec(cutoff_hz: f64, options: &BandOptions) -> FilterSpec {
    FilterSpec {
        kind: options.kind,
        cutoff_hz,
        order: options.order,
        zero_phase: options.zero_phase,
    }
}

/// Slow, medium and fast low-pass bands of the clamped FHR estimate.
pub fn compute_bands(hr: &[f64], sample_rate: f64, options: &BandOptions) -> Result<HrBands> {
    Ok(HrBands {
        slow: filter_signal(hr, sample_rate, &band_spec(options.slow_hz, options))?,
        medium: filter_signal(hr, sample_rate, &band_spec(options.medium_hz, options))?,
        fast: filter_signal(hr, sample_rate, &band_spec(options.fast_hz, options))?,
    })
}

/// Contraction-intensity trend of the raw UC channel.
pub fn uc_trend(uc: &[f64], sample_rate: f64, options: &BandOptions) -> Result<Vec<f64>> {
    filter_signal(uc, sample_rate, &band_spec(options.uc_hz, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselineQuality, DilationOptions};

    fn steady(minutes: usize) -> Recording {
        let n = minutes * 240;
        let fhr: Vec<f64> = (0..n)
            .map(|i| 140.0 + if i % 4 < 2 { 1.0 } else { -1.0 })
            .collect();
        let uc: Vec<f64> = (0..n).map(|i| 20.0 + (i as f64 / 200.0).sin() * 5.0).collect();
        Recording::from_samples(fhr, Some(uc), 4.0).unwrap()
    }

    #[test]
    fn test_all_outputs_share_length() {
        let rec = steady(8);
        let out = condition_recording(&rec, &ConditioningOptions::default()).unwrap();
        let n = rec.len();
        assert_eq!(out.mask.len(), n);
        assert_eq!(out.estimated_hr.len(), n);
        assert_eq!(out.baseline.values.len(), n);
        assert_eq!(out.bands.slow.len(), n);
        assert_eq!(out.bands.medium.len(), n);
        assert_eq!(out.bands.fast.len(), n);
        assert_eq!(out.uc_trend.as_ref().map(Vec::len), Some(n));
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.baseline.quality, BaselineQuality::Normal);
    }

    #[test]
    fn test_estimate_respects_clamp() {
        let mut rec = steady(6);
        rec.fhr[300..310].fill(0.0);
        let out = condition_recording(&rec, &ConditioningOptions::default()).unwrap();
        assert!(out
            .estimated_hr
            .iter()
            .all(|&v| v >= out.clamp_floor && v <= 200.0));
    }

    #[test]
    fn test_short_recording_reports_missing_baseline_windows() {
        let rec = Recording::from_samples(vec![140.0; 200], None, 4.0).unwrap();
        let out = condition_recording(&rec, &ConditioningOptions::default()).unwrap();
        assert!(out.baseline.is_fallback());
        assert!(matches!(
            out.diagnostics.as_slice(),
            [Diagnostic::NoBaselineWindows { .. }]
        ));
        assert!(out.uc_trend.is_none());
    }

    #[test]
    fn test_all_dropouts_give_degraded_result() {
        let rec = Recording::from_samples(vec![0.0; 600], Some(vec![10.0; 600]), 4.0).unwrap();
        let out = condition_recording(&rec, &ConditioningOptions::default()).unwrap();
        assert_eq!(
            out.diagnostics,
            vec![
                Diagnostic::NoReferenceWindow,
                Diagnostic::InsufficientData { valid_samples: 0 },
            ]
        );
        assert!(out.mask.iter().all(|&v| !v));
        assert!(out.estimated_hr.iter().all(|&v| v == 0.0));
        assert!(out.baseline.is_fallback());
        assert_eq!(out.baseline.values.len(), 600);
        assert_eq!(out.bands.slow.len(), 600);
        assert_eq!(out.uc_trend.as_ref().map(Vec::len), Some(600));
    }

    #[test]
    fn test_single_valid_sample_is_flat_at_that_value() {
        let mut fhr = vec![0.0; 400];
        fhr[200] = 140.0;
        let rec = Recording::from_samples(fhr, None, 4.0).unwrap();
        let out = condition_recording(&rec, &ConditioningOptions::default()).unwrap();
        assert!(out.is_degraded());
        assert!(out
            .diagnostics
            .contains(&Diagnostic::InsufficientData { valid_samples: 0 }));
        assert!(out.estimated_hr.iter().all(|&v| v == 140.0));
        assert!(out.baseline.values.iter().all(|&v| v == 140.0));
        assert_eq!(out.clamp_floor, 140.0);
    }

    #[test]
    fn test_decimation_reduces_every_series() {
        let rec = steady(6);
        let out = condition_recording(
            &rec,
            &ConditioningOptions {
                decimation: Some(4),
                ..Default::default()
            },
        )
        .unwrap();
        let n = rec.len() / 4;
        assert_eq!(out.sample_rate, 1.0);
        assert_eq!(out.len(), n);
        assert_eq!(out.timestamps.len(), n);
        assert_eq!(out.raw_fhr.len(), n);
        assert_eq!(out.mask.len(), n);
        assert_eq!(out.baseline.values.len(), n);
        assert_eq!(out.bands.fast.len(), n);
        assert_eq!(out.raw_uc.as_ref().map(Vec::len), Some(n));
        assert_eq!(out.uc_trend.as_ref().map(Vec::len), Some(n));
        assert_eq!(out.baseline.quality, BaselineQuality::Normal);
        assert!((out.timestamps[1] - 4.0 / 240.0).abs() < 1e-12);
    }

    #[test]
    fn test_bad_band_cutoff_fails_fast() {
        let mut opts = ConditioningOptions::default();
        opts.bands.fast_hz = 3.0;
        let err = condition_recording(&steady(5), &opts).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_conditioner_is_deterministic() {
        let rec = steady(6);
        let conditioner = Conditioner::new(ConditioningOptions {
            dilation: DilationOptions {
                blackout_left: 2,
                blackout_right: 4,
            },
            ..Default::default()
        })
        .unwrap();
        let a = conditioner.condition(&rec).unwrap();
        let b = conditioner.condition(&rec).unwrap();
        assert_eq!(a.estimated_hr, b.estimated_hr);
        assert_eq!(a.baseline.values, b.baseline.values);
        assert_eq!(a.bands.slow, b.bands.slow);
    }
}
