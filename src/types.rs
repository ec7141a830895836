use serde::{Deserialize, Serialize};

use crate::error::{check_len, CtgError, Result};
use crate::filter::FilterKind;

/// Fixed upper physiological bound for the FHR estimate, in bpm.
pub const DEFAULT_FHR_CEILING_BPM: f64 = 200.0;

/// One captured monitoring session.
///
/// `fhr` and `uc` use 0 as the sensor dropout sentinel. Timestamps are in
/// minutes and strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub fhr: Vec<f64>,
    pub uc: Option<Vec<f64>>,
    pub timestamps: Vec<f64>,
    pub sample_rate: f64,
}

impl Recording {
    pub fn new(
        fhr: Vec<f64>,
        uc: Option<Vec<f64>>,
        timestamps: Vec<f64>,
        sample_rate: f64,
    ) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        check_len("timestamps", fhr.len(), timestamps.len())?;
        if let Some(ref uc) = uc {
            check_len("uc", fhr.len(), uc.len())?;
        }
        if let Some(pos) = timestamps.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(CtgError::NonMonotonicTimestamps(pos + 1));
        }

        Ok(Self {
            fhr,
            uc,
            timestamps,
            sample_rate,
        })
    }

    /// Build a recording with evenly spaced timestamps (in minutes).
    pub fn from_samples(fhr: Vec<f64>, uc: Option<Vec<f64>>, sample_rate: f64) -> Result<Self> {
        let timestamps = (0..fhr.len())
            .map(|i| i as f64 / sample_rate / 60.0)
            .collect();
        Self::new(fhr, uc, timestamps, sample_rate)
    }

    pub fn len(&self) -> usize {
        self.fhr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fhr.is_empty()
    }

    pub fn samples_per_minute(&self) -> usize {
        samples_per_minute(self.sample_rate)
    }

    pub fn duration_minutes(&self) -> f64 {
        self.len() as f64 / self.sample_rate / 60.0
    }
}

pub fn samples_per_minute(sample_rate: f64) -> usize {
    ((sample_rate * 60.0).round() as usize).max(1)
}

// =============================================================================
// OPTIONS
// =============================================================================

/// How the initial FHR validity mask is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMethod {
    /// Only the dropout sentinel is rejected
    Basic,
    /// Dropouts plus sudden jumps relative to a rolling two-sample reference
    #[default]
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    pub method: MaskMethod,
    pub pct_low: f64,
    pub pct_high: f64,
    /// Length of the head-seeding reference window
    pub reference_window_secs: f64,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            method: MaskMethod::Adaptive,
            pct_low: 0.65,
            pct_high: 1.75,
            reference_window_secs: 60.0,
        }
    }
}

impl MaskOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.pct_low > 0.0 && self.pct_high > self.pct_low) {
            return Err(CtgError::InvalidConfiguration(format!(
                "mask thresholds must satisfy 0 < pct_low < pct_high, got [{}, {}]",
                self.pct_low, self.pct_high
            )));
        }
        if !(self.reference_window_secs > 0.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "reference window must be positive, got {}s",
                self.reference_window_secs
            )));
        }
        Ok(())
    }
}

/// Blackout applied around every invalid sample, in samples
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DilationOptions {
    pub blackout_left: usize,
    pub blackout_right: usize,
}

impl Default for DilationOptions {
    fn default() -> Self {
        Self {
            blackout_left: 10,
            blackout_right: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InterpolationMode {
    #[default]
    Linear,
    SmoothingSpline {
        /// Target residual sum of squares; defaults to the number of valid points
        #[serde(default)]
        smoothing: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClampOptions {
    pub upper_bpm: f64,
}

impl Default for ClampOptions {
    fn default() -> Self {
        Self {
            upper_bpm: DEFAULT_FHR_CEILING_BPM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BaselineMethod {
    /// Trailing-window median accepted only from windows with low dispersion
    #[default]
    WindowedStability,
    /// Percentile of long forward windows, refined once by excluding large excursions
    TwoPass {
        window_min: usize,
        percentile: f64,
        deviation_bpm: f64,
        pad: (usize, usize),
    },
}

impl BaselineMethod {
    pub fn two_pass() -> Self {
        BaselineMethod::TwoPass {
            window_min: 10,
            percentile: 70.0,
            deviation_bpm: 25.0,
            pad: (5, 5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineOptions {
    pub method: BaselineMethod,
    pub segment_size_min: usize,
    pub min_valid_fraction: f64,
    pub stability_percentile: f64,
    pub stability_threshold: f64,
    /// Return the accepted anchors alongside the baseline
    pub include_points: bool,
}

impl Default for BaselineOptions {
    fn default() -> Self {
        Self {
            method: BaselineMethod::WindowedStability,
            segment_size_min: 4,
            min_valid_fraction: 0.5,
            stability_percentile: 70.0,
            stability_threshold: 10.0,
            include_points: false,
        }
    }
}

impl BaselineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.segment_size_min == 0 {
            return Err(CtgError::InvalidConfiguration(
                "segment_size_min must be at least 1 minute".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_valid_fraction) {
            return Err(CtgError::InvalidConfiguration(format!(
                "min_valid_fraction must be within [0, 1], got {}",
                self.min_valid_fraction
            )));
        }
        if !(0.0..=100.0).contains(&self.stability_percentile) {
            return Err(CtgError::InvalidConfiguration(format!(
                "stability_percentile must be within [0, 100], got {}",
                self.stability_percentile
            )));
        }
        if !(self.stability_threshold > 0.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "stability_threshold must be positive, got {}",
                self.stability_threshold
            )));
        }
        if let BaselineMethod::TwoPass {
            window_min,
            percentile,
            deviation_bpm,
            ..
        } = self.method
        {
            if window_min == 0 || !(0.0..=100.0).contains(&percentile) || !(deviation_bpm > 0.0) {
                return Err(CtgError::InvalidConfiguration(format!(
                    "invalid two-pass baseline parameters: window {} min, percentile {}, deviation {} bpm",
                    window_min, percentile, deviation_bpm
                )));
            }
        }
        Ok(())
    }
}

/// Cutoffs for the derived HR bands and the UC trend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandOptions {
    pub slow_hz: f64,
    pub medium_hz: f64,
    pub fast_hz: f64,
    pub uc_hz: f64,
    pub order: usize,
    pub kind: FilterKind,
    pub zero_phase: bool,
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            slow_hz: 0.0125 / 2.0,
            medium_hz: 0.0125,
            fast_hz: 0.0125 * 2.0,
            uc_hz: 0.025,
            order: 4,
            kind: FilterKind::Lowpass,
            zero_phase: true,
        }
    }
}

/// Every tunable parameter of the conditioning pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningOptions {
    pub mask: MaskOptions,
    pub dilation: DilationOptions,
    pub interpolation: InterpolationMode,
    pub clamp: ClampOptions,
    pub baseline: BaselineOptions,
    pub bands: BandOptions,
    /// Integer factor to decimate the gap-filled series by before the baseline
    /// and band stages
    pub decimation: Option<usize>,
}

impl ConditioningOptions {
    pub fn validate(&self) -> Result<()> {
        self.mask.validate()?;
        self.baseline.validate()?;
        if let InterpolationMode::SmoothingSpline {
            smoothing: Some(s),
        } = self.interpolation
        {
            if !(s >= 0.0) {
                return Err(CtgError::InvalidConfiguration(format!(
                    "spline smoothing factor must be non-negative, got {}",
                    s
                )));
            }
        }
        if self.decimation == Some(0) {
            return Err(CtgError::InvalidConfiguration(
                "decimation factor must be at least 1".to_string(),
            ));
        }
        if !(self.clamp.upper_bpm > 0.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "clamp ceiling must be positive, got {}",
                self.clamp.upper_bpm
            )));
        }
        Ok(())
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Output of the validity stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityMask {
    pub mask: Vec<bool>,
    /// False when no reference window held any valid sample and the
    /// sentinel-derived mask was returned untouched
    pub seeded: bool,
}

impl ValidityMask {
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v).count()
    }
}

/// Dispersion summary of one fixed-duration baseline window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentStability {
    /// Exclusive end of the trailing window
    pub anchor_index: usize,
    pub median_value: f64,
    pub median_absolute_deviation: f64,
    pub percentile_absolute_deviation: f64,
}

impl SegmentStability {
    pub fn is_stable(&self, threshold: f64) -> bool {
        self.percentile_absolute_deviation < threshold
    }
}

/// An accepted baseline anchor, for diagnostic overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub index: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineQuality {
    Normal,
    /// Flat baseline substituted because no window was stable
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEstimate {
    pub values: Vec<f64>,
    pub quality: BaselineQuality,
    /// Accepted anchors, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<AnchorPoint>>,
    /// Every window that had enough valid samples to be assessed
    pub segments: Vec<SegmentStability>,
}

impl BaselineEstimate {
    pub fn is_fallback(&self) -> bool {
        self.quality == BaselineQuality::Fallback
    }
}

/// Low-pass bands of the clamped FHR estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrBands {
    pub slow: Vec<f64>,
    pub medium: Vec<f64>,
    pub fast: Vec<f64>,
}

/// Data-quality conditions absorbed while conditioning a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No reference window held valid FHR; jump rejection was skipped
    NoReferenceWindow,
    /// No stable baseline window; flat baseline at the median of window medians
    BaselineFallback { value: f64 },
    /// Recording too short or too sparse for any baseline window
    NoBaselineWindows { value: f64 },
    /// Fewer than two valid FHR samples; estimate and baseline are flat
    InsufficientData { valid_samples: usize },
}

/// Everything handed to the downstream event classifier for one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionedRecording {
    /// Rate of every series below, after any decimation
    pub sample_rate: f64,
    pub timestamps: Vec<f64>,
    pub raw_fhr: Vec<f64>,
    pub mask: Vec<bool>,
    pub estimated_hr: Vec<f64>,
    /// Lower clamp bound, the smallest valid raw FHR sample
    pub clamp_floor: f64,
    pub baseline: BaselineEstimate,
    pub bands: HrBands,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_uc: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uc_trend: Option<Vec<f64>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConditionedRecording {
    pub fn len(&self) -> usize {
        self.estimated_hr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimated_hr.is_empty()
    }

    pub fn valid_fraction(&self) -> f64 {
        if self.mask.is_empty() {
            return 0.0;
        }
        self.mask.iter().filter(|&&v| v).count() as f64 / self.mask.len() as f64
    }

    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}
