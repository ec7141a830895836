//! Butterworth band filtering
//!
//! Filters are designed by bilinear transform of the analog Butterworth
//! prototype with a pre-warped cutoff, one second-order section per
//! conjugate pole pair (plus a first-order section for odd orders). The
//! sections are multiplied out into transfer-function form `(b, a)`.
//!
//! The effective order is capped at `max(floor(fs / fc) - 1, 1)`: low
//! cutoff-to-rate ratios at high order oscillate numerically.

use std::f64::consts::PI;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CtgError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
}

impl FromStr for FilterKind {
    type Err = CtgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lowpass" => Ok(Self::Lowpass),
            "highpass" => Ok(Self::Highpass),
            other => Err(CtgError::InvalidConfiguration(format!(
                "Invalid filter type: {}",
                other
            ))),
        }
    }
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lowpass => "lowpass",
            Self::Highpass => "highpass",
        }
    }

    /// Digital section for the analog pole pair `re ± j·im` (|p|² = `mag_sq`).
    fn pole_pair_section(&self, re: f64, mag_sq: f64, k: f64) -> (Vec<f64>, Vec<f64>) {
        let k2 = k * k;
        let d = k2 - 2.0 * k * re + mag_sq;
        let a = vec![1.0, 2.0 * (mag_sq - k2) / d, (k2 + 2.0 * k * re + mag_sq) / d];
        let b = match self {
            Self::Lowpass => vec![mag_sq / d, 2.0 * mag_sq / d, mag_sq / d],
            Self::Highpass => vec![k2 / d, -2.0 * k2 / d, k2 / d],
        };
        (b, a)
    }

    /// Digital section for the real analog pole `-wc`.
    fn real_pole_section(&self, wc: f64, k: f64) -> (Vec<f64>, Vec<f64>) {
        let alpha = k + wc;
        let a = vec![1.0, -(k - wc) / alpha];
        let b = match self {
            Self::Lowpass => vec![wc / alpha, wc / alpha],
            Self::Highpass => vec![k / alpha, -k / alpha],
        };
        (b, a)
    }
}

/// Highest order allowed for a cutoff at the given sample rate.
pub fn order_cap(sample_rate: f64, cutoff_hz: f64) -> usize {
    let ratio = (sample_rate / cutoff_hz).floor() as i64;
    (ratio - 1).max(1) as usize
}

/// Requested order limited by [`order_cap`].
pub fn effective_order(requested: usize, sample_rate: f64, cutoff_hz: f64) -> usize {
    requested.min(order_cap(sample_rate, cutoff_hz))
}

fn poly_mul(p: &[f64], q: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; p.len() + q.len() - 1];
    for (i, &pi) in p.iter().enumerate() {
        for (j, &qj) in q.iter().enumerate() {
            out[i + j] += pi * qj;
        }
    }
    out
}

/// Transfer-function coefficients of a Butterworth filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButterworthDesign {
    pub kind: FilterKind,
    /// Order actually designed, after the cap
    pub order: usize,
    pub requested_order: usize,
    pub cutoff_hz: f64,
    pub sample_rate: f64,
    /// Numerator, `order + 1` coefficients
    pub b: Vec<f64>,
    /// Denominator, `order + 1` coefficients with `a[0] == 1`
    pub a: Vec<f64>,
}

impl ButterworthDesign {
    pub fn new(kind: FilterKind, order: usize, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        if order == 0 {
            return Err(CtgError::InvalidConfiguration(
                "filter order must be at least 1".to_string(),
            ));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate / 2.0) {
            return Err(CtgError::InvalidConfiguration(format!(
                "cutoff {} Hz must lie within (0, {}) Hz",
                cutoff_hz,
                sample_rate / 2.0
            )));
        }

        let capped = effective_order(order, sample_rate, cutoff_hz);
        if capped < order {
            log::debug!(
                "Filter order capped from {} to {} for {} Hz at {} Hz",
                order,
                capped,
                cutoff_hz,
                sample_rate
            );
        }

        let k = 2.0 * sample_rate;
        let wc = k * (PI * cutoff_hz / sample_rate).tan();

        let mut b = vec![1.0];
        let mut a = vec![1.0];
        for i in 0..capped / 2 {
            let theta = PI * (2 * i + capped + 1) as f64 / (2 * capped) as f64;
            let (sb, sa) = kind.pole_pair_section(wc * theta.cos(), wc * wc, k);
            b = poly_mul(&b, &sb);
            a = poly_mul(&a, &sa);
        }
        if capped % 2 == 1 {
            let (sb, sa) = kind.real_pole_section(wc, k);
            b = poly_mul(&b, &sb);
            a = poly_mul(&a, &sa);
        }

        Ok(Self {
            kind,
            order: capped,
            requested_order: order,
            cutoff_hz,
            sample_rate,
            b,
            a,
        })
    }

    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / self.sample_rate;
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(re, im), (n, &c)| {
                    (re + c * (w * n as f64).cos(), im - c * (w * n as f64).sin())
                })
        };
        let (br, bi) = eval(&self.b);
        let (ar, ai) = eval(&self.a);
        ((br * br + bi * bi) / (ar * ar + ai * ai)).sqrt()
    }

    /// Initial state for a step response already at steady state with unit input.
    pub fn steady_state(&self) -> Result<Vec<f64>> {
        let n = self.a.len();
        if n < 2 {
            return Ok(Vec::new());
        }
        let dim = n - 1;
        let mut i_minus_a = DMatrix::<f64>::identity(dim, dim);
        for i in 0..dim {
            i_minus_a[(i, 0)] += self.a[i + 1];
            if i + 1 < dim {
                i_minus_a[(i, i + 1)] -= 1.0;
            }
        }
        let rhs = DVector::from_iterator(
            dim,
            (0..dim).map(|i| self.b[i + 1] - self.a[i + 1] * self.b[0]),
        );
        let zi = i_minus_a.lu().solve(&rhs).ok_or_else(|| {
            CtgError::InvalidConfiguration(format!(
                "filter at {} Hz has no steady state",
                self.cutoff_hz
            ))
        })?;
        Ok(zi.iter().copied().collect())
    }

    /// Direct form II transposed filtering from state `zi`.
    fn run(&self, x: &[f64], zi: &[f64]) -> Vec<f64> {
        let n = self.b.len();
        let mut z = zi.to_vec();
        let mut y = Vec::with_capacity(x.len());
        for &xi in x {
            let yi = self.b[0] * xi + z.first().copied().unwrap_or(0.0);
            for j in 0..n.saturating_sub(2) {
                z[j] = self.b[j + 1] * xi + z[j + 1] - self.a[j + 1] * yi;
            }
            if n >= 2 {
                z[n - 2] = self.b[n - 1] * xi - self.a[n - 1] * yi;
            }
            y.push(yi);
        }
        y
    }

    /// Single-direction filtering seeded so a constant input yields no transient.
    pub fn apply_causal(&self, x: &[f64]) -> Result<Vec<f64>> {
        let Some(&x0) = x.first() else {
            return Ok(Vec::new());
        };
        let zi: Vec<f64> = self.steady_state()?.iter().map(|z| z * x0).collect();
        Ok(self.run(x, &zi))
    }

    /// Forward-backward filtering with odd reflection padding (zero phase).
    pub fn apply_zero_phase(&self, x: &[f64]) -> Result<Vec<f64>> {
        let len = x.len();
        if len < 2 {
            return Ok(x.to_vec());
        }
        let padlen = (3 * self.b.len().max(self.a.len())).min(len - 1);
        let first = x[0];
        let last = x[len - 1];

        let mut ext = Vec::with_capacity(len + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=padlen).map(|i| 2.0 * last - x[len - 1 - i]));

        let zi = self.steady_state()?;
        let seeded = |v: f64| zi.iter().map(|z| z * v).collect::<Vec<f64>>();

        let forward = self.run(&ext, &seeded(ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let backward = self.run(&reversed, &seeded(reversed[0]));
        reversed = backward.into_iter().rev().collect();

        Ok(reversed[padlen..padlen + len].to_vec())
    }

    pub fn apply(&self, x: &[f64], zero_phase: bool) -> Result<Vec<f64>> {
        if zero_phase {
            self.apply_zero_phase(x)
        } else {
            self.apply_causal(x)
        }
    }
}

/// One filtering request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff_hz: f64,
    #[serde(default = "default_order")]
    pub order: usize,
    #[serde(default = "default_zero_phase")]
    pub zero_phase: bool,
}

fn default_order() -> usize {
    4
}

fn default_zero_phase() -> bool {
    true
}

impl FilterSpec {
    pub fn lowpass(cutoff_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff_hz,
            order,
            zero_phase: true,
        }
    }

    pub fn highpass(cutoff_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterKind::Highpass,
            cutoff_hz,
            order,
            zero_phase: true,
        }
    }

    pub fn causal(mut self) -> Self {
        self.zero_phase = false;
        self
    }

    pub fn design(&self, sample_rate: f64) -> Result<ButterworthDesign> {
        ButterworthDesign::new(self.kind, self.order, self.cutoff_hz, sample_rate)
    }
}

/// Filter a 1-D signal.
pub fn filter_signal(signal: &[f64], sample_rate: f64, spec: &FilterSpec) -> Result<Vec<f64>> {
    spec.design(sample_rate)?.apply(signal, spec.zero_phase)
}

/// Filter each row of a 2-D batch with the same design.
pub fn filter_rows(rows: &[Vec<f64>], sample_rate: f64, spec: &FilterSpec) -> Result<Vec<Vec<f64>>> {
    let design = spec.design(sample_rate)?;
    rows.iter()
        .map(|row| design.apply(row, spec.zero_phase))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_capped() {
        let design = ButterworthDesign::new(FilterKind::Lowpass, 20, 1.0, 4.0).unwrap();
        assert_eq!(design.order, 3);
        assert_eq!(design.requested_order, 20);
        assert_eq!(design.b.len(), 4);
        assert_eq!(design.a.len(), 4);
    }

    #[test]
    fn test_low_cutoff_keeps_requested_order() {
        let design = ButterworthDesign::new(FilterKind::Lowpass, 4, 0.00625, 4.0).unwrap();
        assert_eq!(design.order, 4);
        assert_eq!(design.b.len(), 5);
        assert_eq!(order_cap(4.0, 1.5), 1);
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = "bandstop".parse::<FilterKind>().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!("highpass".parse::<FilterKind>().unwrap(), FilterKind::Highpass);
    }

    #[test]
    fn test_cutoff_above_nyquist_is_rejected() {
        assert!(ButterworthDesign::new(FilterKind::Lowpass, 4, 2.5, 4.0).is_err());
        assert!(ButterworthDesign::new(FilterKind::Lowpass, 0, 0.5, 4.0).is_err());
    }

    #[test]
    fn test_half_power_at_cutoff() {
        for kind in [FilterKind::Lowpass, FilterKind::Highpass] {
            for order in 1..=5 {
                let design = ButterworthDesign::new(kind, order, 0.1, 4.0).unwrap();
                assert!((design.gain_at(0.1) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
            }
        }
        let lp = ButterworthDesign::new(FilterKind::Lowpass, 4, 0.1, 4.0).unwrap();
        assert!((lp.gain_at(0.0) - 1.0).abs() < 1e-9);
        let hp = ButterworthDesign::new(FilterKind::Highpass, 4, 0.1, 4.0).unwrap();
        assert!(hp.gain_at(0.0) < 1e-9);
    }

    #[test]
    fn test_constant_input_has_no_transient() {
        let x = vec![140.0; 500];
        for zero_phase in [true, false] {
            let spec = FilterSpec {
                zero_phase,
                ..FilterSpec::lowpass(0.0125, 4)
            };
            let y = filter_signal(&x, 4.0, &spec).unwrap();
            assert_eq!(y.len(), x.len());
            assert!(y.iter().all(|v| (v - 140.0).abs() < 1e-4));
        }
    }

    #[test]
    fn test_zero_phase_attenuates_fast_component() {
        let fs = 4.0;
        let x: Vec<f64> = (0..2000)
            .map(|i| {
                let t = i as f64 / fs;
                140.0 + 10.0 * (2.0 * PI * 0.5 * t).sin()
            })
            .collect();
        let y = filter_signal(&x, fs, &FilterSpec::lowpass(0.025, 4)).unwrap();
        let interior = &y[400..1600];
        assert!(interior.iter().all(|v| (v - 140.0).abs() < 0.5));
    }

    #[test]
    fn test_highpass_removes_offset() {
        let x: Vec<f64> = (0..800).map(|i| 50.0 + (i as f64 * 0.9).sin()).collect();
        let y = filter_signal(&x, 4.0, &FilterSpec::highpass(0.05, 2)).unwrap();
        let mean: f64 = y[200..600].iter().sum::<f64>() / 400.0;
        assert!(mean.abs() < 0.5);
    }

    #[test]
    fn test_short_inputs() {
        let spec = FilterSpec::lowpass(0.1, 4);
        assert!(filter_signal(&[], 4.0, &spec).unwrap().is_empty());
        assert_eq!(filter_signal(&[3.0], 4.0, &spec).unwrap(), vec![3.0]);
        let y = filter_signal(&[1.0, 1.0, 1.0, 1.0], 4.0, &spec).unwrap();
        assert_eq!(y.len(), 4);
    }

    #[test]
    fn test_rows_are_filtered_independently() {
        let rows = vec![vec![120.0; 100], vec![150.0; 100]];
        let out = filter_rows(&rows, 4.0, &FilterSpec::lowpass(0.05, 2)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].iter().all(|v| (v - 120.0).abs() < 1e-6));
        assert!(out[1].iter().all(|v| (v - 150.0).abs() < 1e-6));
    }
}
