//! Mask-aware decimation.

use serde::{Deserialize, Serialize};

use crate::error::{check_len, CtgError, Result};
use crate::filter::{ButterworthDesign, FilterKind};

/// Order of the anti-aliasing low-pass before the cap.
const ANTI_ALIAS_ORDER: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decimated {
    pub signal: Vec<f64>,
    pub mask: Vec<bool>,
    pub timestamps: Vec<f64>,
    pub sample_rate: f64,
}

/// Reduce the sample rate by an integer `factor`.
///
/// The signal is low-passed at 80% of the new Nyquist frequency with a
/// zero-phase Butterworth filter, then every `factor`-th sample is kept. A
/// decimated sample is valid when more than half of its source block was.
pub fn downsample(
    signal: &[f64],
    mask: &[bool],
    timestamps: &[f64],
    sample_rate: f64,
    factor: usize,
) -> Result<Decimated> {
    check_len("mask", signal.len(), mask.len())?;
    check_len("timestamps", signal.len(), timestamps.len())?;
    if factor == 0 {
        return Err(CtgError::InvalidConfiguration(
            "decimation factor must be at least 1".to_string(),
        ));
    }
    if factor == 1 {
        return Ok(Decimated {
            signal: signal.to_vec(),
            mask: mask.to_vec(),
            timestamps: timestamps.to_vec(),
            sample_rate,
        });
    }

    let cutoff = 0.8 * (sample_rate / 2.0) / factor as f64;
    let design = ButterworthDesign::new(FilterKind::Lowpass, ANTI_ALIAS_ORDER, cutoff, sample_rate)?;
    let filtered = design.apply_zero_phase(signal)?;

    let n = signal.len() / factor;
    let half = factor as f64 / 2.0;

    Ok(Decimated {
        signal: filtered.iter().step_by(factor).take(n).copied().collect(),
        mask: mask
            .chunks_exact(factor)
            .map(|block| block.iter().filter(|&&v| v).count() as f64 > half)
            .collect(),
        timestamps: timestamps.iter().step_by(factor).take(n).copied().collect(),
        sample_rate: sample_rate / factor as f64,
    })
}
