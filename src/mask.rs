//! FHR validity masking and mask dilation.
//!
//! The adaptive mask follows the Dawes-Redman style rule: a sample is rejected
//! when it leaves a band around the mean of the last two accepted samples, and
//! the rejected sample plus its two successors are blacked out.

use crate::error::Result;
use crate::stats;
use crate::types::{DilationOptions, MaskMethod, MaskOptions, ValidityMask};

/// Samples invalidated by one rejected jump, the jump itself included.
const JUMP_BLACKOUT: usize = 3;

/// Rolling two-sample reference threaded through the forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RollingReference {
    first: f64,
    second: f64,
}

impl RollingReference {
    fn threshold(&self) -> f64 {
        (self.first + self.second) / 2.0
    }

    fn accepts(&self, sample: f64, pct_low: f64, pct_high: f64) -> bool {
        let threshold = self.threshold();
        sample >= pct_low * threshold && sample <= pct_high * threshold
    }

    fn advance(&mut self, sample: f64) {
        self.first = self.second;
        self.second = sample;
    }
}

/// Validity derived from the dropout sentinel alone.
pub fn sentinel_mask(fhr: &[f64]) -> Vec<bool> {
    fhr.iter().map(|&v| v > 0.0).collect()
}

/// Flag physiologically implausible FHR samples.
///
/// # Arguments
/// * `fhr` - Raw FHR samples, 0 marks a dropout
/// * `sample_rate` - Samples per second, used to size the reference window
/// * `options` - Thresholds and method
///
/// # Returns
/// The mask (`true` = trustworthy) and whether a rolling reference could be seeded
pub fn compute_validity_mask(
    fhr: &[f64],
    sample_rate: f64,
    options: &MaskOptions,
) -> Result<ValidityMask> {
    options.validate()?;
    let input = sentinel_mask(fhr);

    if options.method == MaskMethod::Basic {
        return Ok(ValidityMask {
            mask: input,
            seeded: true,
        });
    }

    if fhr.len() <= 2 {
        let seeded = input.iter().any(|&v| v);
        return Ok(ValidityMask {
            mask: input,
            seeded,
        });
    }

    let window = ((options.reference_window_secs * sample_rate).round() as usize).max(1);
    let Some(mut reference) = seed_reference(fhr, &input, window) else {
        log::warn!("No reference window contains valid FHR, returning sentinel mask");
        return Ok(ValidityMask {
            mask: input,
            seeded: false,
        });
    };

    let mut output = input.clone();
    let mut rejected = 0usize;
    for i in 2..fhr.len() {
        if !input[i] {
            continue;
        }
        let sample = fhr[i];
        if reference.accepts(sample, options.pct_low, options.pct_high) {
            reference.advance(sample);
        } else {
            let end = (i + JUMP_BLACKOUT).min(output.len());
            output[i..end].fill(false);
            rejected += 1;
        }
    }

    log::debug!(
        "Validity mask: {} of {} samples valid, {} jumps rejected",
        output.iter().filter(|&&v| v).count(),
        output.len(),
        rejected
    );

    Ok(ValidityMask {
        mask: output,
        seeded: true,
    })
}

/// Initial reference from the first two samples, replacing any dropout with
/// the median of the first reference window that holds valid data.
fn seed_reference(fhr: &[f64], valid: &[bool], window: usize) -> Option<RollingReference> {
    if valid[0] && valid[1] {
        return Some(RollingReference {
            first: fhr[0],
            second: fhr[1],
        });
    }

    let seed = fhr
        .chunks(window)
        .zip(valid.chunks(window))
        .enumerate()
        .find_map(|(k, (values, flags))| {
            let seg = stats::select_valid(values, flags);
            if seg.is_empty() {
                return None;
            }
            if k > 0 {
                log::debug!("Reference seeded from window starting at sample {}", k * window);
            }
            stats::median(&seg)
        })?;

    Some(RollingReference {
        first: if valid[0] { fhr[0] } else { seed },
        second: if valid[1] { fhr[1] } else { seed },
    })
}

/// Widen every invalid sample to `[i - blackout_left, i + blackout_right)`.
///
/// Expansion is driven by the invalid positions of the input mask only, so
/// newly invalidated samples never expand further.
pub fn dilate_mask(mask: &[bool], options: &DilationOptions) -> Vec<bool> {
    let mut output = mask.to_vec();
    let len = mask.len();
    for i in (0..len).filter(|&i| !mask[i]) {
        let start = i.saturating_sub(options.blackout_left);
        let end = i.saturating_add(options.blackout_right).min(len);
        if start < end {
            output[start..end].fill(false);
        }
    }
    output
}
