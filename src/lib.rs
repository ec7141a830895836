pub mod baseline;
pub mod error;
pub mod filter;
pub mod gap_fill;
pub mod mask;
pub mod parser;
pub mod pipeline;
pub mod resample;
pub mod spline;
pub mod stats;
pub mod types;

pub use baseline::{estimate_baseline, scan_segments};
pub use error::{CtgError, Result};
pub use filter::{filter_rows, filter_signal, ButterworthDesign, FilterKind, FilterSpec};
pub use gap_fill::{clamp_range, fill_gaps};
pub use mask::{compute_validity_mask, dilate_mask};
pub use parser::{load_recording, parse_recording};
pub use pipeline::{condition_recording, Conditioner};
pub use resample::{downsample, Decimated};
pub use spline::SmoothingSpline;
pub use types::*;
