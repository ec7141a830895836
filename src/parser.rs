use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{CtgError, Result};
use crate::stats;
use crate::types::Recording;

/// Parse a CSV/whitespace separated recording.
///
/// Each data row is `time_seconds, fhr[, uc]`. Lines starting with `#` and a
/// non-numeric header row are skipped. Empty or NaN cells become the dropout
/// sentinel 0. Rows whose column count differs from the first data row are
/// skipped.
///
/// # Arguments
/// * `content` - File contents
/// * `sample_rate` - Samples per second; inferred from the median time step when `None`
///
/// # Returns
/// A validated `Recording` with timestamps in minutes
pub fn parse_recording(content: &str, sample_rate: Option<f64>) -> Result<Recording> {
    let mut times = Vec::new();
    let mut fhr = Vec::new();
    let mut uc = Vec::new();
    let mut col_count = 0usize;
    let mut row_count = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let cells: Vec<&str> = if trimmed.contains(',') {
            trimmed.split(',').map(str::trim).collect()
        } else {
            trimmed.split_whitespace().collect()
        };

        let Some(values) = parse_cells(&cells) else {
            if row_count == 0 {
                log::debug!("Skipping header row: {}", trimmed);
            } else {
                log::warn!("Line {} is not numeric, skipping", line_no + 1);
            }
            continue;
        };

        if row_count == 0 {
            col_count = values.len();
            if !(2..=3).contains(&col_count) {
                return Err(CtgError::ParseError(format!(
                    "expected 2 or 3 columns (time, fhr[, uc]), found {}",
                    col_count
                )));
            }
        } else if values.len() != col_count {
            log::warn!(
                "Line {} has inconsistent column count ({} vs {}), skipping",
                line_no + 1,
                values.len(),
                col_count
            );
            continue;
        }

        times.push(values[0]);
        fhr.push(values[1]);
        if col_count == 3 {
            uc.push(values[2]);
        }
        row_count += 1;
    }

    if row_count == 0 {
        return Err(CtgError::ParseError(
            "No valid data found in recording".to_string(),
        ));
    }

    let sample_rate = match sample_rate {
        Some(rate) => rate,
        None => infer_sample_rate(&times)?,
    };

    log::info!(
        "Loaded recording: {} samples, {} columns, {} Hz",
        row_count,
        col_count,
        sample_rate
    );

    let timestamps = times.iter().map(|t| t / 60.0).collect();
    let uc = (col_count == 3).then_some(uc);
    Recording::new(fhr, uc, timestamps, sample_rate)
}

/// Numeric cells of a row; empty and NaN cells map to 0. `None` if any cell
/// is not a number.
fn parse_cells(cells: &[&str]) -> Option<Vec<f64>> {
    cells
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                return Some(0.0);
            }
            let v = cell.parse::<f64>().ok()?;
            Some(if v.is_finite() { v } else { 0.0 })
        })
        .collect()
}

fn infer_sample_rate(times: &[f64]) -> Result<f64> {
    let steps: Vec<f64> = times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|dt| *dt > 0.0)
        .collect();
    match stats::median(&steps) {
        Some(dt) => Ok(1.0 / dt),
        None => Err(CtgError::ParseError(
            "cannot infer sample rate from fewer than two distinct timestamps".to_string(),
        )),
    }
}

/// Parse a recording from raw bytes (e.g. a memory map).
pub fn parse_recording_from_bytes(content: &[u8], sample_rate: Option<f64>) -> Result<Recording> {
    let text = std::str::from_utf8(content)
        .map_err(|e| CtgError::ParseError(format!("recording is not valid UTF-8: {}", e)))?;
    parse_recording(text, sample_rate)
}

/// Open a file and map it into memory (read-only)
fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // Safety: the map is read-only and dropped before this module returns.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Load a recording file from disk.
pub fn load_recording<P: AsRef<Path>>(path: P, sample_rate: Option<f64>) -> Result<Recording> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CtgError::FileNotFound(path.display().to_string()));
    }
    if std::fs::metadata(path)?.len() == 0 {
        return Err(CtgError::ParseError(format!(
            "recording file is empty: {}",
            path.display()
        )));
    }
    let mmap = mmap_file(path)?;
    parse_recording_from_bytes(&mmap, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header_and_uc() {
        let content = "# CTU-UHB export\n\
                       time,fhr,uc\n\
                       0.00,140.0,12\n\
                       0.25,NaN,13\n\
                       0.50,142.5,\n\
                       0.75,143.0,15\n";
        let rec = parse_recording(content, None).unwrap();
        assert_eq!(rec.len(), 4);
        assert_eq!(rec.sample_rate, 4.0);
        assert_eq!(rec.fhr, vec![140.0, 0.0, 142.5, 143.0]);
        assert_eq!(rec.uc, Some(vec![12.0, 13.0, 0.0, 15.0]));
        assert!((rec.timestamps[3] - 0.75 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_whitespace_without_uc() {
        let content = "0 140\n1 141\n2 139 7\n3 0\n";
        let rec = parse_recording(content, Some(1.0)).unwrap();
        assert_eq!(rec.fhr, vec![140.0, 141.0, 0.0]);
        assert!(rec.uc.is_none());
    }

    #[test]
    fn test_parse_empty_content() {
        let content = "# Only comments\n# More comments\n";
        assert!(parse_recording(content, None).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        assert!(parse_recording("0,1,2,3\n1,2,3,4\n", None).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_recording("/nonexistent/recording.csv", None);
        assert!(matches!(result, Err(CtgError::FileNotFound(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.csv");
        std::fs::write(&path, "0,140\n0.25,141\n0.5,142\n").unwrap();
        let rec = load_recording(&path, None).unwrap();
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.sample_rate, 4.0);
    }
}
