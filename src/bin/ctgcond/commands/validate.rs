use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use ctg_rs::{compute_validity_mask, load_recording, MaskOptions};
use serde::Serialize;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    valid: bool,
    samples: Option<usize>,
    sample_rate: Option<f64>,
    duration_minutes: Option<f64>,
    has_uc: Option<bool>,
    /// Fraction of samples accepted by the adaptive validity mask
    valid_fraction: Option<f64>,
    error: Option<String>,
}

impl ValidateOutput {
    fn failed(file: &str, error: String) -> Self {
        Self {
            file: file.to_string(),
            valid: false,
            samples: None,
            sample_rate: None,
            duration_minutes: None,
            has_uc: None,
            valid_fraction: None,
            error: Some(error),
        }
    }
}

fn inspect(args: &ValidateArgs) -> ValidateOutput {
    let recording = match load_recording(&args.file, args.sr) {
        Ok(r) => r,
        Err(e) => return ValidateOutput::failed(&args.file, e.to_string()),
    };
    let mask = match compute_validity_mask(
        &recording.fhr,
        recording.sample_rate,
        &MaskOptions::default(),
    ) {
        Ok(m) => m,
        Err(e) => return ValidateOutput::failed(&args.file, e.to_string()),
    };

    let valid_fraction = if recording.is_empty() {
        0.0
    } else {
        mask.valid_count() as f64 / recording.len() as f64
    };

    ValidateOutput {
        file: args.file.clone(),
        valid: true,
        samples: Some(recording.len()),
        sample_rate: Some(recording.sample_rate),
        duration_minutes: Some(recording.duration_minutes()),
        has_uc: Some(recording.uc.is_some()),
        valid_fraction: Some(valid_fraction),
        error: None,
    }
}

pub fn execute(args: ValidateArgs) -> i32 {
    let result = inspect(&args);

    if args.json {
        match output::to_json(&result, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "Recording '{}' is valid ({} samples, {} Hz, {:.1}% valid FHR)",
            args.file,
            result.samples.unwrap_or(0),
            result.sample_rate.unwrap_or_default(),
            result.valid_fraction.unwrap_or_default() * 100.0
        );
    }

    if result.error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
