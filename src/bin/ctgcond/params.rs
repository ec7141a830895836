use crate::cli::ConditioningArgs;
use ctg_rs::{Conditioner, ConditioningOptions, InterpolationMode};
use std::path::Path;

/// Build the conditioning options from an optional JSON document plus flags.
pub fn build_options(args: &ConditioningArgs) -> Result<ConditioningOptions, String> {
    let mut options = match args.config {
        Some(ref path) => load_config(path)?,
        None => ConditioningOptions::default(),
    };

    if args.include_points {
        options.baseline.include_points = true;
    }
    if let Some(factor) = args.decimate {
        options.decimation = Some(factor);
    }
    if args.spline && options.interpolation == InterpolationMode::Linear {
        options.interpolation = InterpolationMode::SmoothingSpline { smoothing: None };
    }
    Ok(options)
}

/// Validated conditioner for the given arguments.
pub fn build_conditioner(args: &ConditioningArgs) -> Result<Conditioner, String> {
    let options = build_options(args)?;
    Conditioner::new(options).map_err(|e| e.to_string())
}

fn load_config(path: &str) -> Result<ConditioningOptions, String> {
    let content = std::fs::read_to_string(Path::new(path))
        .map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Invalid config '{}': {}", path, e))
}

/// Check a recording path before loading it.
pub fn validate_file(file: &str) -> Result<(), String> {
    let path = Path::new(file);
    if !path.exists() {
        return Err(format!("File not found: {}", file));
    }
    if !path.is_file() {
        return Err(format!("Not a file: {}", file));
    }
    Ok(())
}
