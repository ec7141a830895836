use crate::cli::ProcessArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use crate::report::ConditioningReport;
use std::time::Instant;

pub fn execute(args: ProcessArgs) -> i32 {
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let conditioner = match params::build_conditioner(&args.conditioning) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let recording = match ctg_rs::load_recording(&args.file, args.conditioning.sr) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !args.quiet {
        eprintln!("Conditioning {}...", args.file);
        eprintln!(
            "  Samples: {} ({:.1} min at {} Hz)",
            recording.len(),
            recording.duration_minutes(),
            recording.sample_rate
        );
    }

    let start_time = Instant::now();
    let result = match conditioner.condition(&recording) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: Conditioning failed: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if !args.quiet {
        for diagnostic in &result.diagnostics {
            eprintln!("  Warning: {:?}", diagnostic);
        }
        eprintln!(
            "  Done in {:.2}s, {:.1}% valid",
            start_time.elapsed().as_secs_f64(),
            result.valid_fraction() * 100.0
        );
    }

    let report = ConditioningReport::new(&args.file, recording.sample_rate, &result);
    let json = match output::to_json(&report, args.compact) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    exit_codes::SUCCESS
}
