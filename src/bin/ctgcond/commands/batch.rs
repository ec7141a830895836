use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use crate::report::ConditioningReport;
use ctg_rs::Conditioner;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Outcome for one recording: the serialized report, or an error message.
type FileOutcome = Result<String, String>;

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    let conditioner = match params::build_conditioner(&args.conditioning) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = args.jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = match builder.build() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to start worker pool: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let total = files.len();
    let start_time = Instant::now();
    if !args.quiet {
        eprintln!(
            "Conditioning {} recording(s) on {} thread(s)...",
            total,
            pool.current_num_threads()
        );
    }

    let outcomes: Vec<FileOutcome> = pool.install(|| {
        files
            .par_iter()
            .map(|file| condition_file(file, &conditioner, &args))
            .collect()
    });

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for (file, outcome) in files.iter().zip(outcomes) {
        match outcome {
            // Per-file outputs were written by the workers; stdout is JSONL in input order.
            Ok(json) => {
                if args.output_dir.is_none() {
                    if let Err(e) = output::write_output(&json, None) {
                        eprintln!("  {}: {}", file, e);
                        failed += 1;
                        continue;
                    }
                }
                succeeded += 1;
            }
            Err(msg) => {
                eprintln!("  {}: {}", file, msg);
                failed += 1;
            }
        }
    }

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            start_time.elapsed().as_secs_f64()
        );
    }

    summarize(succeeded, failed)
}

fn condition_file(file: &str, conditioner: &Conditioner, args: &BatchArgs) -> FileOutcome {
    params::validate_file(file)?;
    let recording =
        ctg_rs::load_recording(file, args.conditioning.sr).map_err(|e| e.to_string())?;
    let result = conditioner
        .condition(&recording)
        .map_err(|e| format!("Conditioning failed: {}", e))?;
    for diagnostic in &result.diagnostics {
        log::warn!("{}: {:?}", file, diagnostic);
    }

    let report = ConditioningReport::new(file, recording.sample_rate, &result);
    match args.output_dir {
        Some(ref dir) => {
            let json = output::to_json(&report, args.compact)?;
            let out_path = output_path(dir, file);
            output::write_output(&json, out_path.to_str())?;
            log::info!("{} -> {}", file, out_path.display());
            Ok(json)
        }
        None => output::to_json(&report, true),
    }
}

fn output_path(dir: &str, file: &str) -> std::path::PathBuf {
    let stem = Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    Path::new(dir).join(format!("{}_conditioned.json", stem))
}

fn summarize(succeeded: usize, failed: usize) -> i32 {
    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths =
        glob::glob(pattern).map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_exit_codes() {
        assert_eq!(summarize(3, 0), exit_codes::SUCCESS);
        assert_eq!(summarize(2, 1), exit_codes::PARTIAL_FAILURE);
        assert_eq!(summarize(0, 2), exit_codes::EXECUTION_ERROR);
    }

    #[test]
    fn test_output_path_uses_stem() {
        let path = output_path("/tmp/out", "data/1001.csv");
        assert_eq!(path, Path::new("/tmp/out/1001_conditioned.json"));
    }

    #[test]
    fn test_resolve_glob_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv", "c.txt"] {
            std::fs::write(dir.path().join(name), "0,140\n").unwrap();
        }
        let pattern = format!("{}/*.csv", dir.path().display());
        let files = resolve_glob(&pattern).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.csv"));
        assert!(files[1].ends_with("b.csv"));
    }

    #[test]
    fn test_invalid_glob_pattern() {
        assert!(resolve_glob("[").is_err());
    }
}
