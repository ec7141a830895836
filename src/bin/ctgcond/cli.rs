use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ctgcond",
    version,
    about = "Cardiotocography signal conditioning tool",
    long_about = "Condition FHR/UC recordings (CSV: time_seconds, fhr[, uc]).\n\
                  Produces the validity mask, gap-filled FHR estimate, adaptive baseline\n\
                  and low-pass bands as JSON."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Condition a single recording
    Process(ProcessArgs),
    /// Condition many recordings in parallel
    Batch(BatchArgs),
    /// Parse a recording and report its sample count and quality
    Validate(ValidateArgs),
}

/// Options shared by `process` and `batch`
#[derive(Args, Clone)]
pub struct ConditioningArgs {
    /// Sampling rate in Hz (inferred from the time column when omitted)
    #[arg(long)]
    pub sr: Option<f64>,

    /// JSON file holding conditioning options; missing fields keep their defaults
    #[arg(long, env = "CTG_CONFIG")]
    pub config: Option<String>,

    /// Include the accepted baseline anchor points in the output
    #[arg(long, default_value_t = false)]
    pub include_points: bool,

    /// Fill gaps with a cubic smoothing spline instead of linear interpolation
    #[arg(long, default_value_t = false)]
    pub spline: bool,

    /// Decimate the filled series by this factor (e.g. 4 for 4 Hz to 1 Hz)
    #[arg(long)]
    pub decimate: Option<usize>,
}

#[derive(Args)]
pub struct ProcessArgs {
    /// Input recording path (CSV/TXT)
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub conditioning: ConditioningArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting input recordings (e.g. "data/*.csv")
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input recordings
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    #[command(flatten)]
    pub conditioning: ConditioningArgs,

    /// Write one `<stem>_conditioned.json` per recording here (default: JSONL on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Worker threads (default: one per core)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Compact JSON in per-file outputs
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// List the matched recordings and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input recording path
    #[arg(long)]
    pub file: String,

    /// Sampling rate in Hz (inferred when omitted)
    #[arg(long)]
    pub sr: Option<f64>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
