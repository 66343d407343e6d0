//! sieve-curate CLI - Dataset curation for supervised fine-tuning.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use sieve_curate::io::{REPORT_FILE, TRAIN_FILE, VAL_FILE};
use sieve_curate::{
    read_input, write_json_pretty, write_records_jsonl, CancelToken, CandidateSource, Category,
    CurateConfig, CurateError, CurationReport, Curator, DedupScope, JsonlSource, MemorySource,
    RawRecord, ReadinessStatus,
};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit code for a run whose output must not be used.
const EXIT_NOT_READY: i32 = 2;

/// Dataset curation for supervised fine-tuning.
///
/// Validates, deduplicates, balances and splits training samples into
/// leakage-free train/val partitions, and writes a readiness report.
#[derive(Parser, Debug)]
#[command(name = "sieve-curate")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input dataset (JSONL, or a JSON array with a .json extension).
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory for train.jsonl, val.jsonl and report.json.
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// JSON configuration file. Flags override its values.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fraction of records placed in validation, in (0, 1).
    #[arg(long)]
    val_fraction: Option<f64>,

    /// Split shuffle seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Minimum input length in characters.
    #[arg(long)]
    min_input_chars: Option<usize>,

    /// Hamming distance at or below which inputs are near-duplicates.
    #[arg(long)]
    near_dup_threshold: Option<u32>,

    /// Drop near-duplicates instead of only reporting them.
    #[arg(long)]
    remove_near_duplicates: bool,

    /// Deduplicate exact inputs across categories.
    #[arg(long)]
    global_dedup: bool,

    /// Target record count for a category (repeatable).
    #[arg(long = "target", value_name = "CATEGORY=N", value_parser = parse_target)]
    targets: Vec<(Category, usize)>,

    /// Candidate source for balancing, in priority order (repeatable).
    #[arg(long = "source", value_name = "NAME=PATH", value_parser = parse_source)]
    sources: Vec<(String, PathBuf)>,

    /// Synthetic candidate source, tried after regular sources (repeatable).
    #[arg(long = "synthetic-source", value_name = "NAME=PATH", value_parser = parse_source)]
    synthetic_sources: Vec<(String, PathBuf)>,

    /// Share of a category's remaining need one source may fill (repeatable).
    #[arg(long = "source-cap", value_name = "NAME=FRACTION", value_parser = parse_cap)]
    source_caps: Vec<(String, f64)>,

    /// Let synthetic sources contribute to balancing.
    #[arg(long)]
    allow_synthetic: bool,

    /// Only write the report, not the partitions.
    #[arg(long)]
    stats_only: bool,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Show a progress spinner.
    #[arg(long)]
    progress: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn parse_target(s: &str) -> Result<(Category, usize), String> {
    let (category, count) = split_pair(s)?;
    let category = category.parse::<Category>()?;
    let count = count
        .parse::<usize>()
        .map_err(|e| format!("invalid target count '{count}': {e}"))?;
    Ok((category, count))
}

fn parse_source(s: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = split_pair(s)?;
    Ok((name.to_string(), PathBuf::from(path)))
}

fn parse_cap(s: &str) -> Result<(String, f64), String> {
    let (name, cap) = split_pair(s)?;
    let cap = cap
        .parse::<f64>()
        .map_err(|e| format!("invalid cap '{cap}': {e}"))?;
    Ok((name.to_string(), cap))
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(args: &Cli) -> Result<CurateConfig, CurateError> {
    let mut config = match &args.config {
        Some(path) => CurateConfig::from_json_file(path)?,
        None => CurateConfig::default(),
    };

    if let Some(v) = args.val_fraction {
        config.val_fraction = v;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(n) = args.min_input_chars {
        config.min_input_chars = n;
    }
    if let Some(t) = args.near_dup_threshold {
        config.near_dup.threshold = t;
    }
    if args.remove_near_duplicates {
        config.near_dup.remove = true;
    }
    if args.global_dedup {
        config.dedup_scope = DedupScope::Global;
    }
    if args.allow_synthetic {
        config.balance.allow_synthetic = true;
    }
    for &(category, count) in &args.targets {
        config.targets.insert(category, count);
    }
    for (name, cap) in &args.source_caps {
        config.balance.source_caps.insert(name.clone(), *cap);
    }

    config.validate()?;
    Ok(config)
}

/// Open candidate sources in priority order. A source that cannot be read
/// stays in the list as a failing source so the report records it.
fn open_sources(args: &Cli) -> Vec<Box<dyn CandidateSource>> {
    let regular = args.sources.iter().map(|s| (s, false));
    let synthetic = args.synthetic_sources.iter().map(|s| (s, true));

    regular
        .chain(synthetic)
        .map(|((name, path), is_synthetic)| -> Box<dyn CandidateSource> {
            match JsonlSource::open(name.clone(), path) {
                Ok(source) if is_synthetic => Box::new(source.synthetic()),
                Ok(source) => Box::new(source),
                Err(e) => {
                    warn!(source = %name, error = %e, "cannot open candidate source");
                    let mut failed = MemorySource::new(name.clone()).failing(e.to_string());
                    for category in Category::ALL {
                        failed.push(category, Vec::<RawRecord>::new());
                    }
                    Box::new(failed)
                }
            }
        })
        .collect()
}

fn print_summary(report: &CurationReport, out_dir: &std::path::Path, elapsed: f64, stats_only: bool) {
    eprintln!();
    eprintln!("Curation Results:");
    eprintln!("  Status:            {}", report.status);
    eprintln!("  Input records:     {}", report.input_records);
    eprintln!("  Accepted:          {}", report.accepted());
    eprintln!("  Train / val:       {} / {}", report.split.train_records, report.split.val_records);
    eprintln!(
        "  Val fraction:      {:.4} (requested {:.4})",
        report.split.realized_val_fraction, report.split.requested_val_fraction
    );
    eprintln!("  Leakage groups:    {}", report.split.leakage_groups);
    eprintln!(
        "  Near-dup pairs:    {} ({} items flagged of {} sampled)",
        report.near_duplicates.overall.pairs,
        report.near_duplicates.overall.flagged_items,
        report.near_duplicates.overall.sampled
    );
    if let Some(ratio) = report.balance_ratio {
        eprintln!("  Balance ratio:     {ratio:.2}");
    }

    if !report.categories.is_empty() {
        eprintln!();
        eprintln!("Categories:");
        for (category, c) in &report.categories {
            let target = c.target.map_or_else(|| "-".to_string(), |t| t.to_string());
            eprintln!(
                "  {:<11} accepted {:>7}  target {:>7}  shortfall {:>6}  dupes {:>5.1}%",
                category.as_str(),
                c.accepted,
                target,
                c.shortfall,
                c.duplicate_rate * 100.0
            );
        }
    }

    if !report.warnings.is_empty() {
        eprintln!();
        eprintln!("Warnings:");
        for w in &report.warnings {
            eprintln!("  - {w}");
        }
    }

    eprintln!();
    if stats_only {
        eprintln!("(Partitions not written: --stats-only mode)");
    }
    eprintln!("Output: {}", out_dir.display());
    eprintln!("Total time: {elapsed:.3}s");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // Handle completions subcommand
    if let Some(Commands::Completions { shell }) = args.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "sieve-curate", &mut io::stdout());
        return Ok(());
    }

    init_logging(args.verbose);

    let input = args.input.clone().ok_or("Input file is required")?;
    let Some(out_dir) = args.out_dir.clone() else {
        eprintln!("Error: output directory required (use -o/--out-dir)");
        std::process::exit(1);
    };

    let config = build_config(&args).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let curator = Curator::new(config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let start = Instant::now();
    let raw = read_input(&input).unwrap_or_else(|e| {
        eprintln!("Error: cannot read {}: {e}", input.display());
        std::process::exit(1);
    });
    let mut sources = open_sources(&args);

    if args.verbose && !args.json {
        eprintln!("Configuration:");
        eprintln!("  Input: {}", input.display());
        eprintln!("  Output dir: {}", out_dir.display());
        eprintln!("  Val fraction: {}", curator.config().val_fraction);
        eprintln!("  Seed: {}", curator.config().seed);
        eprintln!("  Dedup scope: {}", curator.config().dedup_scope.as_str());
        eprintln!("  Sources: {}", sources.len());
        eprintln!();
    }

    let pb = if args.progress && !args.json {
        Some(create_spinner("Curating dataset..."))
    } else {
        None
    };

    let outcome =
        curator.run_with_progress(raw, &mut sources, &CancelToken::new(), |progress| {
            if let Some(pb) = &pb {
                pb.set_message(format!("Ingested {} records...", progress.processed));
            }
        })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // The report goes first so it survives a failed partition write.
    std::fs::create_dir_all(&out_dir)?;
    write_json_pretty(out_dir.join(REPORT_FILE), &outcome.report)?;
    if !args.stats_only {
        write_records_jsonl(out_dir.join(TRAIN_FILE), &outcome.train)?;
        write_records_jsonl(out_dir.join(VAL_FILE), &outcome.val)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print_summary(
            &outcome.report,
            &out_dir,
            start.elapsed().as_secs_f64(),
            args.stats_only,
        );
    }

    if outcome.report.status == ReadinessStatus::NotReady {
        std::process::exit(EXIT_NOT_READY);
    }
    Ok(())
}
