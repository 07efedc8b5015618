//! skinmap-bench: CLI tool for running payloads through the normalizer.
//!
//! Normalizes a payload file with configurable limits, printing
//! per-stage diagnostics. Useful for:
//!
//! - Checking why a captured payload was rejected or lost regions
//! - Tuning the geometric epsilon and list caps
//! - Measuring per-stage durations on large payloads
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin skinmap-bench -- [OPTIONS] <PAYLOAD_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to see every dropped region and omitted mask.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use skinmap_pipeline::NormalizeConfig;
use skinmap_pipeline::diagnostics::{Clock, NormalizeDiagnostics, normalize_with_diagnostics};

/// Payload normalization diagnostics for skinmap.
///
/// Runs the normalizer on a JSON payload and prints per-stage timing
/// and count diagnostics.
#[derive(Parser)]
#[command(name = "skinmap-bench", version)]
struct Cli {
    /// Path to the input payload (JSON).
    payload_path: PathBuf,

    /// Distance and area below which geometry counts as degenerate.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_EPSILON)]
    epsilon: f64,

    /// Maximum polygon vertex count.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_MAX_POLYGON_POINTS)]
    max_polygon_points: usize,

    /// Maximum module mask cell count.
    #[arg(long, default_value_t = NormalizeConfig::DEFAULT_MAX_MASK_CELLS)]
    max_mask_cells: usize,

    /// Number of runs (for timing statistics).
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Write the normalized outcome as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Full normalize config as a JSON string.
    ///
    /// When provided, all other config flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`NormalizeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<NormalizeConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        NormalizeConfig {
            epsilon: cli.epsilon,
            max_polygon_points: cli.max_polygon_points,
            max_mask_cells: cli.max_mask_cells,
            ..NormalizeConfig::default()
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let text = match std::fs::read_to_string(&cli.payload_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.payload_path.display());
            return ExitCode::FAILURE;
        }
    };
    let payload: serde_json::Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", cli.payload_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Payload: {} ({} bytes)",
        cli.payload_path.display(),
        text.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (outcome, diagnostics) = match normalize_with_diagnostics(&payload, &config, &StdClock) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Normalize error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
            for error in outcome.error_strings() {
                println!("  error: {error}");
            }
            for drop in &outcome.sanitizer_drops {
                println!(
                    "  dropped: {} ({:?}, {:?})",
                    drop.region_id, drop.region_type, drop.reason
                );
            }
        }

        // Write the outcome on the first run only.
        if run == 0
            && let Some(ref output_path) = cli.output
        {
            match write_outcome(output_path, &outcome) {
                Ok(len) => {
                    log::info!("outcome written to {} ({len} bytes)", output_path.display());
                }
                Err(e) => {
                    eprintln!("Error writing outcome to {}: {e}", output_path.display());
                }
            }
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Serialize `outcome` as pretty JSON to `path`, returning the byte count.
fn write_outcome(
    path: &std::path::Path,
    outcome: &skinmap_pipeline::NormalizeOutcome,
) -> Result<usize, String> {
    let json = serde_json::to_string_pretty(outcome).map_err(|e| e.to_string())?;
    std::fs::write(path, &json).map_err(|e| e.to_string())?;
    Ok(json.len())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&NormalizeDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[NormalizeDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(32));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Validate", |d| Some(d.validate.duration)),
        ("Sanitize", |d| d.sanitize.as_ref().map(|s| s.duration)),
        ("Resolve", |d| d.resolve.as_ref().map(|s| s.duration)),
        ("Normalize", |d| d.normalize.as_ref().map(|s| s.duration)),
        ("Masks", |d| d.masks.as_ref().map(|s| s.duration)),
        ("Finish", |d| d.finish.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
