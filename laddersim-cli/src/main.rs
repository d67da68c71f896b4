//! laddersim CLI: run simulations from contract files.
//!
//! Commands:
//! - `run`: execute one `SimInput` and print its outcome as JSON
//! - `batch`: execute many inputs on a bounded thread pool
//! - `compile-overlay`: show what an exit overlay compiles to
//!
//! Logs go to stderr (`RUST_LOG` controls the level); results go to stdout
//! or `--output`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use laddersim_core::domain::CandleInterval;
use laddersim_core::overlay::{ExitOverlay, OverlayCompiler};
use laddersim_runner::contract::ClockResolution;
use laddersim_runner::{
    load_candles_csv, load_inputs, run_batch, RunError, RunOutcome, RunnerConfig, SimRunner,
};

#[derive(Parser)]
#[command(
    name = "laddersim",
    version,
    about = "laddersim: deterministic ladder-exit trade simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single SimInput and print the outcome.
    Run {
        /// Path to a JSON file holding one SimInput.
        #[arg(long)]
        input: PathBuf,

        /// Runner config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Candle CSV replacing the input's candles (unix-second timestamps).
        #[arg(long)]
        candles: Option<PathBuf>,

        /// Override the input's seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Pretty-print the JSON output.
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Execute many inputs with bounded concurrency.
    Batch {
        /// JSON array or JSON-lines file of SimInputs.
        #[arg(long)]
        inputs: PathBuf,

        /// Runner config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads. Defaults to the config's batch.concurrency.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the batch report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output.
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Compile an exit overlay and print the resulting exit configuration.
    CompileOverlay {
        /// Overlay JSON given inline.
        #[arg(long, conflicts_with = "file")]
        overlay: Option<String>,

        /// File holding the overlay JSON.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Candle interval used to convert time exits into candle counts.
        #[arg(long, default_value = "1m")]
        interval: CandleInterval,

        /// Candles available after the alert; time exits are clamped to it.
        #[arg(long)]
        available: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            config,
            candles,
            seed,
            pretty,
        } => run_single(&input, config.as_deref(), candles.as_deref(), seed, pretty),
        Commands::Batch {
            inputs,
            config,
            concurrency,
            output,
            pretty,
        } => run_batch_cmd(&inputs, config.as_deref(), concurrency, output.as_deref(), pretty),
        Commands::CompileOverlay {
            overlay,
            file,
            interval,
            available,
        } => compile_overlay(overlay, file.as_deref(), interval, available),
    }
}

fn build_runner(config_path: Option<&Path>) -> Result<SimRunner> {
    let config = match config_path {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("loading runner config {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    Ok(SimRunner::new(config)?)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn run_single(
    input_path: &Path,
    config_path: Option<&Path>,
    candles_path: Option<&Path>,
    seed: Option<u64>,
    pretty: bool,
) -> Result<()> {
    let runner = build_runner(config_path)?;
    let mut entries = load_inputs(input_path)?;
    if entries.len() != 1 {
        bail!(
            "{} holds {} inputs; use `batch` for more than one",
            input_path.display(),
            entries.len()
        );
    }
    let mut input = match entries.remove(0).into_input() {
        Ok(input) => input,
        Err(bad) => {
            let outcome = RunOutcome::failure(&bad.run_id, &RunError::from(bad.clone()));
            println!("{}", to_json(&outcome, pretty)?);
            eprintln!("Input {} rejected: {bad}", bad.run_id);
            std::process::exit(1);
        }
    };

    if let Some(path) = candles_path {
        let loaded = load_candles_csv(path)?;
        info!(
            candles = loaded.candles.len(),
            dataset_hash = %loaded.dataset_hash,
            "using candles from CSV"
        );
        input.candles = loaded.candles;
        input.clock_resolution = ClockResolution::Seconds;
    }
    if seed.is_some() {
        input.seed = seed;
    }

    let outcome = runner.run_one(&input);
    println!("{}", to_json(&outcome, pretty)?);

    if let RunOutcome::Error { code, message, .. } = &outcome {
        eprintln!("Run {} failed [{code}]: {message}", input.run_id);
        std::process::exit(1);
    }
    Ok(())
}

fn run_batch_cmd(
    inputs_path: &Path,
    config_path: Option<&Path>,
    concurrency: Option<usize>,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let runner = build_runner(config_path)?;
    let entries = load_inputs(inputs_path)?;
    let report = run_batch(&runner, &entries, concurrency, None)?;
    let json = to_json(&report, pretty)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    eprintln!(
        "{} runs: {} ok, {} failed, {} cancelled in {} ms",
        report.outcomes.len(),
        report.succeeded,
        report.failed,
        report.cancelled,
        report.elapsed_ms
    );
    Ok(())
}

fn compile_overlay(
    inline: Option<String>,
    file: Option<&Path>,
    interval: CandleInterval,
    available: Option<usize>,
) -> Result<()> {
    let raw = match (inline, file) {
        (Some(json), None) => json,
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("reading overlay {}", path.display()))?,
        _ => bail!("one of --overlay or --file is required"),
    };
    let overlay: ExitOverlay = serde_json::from_str(&raw).context("parsing overlay JSON")?;

    let mut compiler = OverlayCompiler::new(interval);
    if let Some(n) = available {
        compiler = compiler.with_available_candles(n);
    }
    let compiled = compiler.compile(&overlay)?;
    println!("{}", to_json(&compiled, true)?);
    Ok(())
}
