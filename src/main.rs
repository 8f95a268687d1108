//! Batch Inference CLI
//!
//! Cleans a CSV of raw records, runs a trained pipeline over it, and writes the
//! cleaned table with its predictions.

use anyhow::{Context, Result};
use batch_inference::{
    config::{AppConfig, LoggingConfig, RunConfig, DEFAULT_OUTPUT_PATH},
    BatchRunner, StageError,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "infer_pipeline")]
#[command(about = "Clean a CSV and run a trained pipeline over every record", long_about = None)]
struct Cli {
    /// Raw input CSV
    #[arg(long)]
    csv: PathBuf,

    /// Trained pipeline artifact
    #[arg(long)]
    pkl: PathBuf,

    /// Output CSV
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    out: PathBuf,

    /// Identifier column kept at the front of the output (empty to disable)
    #[arg(long = "id-col", default_value = "ID")]
    id_col: String,

    /// Rows shown in the prediction preview
    #[arg(long, default_value = "10")]
    head: usize,

    /// Settings file (defaults to config/inference.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = preflight(&cli) {
        eprintln!("error: {e}");
        return ExitCode::from(1);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<StageError>() {
                Some(stage_err) => {
                    error!(stage = %stage_err.stage, error = %stage_err.source, "Run failed");
                    eprintln!("error: {stage_err}");
                }
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::from(2)
        }
    }
}

/// Input paths must exist before any stage runs.
fn preflight(cli: &Cli) -> Result<()> {
    if !cli.csv.exists() {
        anyhow::bail!("input CSV not found: {}", cli.csv.display());
    }
    if !cli.pkl.exists() {
        anyhow::bail!("pipeline artifact not found: {}", cli.pkl.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => AppConfig::load()?,
    };

    init_logging(&config.logging, cli.verbose)?;
    info!("Starting batch inference");

    let run_config = RunConfig::new(cli.csv, cli.pkl)
        .with_output(cli.out)
        .with_id_column(Some(cli.id_col))
        .with_preview_rows(cli.head);

    let report = BatchRunner::new(&config).run(&run_config)?;

    info!(
        out = %report.output.display(),
        rows = report.rows_written,
        "Batch inference complete"
    );
    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("batch_inference={level}")
            .parse()
            .context("Invalid log level")?,
    );

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
