//! Wafer CLI - command-line and HTTP front end for wafer fault detection
//!
//! This CLI provides a `wafer` command that trains the fault classifier from
//! the sensor document store, labels sensor files with the trained model and
//! serves both operations over HTTP.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{predict, seed, serve, train};

/// Wafer CLI - sensor-based wafer fault detection
#[derive(Parser, Debug)]
#[command(
    name = "wafer",
    author,
    version,
    about = "Wafer - sensor-based wafer fault detection",
    long_about = "Trains a Good/Bad wafer classifier from sensor records held in a document store,\nlabels new sensor files with it, and serves both over HTTP."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Path to wafer.toml (defaults to ./wafer.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train, gate and persist a model from the document store
    ///
    /// Runs ingestion, transformation and model selection, then writes the
    /// scaler, model and training manifest under `artifacts/`.
    Train {
        /// Output the training manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Label every row of a sensor CSV with the trained model
    ///
    /// Writes `predictions/predictions_file.csv` with a `Good/Bad` column.
    Predict {
        /// Sensor CSV to label
        file: PathBuf,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a sensor CSV into the document store
    Seed {
        /// Sensor CSV with the sensor columns and the `Good/Bad` label
        file: PathBuf,

        /// Remove the collection's existing documents first
        #[arg(long)]
        replace: bool,
    },

    /// Serve training and prediction over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let config = args.config.as_deref();
    match command {
        Command::Train { json } => train::execute(config, json).await?,
        Command::Predict { file, json } => predict::execute(config, &file, json).await?,
        Command::Seed { file, replace } => seed::execute(config, &file, replace)?,
        Command::Serve { addr } => serve::execute(config, &addr).await?,
    }

    Ok(())
}
