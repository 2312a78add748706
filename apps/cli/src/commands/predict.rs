//! Prediction command implementation.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use wafer_training::{PipelineConfig, PredictionFile, PredictionPipeline, UploadedFile, open_run_log};

pub async fn execute(config_path: Option<&Path>, file: &Path, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let upload =
        UploadedFile::from_path(file).with_context(|| format!("Failed to read sensor file: {}", file.display()))?;
    let output = run_prediction(config, upload).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({ "name": output.name, "path": output.path }))?);
        return Ok(());
    }

    println!();
    println!("{}", "Prediction complete".bold().green());
    println!("  Output: {}", output.path.display().to_string().cyan());
    println!();
    Ok(())
}

/// Label `upload` with the persisted artifacts off the async runtime.
pub async fn run_prediction(config: PipelineConfig, upload: UploadedFile) -> Result<PredictionFile> {
    let output = tokio::task::spawn_blocking(move || -> Result<PredictionFile> {
        let schema = config.schema().context("Failed to load the sensor schema")?;
        let layout = config.layout();
        let log = open_run_log(&config).context("Failed to open the run log")?;
        Ok(PredictionPipeline::new(&layout, &schema, log).run(&upload)?)
    })
    .await
    .context("Prediction task panicked")??;
    Ok(output)
}
