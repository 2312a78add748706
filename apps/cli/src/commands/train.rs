//! Training command implementation.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use wafer_training::{PipelineConfig, TrainingManifest, TrainingPipeline};

pub async fn execute(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let manifest = run_training(config).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Run:   {}", manifest.run_id.to_string().cyan());
    println!("  Model: {}", manifest.model_name.cyan());
    println!("  Score: {:.4}", manifest.accuracy);
    println!();
    for score in manifest.report.scores() {
        println!("  {:<32} {:.4}", score.model, score.accuracy);
    }
    println!();
    Ok(())
}

/// Run the full training pipeline off the async runtime.
pub async fn run_training(config: PipelineConfig) -> Result<TrainingManifest> {
    let manifest = tokio::task::spawn_blocking(move || -> Result<TrainingManifest> {
        let pipeline = TrainingPipeline::from_config(config).context("Failed to open the training pipeline")?;
        Ok(pipeline.run_with_manifest()?)
    })
    .await
    .context("Training task panicked")??;
    Ok(manifest)
}
