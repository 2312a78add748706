//! Command implementations for the Wafer CLI.

pub mod predict;
pub mod seed;
pub mod serve;
pub mod train;

use anyhow::{Context, Result};
use std::path::Path;
use wafer_training::PipelineConfig;

/// Load and validate the pipeline configuration named on the command line.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = PipelineConfig::discover(path).context("Failed to load wafer configuration")?;
    config.validate().context("Invalid wafer configuration")?;
    Ok(config)
}
