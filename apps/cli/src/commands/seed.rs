//! Seed command: load a sensor CSV into the document store.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use wafer_training::schema::UNNAMED_PREFIX;
use wafer_training::store::documents_from_frame;
use wafer_training::{DocumentStore, Frame, SqliteDocumentStore};

pub fn execute(config_path: Option<&Path>, file: &Path, replace: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let mut frame = Frame::read_csv(file).with_context(|| format!("Failed to read sensor file: {}", file.display()))?;
    frame.drop_columns_where(|c| c.starts_with(UNNAMED_PREFIX));
    let documents = documents_from_frame(&frame);

    let store = SqliteDocumentStore::connect(&config.store_uri(), &config.store.collection)
        .context("Failed to open the document store")?;
    if replace {
        let removed = store.clear()?;
        tracing::info!(removed, collection = %config.store.collection, "collection cleared");
    }
    let inserted = store.insert_many(&documents)?;

    println!();
    println!("{}", "Seed complete".bold().green());
    println!("  Collection: {}", config.store.collection.cyan());
    println!("  Inserted:   {inserted}");
    println!("  Total:      {}", store.count()?);
    println!();
    Ok(())
}
