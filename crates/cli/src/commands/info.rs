//! Area information command.

use anyhow::{Context, Result};
use colored::Colorize;
use kvarea_storage::StorageArea;
use std::path::Path;

pub async fn run(area: &StorageArea, data_dir: &Path) -> Result<()> {
    let backing = area.backing_store();
    let keys = area.keys().collect().await.context("Failed to count keys")?;

    println!("{}", "Storage Area".bold().cyan());
    println!();
    println!("  Name:      {}", area.name().bright_yellow());
    println!("  Data dir:  {}", data_dir.display().to_string().bright_black());
    println!("  Database:  {}", backing.database);
    println!("  Store:     {}", backing.store);
    println!("  Version:   {}", backing.version);
    println!("  Keys:      {}", keys.len().to_string().bright_cyan());

    Ok(())
}
