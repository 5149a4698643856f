//! Write commands: set, delete and clear.

use super::{parse_key, render_key};
use anyhow::{Context, Result};
use colored::Colorize;
use kvarea_storage::StorageArea;

pub async fn set(area: &StorageArea, key: &str, value: &str) -> Result<()> {
    let key = parse_key(key)?;
    let document: serde_json::Value =
        serde_json::from_str(value).with_context(|| format!("Value is not JSON: {}", value))?;

    // Stored in compact form so listings stay one line per entry.
    area.set(key.clone(), Some(&document.to_string()))
        .await
        .context("Failed to store value")?;

    println!("{}  Stored {}", "✓".green().bold(), render_key(&key).bright_yellow());
    Ok(())
}

pub async fn delete(area: &StorageArea, key: &str) -> Result<()> {
    let key = parse_key(key)?;
    area.delete(key.clone())
        .await
        .context("Failed to delete key")?;

    println!("{}  Deleted {}", "✓".green().bold(), render_key(&key).bright_yellow());
    Ok(())
}

pub async fn clear(area: &StorageArea) -> Result<()> {
    area.clear().await.context("Failed to clear area")?;

    println!(
        "{}  Cleared area {}",
        "✓".green().bold(),
        area.name().bright_cyan()
    );
    Ok(())
}
