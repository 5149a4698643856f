//! Read commands: get and the three listings.

use super::{parse_key, render_key, render_value};
use anyhow::{Context, Result};
use colored::Colorize;
use kvarea_storage::{IterItem, SequentialRangeIterator, StorageArea};

pub async fn get(area: &StorageArea, key: &str) -> Result<()> {
    let key = parse_key(key)?;

    match area.get_raw(key.clone()).await.context("Failed to read key")? {
        Some(value) => println!("{}", render_value(&value)),
        None => {
            println!("{} {}", "Not found:".yellow(), render_key(&key));
        }
    }
    Ok(())
}

pub async fn keys(area: &StorageArea) -> Result<()> {
    list(area.keys()).await
}

pub async fn values(area: &StorageArea) -> Result<()> {
    list(area.values()).await
}

pub async fn entries(area: &StorageArea) -> Result<()> {
    list(area.entries()).await
}

async fn list(iter: SequentialRangeIterator) -> Result<()> {
    let mut count = 0usize;

    while let Some(item) = iter.advance().await.context("Failed to enumerate area")? {
        count += 1;
        match item {
            IterItem::Key(key) => println!("{}", render_key(&key).bright_yellow()),
            IterItem::Value(value) => println!("{}", render_value(&value)),
            IterItem::Entry(key, value) => println!(
                "{}  {}",
                render_key(&key).bright_yellow(),
                render_value(&value)
            ),
        }
    }

    if count == 0 {
        println!("{}", "(empty)".bright_black());
    }
    Ok(())
}
