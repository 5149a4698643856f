//! CLI commands module.

use anyhow::{Context, Result};
use clap::Subcommand;
use kvarea_core::{Key, Value};
use kvarea_storage::StorageArea;
use std::path::Path;

mod info;
mod read;
mod write;

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored under a key
    Get {
        /// Key (JSON, or a plain string)
        key: String,
    },
    /// Store a JSON document under a key
    Set {
        /// Key (JSON, or a plain string)
        key: String,
        /// JSON document to store
        value: String,
    },
    /// Remove a key
    Delete {
        /// Key (JSON, or a plain string)
        key: String,
    },
    /// Remove every key in the area
    Clear,
    /// List keys in order
    Keys,
    /// List values in key order
    Values,
    /// List key/value entries in key order
    Entries,
    /// Show where the area lives and how many keys it holds
    Info,
}

pub async fn run(cmd: Commands, area: &StorageArea, data_dir: &Path) -> Result<()> {
    match cmd {
        Commands::Get { key } => read::get(area, &key).await,
        Commands::Set { key, value } => write::set(area, &key, &value).await,
        Commands::Delete { key } => write::delete(area, &key).await,
        Commands::Clear => write::clear(area).await,
        Commands::Keys => read::keys(area).await,
        Commands::Values => read::values(area).await,
        Commands::Entries => read::entries(area).await,
        Commands::Info => info::run(area, data_dir).await,
    }
}

/// Parse a command-line key: JSON when it parses, a plain string otherwise.
pub(crate) fn parse_key(input: &str) -> Result<Key> {
    match serde_json::from_str::<serde_json::Value>(input) {
        Ok(json) => Key::from_json(&json).with_context(|| format!("Invalid key: {}", input)),
        Err(_) => Ok(Key::from(input)),
    }
}

/// Render a key the way it would be typed back in.
pub(crate) fn render_key(key: &Key) -> String {
    key.to_json().to_string()
}

/// Render a stored value: the JSON document for values written by this
/// tool, hex for anything else.
pub(crate) fn render_value(value: &Value) -> String {
    match value.decode::<String>() {
        Ok(text) if serde_json::from_str::<serde_json::Value>(&text).is_ok() => text,
        _ => format!("0x{}", hex::encode(value.as_bytes())),
    }
}
