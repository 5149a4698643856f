//! kvarea CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use kvarea_engine::Engine;
use kvarea_storage::{StorageArea, DEFAULT_AREA_NAME};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "kvarea")]
#[command(about = "Ordered key-value storage areas on disk", long_about = None)]
struct Cli {
    /// Directory to store area data
    #[arg(short, long, global = true, default_value = "./kvarea_data")]
    data_dir: PathBuf,

    /// Storage area to operate on
    #[arg(short, long, global = true, default_value = DEFAULT_AREA_NAME)]
    area: String,

    /// Log engine activity (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        println!("kvarea - ordered key-value storage areas");
        println!("Run 'kvarea --help' for usage information.");
        return;
    };

    if let Err(e) = run(cli.data_dir, &cli.area, command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(data_dir: PathBuf, area: &str, command: commands::Commands) -> Result<()> {
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let engine = Arc::new(
        Engine::open_sled(&data_dir)
            .with_context(|| format!("Failed to open storage at {:?}", data_dir))?,
    );
    let area = StorageArea::new(Arc::clone(&engine), area);

    commands::run(command, &area, &data_dir).await?;

    engine.flush().await.context("Failed to flush storage")?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
