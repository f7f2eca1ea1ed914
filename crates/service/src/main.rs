//! FileEngine - versioned, multi-tenant file storage engine
//!
//! Loads the config, hydrates the engine from its snapshot directory and runs
//! the sync worker until SIGINT/SIGTERM.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use service::Config;

/// FileEngine - versioned, multi-tenant file storage engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory snapshots and content blobs are persisted to
    #[arg(short, long)]
    snapshots: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective config as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(snapshots) = args.snapshots {
        config.snapshot_path = Some(snapshots);
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    // surface a bad level before anything starts
    config.log_level()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    service::process::spawn_service(&config).await;
    Ok(())
}
