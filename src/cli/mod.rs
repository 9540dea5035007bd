//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "distcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "warn", help = "Log filter when RUST_LOG is unset")]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "get", about = "Read a key through L1 and L2")]
    Get(KeyArgs),

    #[command(name = "set", about = "Write a key to L2 and broadcast an invalidation")]
    Set(SetArgs),

    #[command(name = "delete", about = "Delete a key and broadcast an invalidation")]
    Delete(KeyArgs),

    #[command(name = "watch", about = "Print invalidation messages until Ctrl-C")]
    Watch,

    #[command(name = "stats", about = "Observe the channel for a while and print cache stats")]
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[arg(short, long, default_value_t = 0, help = "Seconds to observe traffic before printing")]
    pub window: u64,

    #[arg(short, long, help = "Output in Prometheus format")]
    pub prometheus: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod ops;
mod stats;
mod watch;

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing(&cli.log);
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::Get(args) => ops::get(config, args).await,
        Commands::Set(args) => ops::set(config, args).await,
        Commands::Delete(args) => ops::delete(config, args).await,
        Commands::Watch => watch::execute(config).await,
        Commands::Stats(args) => stats::execute(config, args).await,
    }
}
