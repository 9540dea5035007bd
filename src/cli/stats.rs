//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了统计查询命令的实现。

use crate::cli::StatsArgs;
use crate::client::DistributedCacheCoordinator;
use crate::config::Config;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn execute(config: Config, args: &StatsArgs) -> Result<()> {
    let scope = CancellationToken::new();
    let coordinator = DistributedCacheCoordinator::connect(config, &scope)
        .await
        .context("Failed to connect to L2")?;

    if args.window > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.window)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    let stats = coordinator.get_stats();
    let instance_id = coordinator.instance_id().to_string();
    coordinator.close().await;

    if args.prometheus {
        print!("{}", stats.to_prometheus(&instance_id));
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("=== Cache Stats ({}) ===\n", instance_id);
    println!("L1 hits:             {}", stats.primary_hits);
    println!("L1 misses:           {}", stats.primary_misses);
    println!("L2 hits:             {}", stats.secondary_hits);
    println!("L2 misses:           {}", stats.secondary_misses);
    println!("Messages sent:       {}", stats.messages_sent);
    println!("Messages received:   {}", stats.messages_received);
    println!("Self echoes skipped: {}", stats.self_echo_skipped);
    println!("Messages dropped:    {}", stats.messages_dropped);
    println!("Publish failures:    {}", stats.publish_failures);
    Ok(())
}
