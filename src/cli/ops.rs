//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单键读写命令的实现。

use crate::cli::{KeyArgs, SetArgs};
use crate::client::DistributedCacheCoordinator;
use crate::config::Config;
use crate::error::CacheError;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

async fn connect(config: Config) -> Result<DistributedCacheCoordinator> {
    let scope = CancellationToken::new();
    DistributedCacheCoordinator::connect(config, &scope)
        .await
        .context("Failed to connect to L2")
}

pub async fn get(config: Config, args: &KeyArgs) -> Result<()> {
    let coordinator = connect(config).await?;
    let result = coordinator.get(&args.key).await;
    coordinator.close().await;

    match result {
        Ok(value) => println!("{}", value),
        Err(CacheError::NotFound(_)) => println!("(nil)"),
        Err(e) => return Err(e).with_context(|| format!("Failed to get '{}'", args.key)),
    }
    Ok(())
}

pub async fn set(config: Config, args: &SetArgs) -> Result<()> {
    let coordinator = connect(config).await?;
    let result = coordinator.set(&args.key, &args.value).await;
    coordinator.close().await;

    result.with_context(|| format!("Failed to set '{}'", args.key))?;
    println!("OK");
    Ok(())
}

pub async fn delete(config: Config, args: &KeyArgs) -> Result<()> {
    let coordinator = connect(config).await?;
    let result = coordinator.delete(&args.key).await;
    coordinator.close().await;

    result.with_context(|| format!("Failed to delete '{}'", args.key))?;
    println!("OK");
    Ok(())
}
