//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效频道监听命令的实现。

use crate::backend::{L2Store, RedisStore};
use crate::config::Config;
use crate::sync::message::{Operation, SyncMessage};
use anyhow::{Context, Result};
use futures::StreamExt;

pub async fn execute(config: Config) -> Result<()> {
    let store = RedisStore::connect(&config.l2)
        .await
        .context("Failed to connect to L2")?;
    let mut stream = store
        .subscribe(&config.sync.channel)
        .await
        .context("Failed to subscribe")?;

    println!("=== Watching {} (Ctrl-C to stop) ===\n", config.sync.channel);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = stream.next() => match next {
                Some(payload) => print_message(&payload),
                None => {
                    println!("Subscription closed by server");
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_message(payload: &[u8]) {
    match SyncMessage::decode(payload) {
        Ok(msg) => {
            let op = match msg.operation {
                Operation::Set => "SET",
                Operation::Delete => "DEL",
            };
            println!(
                "{} {:<3} {} from={} value={}",
                msg.timestamp,
                op,
                msg.key,
                msg.instance_id,
                msg.value.as_deref().unwrap_or("-")
            );
        }
        Err(e) => println!("malformed: {} ({})", String::from_utf8_lossy(payload), e),
    }
}
