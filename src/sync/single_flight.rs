//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了按键合并的加载注册表，防止缓存击穿时同一个键被重复加载。

use crate::error::{CacheError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type LoadResult = Result<Option<String>>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// 单飞加载注册表
///
/// 键 -> 共享的加载结果。加载在独立的任务中执行，不随任何调用方的取消而中断；
/// 加载完成（包括失败）后条目立即移除，之后的未命中会重新触发加载。
#[derive(Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<DashMap<String, SharedLoad>>,
}

/// 加载任务持有的清理守卫，任务结束（包括panic）时移除其负责的键
struct InFlightGuard {
    map: Arc<DashMap<String, SharedLoad>>,
    keys: Vec<String>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            self.map.remove(key);
        }
    }
}

fn aborted() -> CacheError {
    CacheError::Loader("load task terminated before producing a result".to_string())
}

impl SingleFlight {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前正在加载的键数量
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// 加载单个键
    ///
    /// 如果该键已有加载在进行中，则等待并共享其结果，`load` 不会被调用。
    /// 调用方被取消时加载继续进行，后来的调用方仍会共享它的结果。
    ///
    /// # 参数
    ///
    /// * `key` - 要加载的键
    /// * `load` - 只在本次调用负责加载时被调用
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let shared = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!("SingleFlight: joining in-flight load, key={}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel::<LoadResult>();
                let shared = rx
                    .map(|received| received.unwrap_or_else(|_| Err(aborted())))
                    .boxed()
                    .shared();
                entry.insert(shared.clone());

                let guard = InFlightGuard {
                    map: self.in_flight.clone(),
                    keys: vec![key.to_string()],
                };
                let fut = load();
                tokio::spawn(async move {
                    let result = fut.await;
                    drop(guard);
                    let _ = tx.send(result);
                });
                shared
            }
        };
        shared.await
    }

    /// 批量加载
    ///
    /// 已在加载中的键直接等待已有结果；其余的键由本次调用负责，
    /// 统一交给 `load` 调用一次。返回所有解析到值的键。
    pub async fn run_batch<F, Fut>(&self, keys: &[String], load: F) -> Result<HashMap<String, String>>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, String>>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<Arc<HashMap<String, String>>>>();
        let batch = rx
            .map(|received| received.unwrap_or_else(|_| Err(aborted())))
            .boxed()
            .shared();

        let mut owned = Vec::new();
        let mut joined = Vec::new();
        for key in keys {
            match self.in_flight.entry(key.clone()) {
                Entry::Occupied(entry) => joined.push((key.clone(), entry.get().clone())),
                Entry::Vacant(entry) => {
                    let k = key.clone();
                    let per_key = batch
                        .clone()
                        .map(move |result| result.map(|values| values.get(&k).cloned()))
                        .boxed()
                        .shared();
                    entry.insert(per_key);
                    owned.push(key.clone());
                }
            }
        }

        let mut resolved = HashMap::new();
        if !owned.is_empty() {
            let guard = InFlightGuard {
                map: self.in_flight.clone(),
                keys: owned.clone(),
            };
            let fut = load(owned);
            tokio::spawn(async move {
                let result = fut.await.map(Arc::new);
                drop(guard);
                let _ = tx.send(result);
            });
            let values = batch.await?;
            resolved.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for (key, shared) in joined {
            if let Some(value) = shared.await? {
                resolved.insert(key, value);
            }
        }
        Ok(resolved)
    }
}
