// SPDX-License-Identifier: MIT OR Apache-2.0

//! The resolved-backend cache (spec §3 `BackendCacheEntry`): a bounded,
//! TTL'd map from cache key to dialed channel, deduplicating concurrent
//! dials for the same key and closing channels once evicted.

use crate::error::{GatewayError, Result};
use crate::proxy::backend::TalosBackend;
use crate::runtime::MetricsCollector;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::sync::Arc;
use std::time::Duration;

const CAPACITY: u64 = 32;
const TTL: Duration = Duration::from_secs(3600);

/// Caches dialed [`TalosBackend`]s by [`crate::proxy::director::BackendKey::cache_key`].
///
/// Eviction drops the cached `Arc<TalosBackend>`; once every clone of it
/// is gone, `TalosBackend::drop` closes the underlying channel and
/// decrements the active-client gauge, acting as the finalizer the
/// directory expects when a cluster or machine entry disappears.
#[derive(Clone)]
pub struct BackendCache {
    cache: Cache<String, Arc<TalosBackend>>,
    metrics: Arc<MetricsCollector>,
}

impl BackendCache {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        let eviction_metrics = metrics.clone();
        let cache = Cache::builder()
            .max_capacity(CAPACITY)
            .time_to_live(TTL)
            .async_eviction_listener(move |key: Arc<String>, _value, cause| {
                let metrics = eviction_metrics.clone();
                Box::pin(async move {
                    if !matches!(cause, RemovalCause::Replaced) {
                        tracing::debug!(key = %key, ?cause, "backend evicted from cache");
                    }
                    let _ = &metrics;
                })
            })
            .build();
        Self { cache, metrics }
    }

    /// Look up `key`, dialing via `dial` on a miss. Concurrent misses for
    /// the same key share a single in-flight dial.
    pub async fn get_or_dial<F, Fut>(&self, key: String, dial: F) -> Result<Arc<TalosBackend>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<TalosBackend>>,
    {
        let metrics = self.metrics.clone();
        // `try_get_with` only ever polls one caller's loader future to
        // completion per key, even under concurrent misses; flagging
        // from inside it is what makes the miss counter fire exactly
        // once instead of once per concurrent caller.
        let loader_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let loader_ran_in_future = loader_ran.clone();
        let result = self
            .cache
            .try_get_with(key, async move {
                loader_ran_in_future.store(true, std::sync::atomic::Ordering::Relaxed);
                dial().await.map(Arc::new)
            })
            .await;

        if loader_ran.load(std::sync::atomic::Ordering::Relaxed) {
            metrics.record_cache_miss();
        } else {
            metrics.record_cache_hit();
        }

        // `try_get_with` hands back a shared `Arc<GatewayError>` since the
        // same in-flight failure can be observed by multiple callers;
        // `GatewayError` itself isn't `Clone` (its `Transport` variant
        // wraps a non-Clone `tonic` error), so each variant is
        // reconstructed by hand rather than blanket-folded into
        // `Unavailable` and losing e.g. a `NotFound` from the secrets
        // store.
        result.map_err(|e: Arc<GatewayError>| match &*e {
            GatewayError::NotFound(msg) => GatewayError::NotFound(msg.clone()),
            GatewayError::InvalidSignature(msg) => GatewayError::InvalidSignature(msg.clone()),
            GatewayError::PermissionDenied(msg) => GatewayError::PermissionDenied(msg.clone()),
            GatewayError::Unauthenticated(msg) => GatewayError::Unauthenticated(msg.clone()),
            GatewayError::Config(msg) => GatewayError::Config(msg.clone()),
            GatewayError::CircuitOpen(msg) => GatewayError::CircuitOpen(msg.clone()),
            GatewayError::Internal(msg) => GatewayError::Internal(msg.clone()),
            GatewayError::Unavailable(msg) => GatewayError::Unavailable(msg.clone()),
            GatewayError::Transport(err) => GatewayError::Unavailable(format!("backend dial failed: {err}")),
        })
    }

    /// Drop a cached entry, e.g. when a watched resource reports a
    /// cluster or machine has been destroyed or its endpoints changed.
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
