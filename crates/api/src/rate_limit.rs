//! Fixed-window rate limiting for write-heavy operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ApiError;

/// Hits recorded for a key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub hits: u64,
    pub resets_in: Duration,
}

/// Counter backend for the rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Records one hit for `key` and returns the count in the current window.
    async fn hit(&self, key: &str, window: Duration) -> WindowCount;
}

/// Process-local counters. Each key's window starts at its first hit.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<String, (Instant, u64)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> WindowCount {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        // Drop expired windows so the map does not grow without bound.
        windows.retain(|_, (started, _)| now.duration_since(*started) < window);

        let (started, hits) = windows.entry(key.to_string()).or_insert((now, 0));
        *hits += 1;

        WindowCount {
            hits: *hits,
            resets_in: window.saturating_sub(now.duration_since(*started)),
        }
    }
}

/// Limits how often one user may run an operation.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, max: u64, window: Duration) -> Self {
        Self { store, max, window }
    }

    /// An in-memory limiter.
    pub fn in_memory(max: u64, window: Duration) -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), max, window)
    }

    /// Counts one request and fails with `RateLimited` once the user has
    /// exceeded the limit for `operation` in the current window.
    pub async fn check(&self, user_id: UserId, operation: &'static str) -> Result<(), ApiError> {
        let key = format!("{operation}:{user_id}");
        let count = self.store.hit(&key, self.window).await;

        if count.hits > self.max {
            tracing::warn!(%user_id, operation, hits = count.hits, "rate limit exceeded");
            metrics::counter!("rate_limited_total", "operation" => operation).increment(1);
            return Err(ApiError::RateLimited {
                retry_after_secs: count.resets_in.as_secs().max(1),
            });
        }

        Ok(())
    }
}
