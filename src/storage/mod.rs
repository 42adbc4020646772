//! Storage backend trait and implementations.
//!
//! This module defines the `Storage` trait that all storage backends must implement,
//! along with built-in implementations for in-memory and Redis storage.
//!
//! The one capability every backend must get right is [`Storage::update`]: an
//! atomic read-modify-write of one key. Algorithms run inside it, which is what
//! keeps concurrent requests for the same key from both reading a stale count.

#[cfg(any(feature = "memory", feature = "redis"))]
mod backend;
#[cfg(feature = "memory")]
mod memory_gc;
#[cfg(feature = "redis")]
mod redis_store;
mod state;

pub use state::{AlgorithmState, RateLimitState};

#[cfg(any(feature = "memory", feature = "redis"))]
pub use backend::StorageBackend;

#[cfg(feature = "memory")]
pub use memory_gc::{GcConfig, GcInterval, MemoryStorage};

#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStorage};

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Shortest TTL handed to a backend. Redis rejects a zero `PSETEX`.
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// TTL for persisting `state` at `now`: its remaining lifetime, floored at [`MIN_TTL`].
pub fn ttl_for(state: &RateLimitState, now: u64) -> Duration {
    Duration::from_millis(state.remaining_ttl_ms(now)).max(MIN_TTL)
}

/// Backend reachability report.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckResult {
    /// Whether the backend answered.
    pub healthy: bool,
    /// Backend name.
    pub backend: &'static str,
    /// Round-trip time of the check.
    pub latency: Duration,
    /// Failure description, if any.
    pub message: Option<String>,
}

impl HealthCheckResult {
    /// A successful check.
    pub fn healthy(backend: &'static str, latency: Duration) -> Self {
        Self {
            healthy: true,
            backend,
            latency,
            message: None,
        }
    }

    /// A failed check.
    pub fn unhealthy(backend: &'static str, latency: Duration, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            backend,
            latency,
            message: Some(message.into()),
        }
    }
}

/// Storage backend trait for rate limiting state.
///
/// All storage operations are async to support both local and distributed backends.
/// Implementations must be thread-safe (`Send + Sync`). Expired records are
/// never returned, whether or not they have been physically removed yet.
pub trait Storage: Send + Sync + 'static {
    /// Backend name for logs and health reports.
    fn backend_name(&self) -> &'static str;

    /// Get a record by key.
    fn find(&self, key: &str) -> impl Future<Output = Result<Option<RateLimitState>>> + Send;

    /// Store a record that expires after `ttl`.
    fn save(
        &self,
        key: &str,
        state: RateLimitState,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a record. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Delete several records. Returns how many existed.
    fn delete_multiple(&self, keys: &[&str]) -> impl Future<Output = Result<u64>> + Send;

    /// Get several records; missing keys are left out of the map.
    fn find_multiple(
        &self,
        keys: &[&str],
    ) -> impl Future<Output = Result<HashMap<String, RateLimitState>>> + Send;

    /// Whether a live record exists for `key`.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Number of live records.
    fn count(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Physically remove expired records. Returns how many were removed.
    fn cleanup(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Keys of live records starting with `prefix`.
    fn list_keys(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Probe the backend.
    fn health_check(&self) -> impl Future<Output = HealthCheckResult> + Send;

    /// Atomically read, transform and write one record.
    ///
    /// `operation` receives the live record (if any) and returns the record to
    /// store along with a result value. The record is persisted with
    /// [`ttl_for`]. No other writer to `key` interleaves between the read and the
    /// write. Backends with optimistic concurrency may call `operation` more
    /// than once; only the result of the committed attempt is returned.
    fn update<F, T>(&self, key: &str, operation: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    async fn find(&self, key: &str) -> Result<Option<RateLimitState>> {
        (**self).find(key).await
    }

    async fn save(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<()> {
        (**self).save(key, state, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn delete_multiple(&self, keys: &[&str]) -> Result<u64> {
        (**self).delete_multiple(keys).await
    }

    async fn find_multiple(&self, keys: &[&str]) -> Result<HashMap<String, RateLimitState>> {
        (**self).find_multiple(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn count(&self) -> Result<u64> {
        (**self).count().await
    }

    async fn cleanup(&self) -> Result<u64> {
        (**self).cleanup().await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_keys(prefix).await
    }

    async fn health_check(&self) -> HealthCheckResult {
        (**self).health_check().await
    }

    async fn update<F, T>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send,
    {
        (**self).update(key, operation).await
    }
}
