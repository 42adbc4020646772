//! Storage selected at runtime from configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{RateLimitConfig, StoreKind};
use crate::error::Result;
use crate::storage::{HealthCheckResult, RateLimitState, Storage};

#[cfg(feature = "memory")]
use crate::storage::MemoryStorage;
#[cfg(feature = "redis")]
use crate::storage::{RedisConfig, RedisStorage};

/// One of the built-in backends, chosen by [`RateLimitConfig::store`].
#[derive(Debug)]
pub enum StorageBackend {
    /// In-process storage.
    #[cfg(feature = "memory")]
    Memory(MemoryStorage),
    /// Shared Redis storage.
    #[cfg(feature = "redis")]
    Redis(RedisStorage),
}

impl StorageBackend {
    /// Build the backend named by `config.store()`.
    ///
    /// A Redis store connects with [`RedisConfig::default`]. Selecting a backend
    /// whose feature is not compiled in is a configuration error.
    pub async fn from_config(config: &RateLimitConfig) -> Result<Self> {
        match config.store() {
            #[cfg(feature = "redis")]
            StoreKind::Redis => Self::from_config_with_redis(config, RedisConfig::default()).await,
            #[cfg(not(feature = "redis"))]
            StoreKind::Redis => Err(crate::error::ConfigError::InvalidStorage(
                "the `redis` feature is not enabled".into(),
            )
            .into()),
            StoreKind::Memory => memory_backend(),
        }
    }

    /// Like [`from_config`](Self::from_config), connecting a Redis store with `redis`.
    #[cfg(feature = "redis")]
    pub async fn from_config_with_redis(config: &RateLimitConfig, redis: RedisConfig) -> Result<Self> {
        match config.store() {
            StoreKind::Redis => Ok(Self::Redis(RedisStorage::new(redis).await?)),
            StoreKind::Memory => memory_backend(),
        }
    }
}

#[cfg(feature = "memory")]
fn memory_backend() -> Result<StorageBackend> {
    Ok(StorageBackend::Memory(MemoryStorage::new()))
}

#[cfg(not(feature = "memory"))]
fn memory_backend() -> Result<StorageBackend> {
    Err(crate::error::ConfigError::InvalidStorage("the `memory` feature is not enabled".into()).into())
}

#[cfg(feature = "memory")]
impl From<MemoryStorage> for StorageBackend {
    fn from(storage: MemoryStorage) -> Self {
        Self::Memory(storage)
    }
}

#[cfg(feature = "redis")]
impl From<RedisStorage> for StorageBackend {
    fn from(storage: RedisStorage) -> Self {
        Self::Redis(storage)
    }
}

macro_rules! dispatch {
    ($self:ident, $storage:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "memory")]
            StorageBackend::Memory($storage) => $body,
            #[cfg(feature = "redis")]
            StorageBackend::Redis($storage) => $body,
        }
    };
}

impl Storage for StorageBackend {
    fn backend_name(&self) -> &'static str {
        dispatch!(self, s => s.backend_name())
    }

    async fn find(&self, key: &str) -> Result<Option<RateLimitState>> {
        dispatch!(self, s => s.find(key).await)
    }

    async fn save(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<()> {
        dispatch!(self, s => s.save(key, state, ttl).await)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        dispatch!(self, s => s.delete(key).await)
    }

    async fn delete_multiple(&self, keys: &[&str]) -> Result<u64> {
        dispatch!(self, s => s.delete_multiple(keys).await)
    }

    async fn find_multiple(&self, keys: &[&str]) -> Result<HashMap<String, RateLimitState>> {
        dispatch!(self, s => s.find_multiple(keys).await)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        dispatch!(self, s => s.exists(key).await)
    }

    async fn count(&self) -> Result<u64> {
        dispatch!(self, s => s.count().await)
    }

    async fn cleanup(&self) -> Result<u64> {
        dispatch!(self, s => s.cleanup().await)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        dispatch!(self, s => s.list_keys(prefix).await)
    }

    async fn health_check(&self) -> HealthCheckResult {
        dispatch!(self, s => s.health_check().await)
    }

    async fn update<F, T>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send,
    {
        dispatch!(self, s => s.update(key, operation).await)
    }
}
