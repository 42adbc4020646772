//! Redis storage backend for distributed rate limiting.
//!
//! Records are stored as JSON strings with a millisecond TTL (`PSETEX`), so Redis
//! itself expires them. [`Storage::update`] is an optimistic transaction:
//!
//! ```text
//! WATCH key
//! GET key            -> run the operation on the decoded record
//! MULTI
//! PSETEX key ttl json
//! EXEC               -> nil if another client wrote the key after WATCH
//! ```
//!
//! An aborted `EXEC` is retried up to `max_retries` times before the call fails
//! with [`StorageError::AtomicConflict`]. Every round trip is bounded by
//! `operation_timeout`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool_redis::redis::{self, RedisError, RedisResult, cmd};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, PoolError, Runtime};
use tracing::{debug, warn};

use crate::clock::{self, Clock};
use crate::error::{ConnectionError, RateLimitError, Result, StorageError};
use crate::storage::{HealthCheckResult, RateLimitState, Storage, ttl_for};

/// Keys fetched per `SCAN` step.
const SCAN_BATCH: usize = 100;

/// Redis storage configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Prepended to every key, for sharing a database between applications.
    pub key_prefix: String,
    /// Time allowed for taking or opening a pooled connection.
    pub connection_timeout: Duration,
    /// Time allowed for a single round trip.
    pub operation_timeout: Duration,
    /// Transaction retries after a concurrent write aborts `EXEC`.
    pub max_retries: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            key_prefix: String::new(),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(1),
            max_retries: 10,
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-round-trip timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set how many times an aborted transaction is retried.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Redis storage backend for distributed rate limiting.
///
/// Uses connection pooling for high performance.
///
/// # Example
///
/// ```ignore
/// use throttlekit::storage::{RedisStorage, RedisConfig};
///
/// let config = RedisConfig::new("redis://localhost:6379")
///     .with_prefix("myapp:")
///     .with_pool_size(20);
///
/// let storage = RedisStorage::new(config).await?;
/// ```
pub struct RedisStorage {
    pool: Pool,
    key_prefix: String,
    operation_timeout: Duration,
    max_retries: u32,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("key_prefix", &self.key_prefix)
            .field("operation_timeout", &self.operation_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl RedisStorage {
    /// Create a new Redis storage from configuration.
    ///
    /// Fails if the server does not answer a `PING`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size.max(1));
        pool_config.timeouts.wait = Some(config.connection_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);
        pool_config.timeouts.recycle = Some(config.operation_timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        let storage = Self {
            pool,
            key_prefix: config.key_prefix,
            operation_timeout: config.operation_timeout,
            max_retries: config.max_retries,
            clock: clock::system(),
        };

        // Test connection
        let mut conn = storage.get_conn().await?;
        let _: String = storage.timed(cmd("PING").query_async(&mut conn)).await?;

        Ok(storage)
    }

    /// Create a new Redis storage from a URL.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the full key with prefix.
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| pool_error(e, self.operation_timeout))
    }

    /// Bound one round trip by the operation timeout.
    async fn timed<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result.map_err(|e| redis_error(e, self.operation_timeout)),
            Err(_) => Err(ConnectionError::Timeout(self.operation_timeout).into()),
        }
    }

    /// Walk the keyspace with `SCAN MATCH`, collecting full keys.
    async fn scan(&self, conn: &mut Connection, pattern: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .timed(
                    cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(conn),
                )
                .await?;
            found.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(found)
    }

    /// One WATCH/GET/MULTI/EXEC attempt. `None` means the transaction was aborted.
    async fn try_update<F, T>(
        &self,
        conn: &mut Connection,
        key: &str,
        full_key: &str,
        operation: &mut F,
    ) -> Result<Option<T>>
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send,
    {
        let _: () = self.timed(cmd("WATCH").arg(full_key).query_async(conn)).await?;
        let raw: Option<String> = self.timed(cmd("GET").arg(full_key).query_async(conn)).await?;

        let now = self.clock.now_ms();
        let current = match raw {
            Some(json) => Some(decode(key, &json)?).filter(|state| !state.is_expired(now)),
            None => None,
        };

        let (state, result) = operation(current);
        let ttl_ms = ttl_for(&state, now).as_millis() as u64;
        let json = encode(&state)?;

        let committed: Option<()> = self
            .timed(
                redis::pipe()
                    .atomic()
                    .cmd("PSETEX")
                    .arg(full_key)
                    .arg(ttl_ms)
                    .arg(json)
                    .ignore()
                    .query_async(conn),
            )
            .await?;

        Ok(committed.map(|()| result))
    }
}

fn encode(state: &RateLimitState) -> Result<String> {
    serde_json::to_string(state).map_err(|e| StorageError::Serialization(e.to_string()).into())
}

/// Decode and validate a stored record.
fn decode(key: &str, json: &str) -> Result<RateLimitState> {
    let state: RateLimitState =
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;
    state.validate().map_err(|reason| StorageError::InvalidRecord {
        key: key.to_string(),
        reason,
    })?;
    Ok(state)
}

/// Escape glob metacharacters so a literal prefix can be used with `MATCH`.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn pool_error(err: PoolError, timeout: Duration) -> RateLimitError {
    match err {
        PoolError::Timeout(_) => StorageError::PoolExhausted.into(),
        PoolError::Closed => ConnectionError::Closed.into(),
        PoolError::Backend(e) => redis_error(e, timeout),
        other => ConnectionError::ConnectionFailed(other.to_string()).into(),
    }
}

/// Map a client error; `timeout` is the bound a client-side timeout hit.
fn redis_error(err: RedisError, timeout: Duration) -> RateLimitError {
    if err.kind() == redis::ErrorKind::AuthenticationFailed
        || matches!(err.code(), Some("NOAUTH" | "WRONGPASS"))
    {
        ConnectionError::AuthFailed(err.to_string()).into()
    } else if err.is_timeout() {
        ConnectionError::Timeout(timeout).into()
    } else if err.is_connection_refusal() || err.is_connection_dropped() {
        ConnectionError::ConnectionFailed(err.to_string()).into()
    } else {
        StorageError::operation_failed(err.to_string(), err.is_io_error()).into()
    }
}

impl Storage for RedisStorage {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn find(&self, key: &str) -> Result<Option<RateLimitState>> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        let raw: Option<String> = self
            .timed(cmd("GET").arg(&full_key).query_async(&mut conn))
            .await?;

        let now = self.clock.now_ms();
        match raw {
            Some(json) => Ok(Some(decode(key, &json)?).filter(|s| !s.is_expired(now))),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);
        let json = encode(&state)?;
        // PSETEX rejects a zero TTL.
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let _: () = self
            .timed(
                cmd("PSETEX")
                    .arg(&full_key)
                    .arg(ttl_ms)
                    .arg(json)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.delete_multiple(&[key]).await? > 0)
    }

    async fn delete_multiple(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn().await?;
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();

        let removed: u64 = self
            .timed(cmd("DEL").arg(&full_keys).query_async(&mut conn))
            .await?;
        Ok(removed)
    }

    async fn find_multiple(&self, keys: &[&str]) -> Result<HashMap<String, RateLimitState>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.get_conn().await?;
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();

        let values: Vec<Option<String>> = self
            .timed(cmd("MGET").arg(&full_keys).query_async(&mut conn))
            .await?;

        let now = self.clock.now_ms();
        let mut found = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(json) = value {
                let state = decode(key, &json)?;
                if !state.is_expired(now) {
                    found.insert(key.to_string(), state);
                }
            }
        }
        Ok(found)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        let present: u64 = self
            .timed(cmd("EXISTS").arg(&full_key).query_async(&mut conn))
            .await?;
        Ok(present > 0)
    }

    /// Counts every key under `key_prefix`; with an empty prefix that is the whole database.
    async fn count(&self) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let pattern = format!("{}*", escape_glob(&self.key_prefix));
        Ok(self.scan(&mut conn, &pattern).await?.len() as u64)
    }

    async fn cleanup(&self) -> Result<u64> {
        // Redis expires keys on its own.
        Ok(0)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.get_conn().await?;
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));

        let mut keys: Vec<String> = self
            .scan(&mut conn, &pattern)
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.key_prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let ping = async {
            let mut conn = self.get_conn().await?;
            let pong: String = self.timed(cmd("PING").query_async(&mut conn)).await?;
            Ok::<_, RateLimitError>(pong)
        };

        match ping.await {
            Ok(_) => HealthCheckResult::healthy(self.backend_name(), started.elapsed()),
            Err(e) => {
                warn!(error = %e, "redis health check failed");
                HealthCheckResult::unhealthy(self.backend_name(), started.elapsed(), e.to_string())
            }
        }
    }

    async fn update<F, T>(&self, key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send,
    {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        for attempt in 0..=self.max_retries {
            match self
                .try_update(&mut conn, key, &full_key, &mut operation)
                .await
            {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {
                    debug!(key, attempt, "transaction aborted by a concurrent write, retrying");
                }
                Err(e) => {
                    // Do not hand a connection with an active WATCH back to the pool.
                    let _: Result<()> = self.timed(cmd("UNWATCH").query_async(&mut conn)).await;
                    return Err(e);
                }
            }
        }

        warn!(key, retries = self.max_retries, "giving up on contended key");
        Err(StorageError::AtomicConflict.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AlgorithmState;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::new("redis://localhost:6380")
            .with_prefix("test:")
            .with_pool_size(5)
            .with_operation_timeout(Duration::from_millis(200))
            .with_max_retries(3);

        assert_eq!(config.url, "redis://localhost:6380");
        assert_eq!(config.key_prefix, "test:");
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.operation_timeout, Duration::from_millis(200));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("rl:api:"), "rl:api:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_decode_rejects_invalid_record() {
        let state = RateLimitState::new(
            "k",
            AlgorithmState::TokenBucket {
                tokens: -1.0,
                last_refill_time: 0,
            },
            0,
            1_000,
        );
        let json = serde_json::to_string(&state).unwrap();

        let err = decode("k", &json).unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::Storage(StorageError::InvalidRecord { .. })
        ));

        let err = decode("k", "{not json").unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::Storage(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_auth_errors_are_not_retryable() {
        let err = RedisError::from((redis::ErrorKind::AuthenticationFailed, "invalid password"));
        let err = redis_error(err, Duration::from_secs(1));

        assert!(matches!(
            err,
            RateLimitError::Connection(ConnectionError::AuthFailed(_))
        ));
        assert!(err.is_storage());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_client_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err = redis_error(RedisError::from(io), Duration::from_millis(250));

        assert!(matches!(
            err,
            RateLimitError::Connection(ConnectionError::Timeout(t)) if t == Duration::from_millis(250)
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_are_operation_failures() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "unexpected reply"));
        let err = redis_error(err, Duration::from_secs(1));

        assert!(matches!(
            err,
            RateLimitError::Storage(StorageError::OperationFailed { retryable: false, .. })
        ));
    }
}
