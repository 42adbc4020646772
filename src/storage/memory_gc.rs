//! In-memory storage with automatic garbage collection.
//!
//! This storage backend uses `DashMap` for thread-safe concurrent access.
//! [`Storage::update`] runs under the map's entry lock for the key, so
//! read-modify-write cycles on one key are serialized while other keys proceed
//! in parallel. Correct within one process only; instances do not share state.
//!
//! Expired records are hidden from reads immediately and physically removed by
//! the sweep, which runs every N operations, on a timer, or on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::clock::{self, Clock};
use crate::error::Result;
use crate::storage::{HealthCheckResult, RateLimitState, Storage, ttl_for};

/// Garbage collection interval configuration.
#[derive(Debug, Clone)]
pub enum GcInterval {
    /// Run GC every N storage operations.
    Requests(u64),
    /// Run GC at fixed time intervals on a background task.
    Duration(Duration),
    /// Disable automatic GC.
    Manual,
}

impl Default for GcInterval {
    fn default() -> Self {
        Self::Requests(10000)
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone, Default)]
pub struct GcConfig {
    /// When to trigger GC.
    pub interval: GcInterval,
}

impl GcConfig {
    /// Create config with request-based GC.
    pub fn on_requests(count: u64) -> Self {
        Self {
            interval: GcInterval::Requests(count.max(1)),
        }
    }

    /// Create config with time-based GC.
    pub fn on_duration(interval: Duration) -> Self {
        Self {
            interval: GcInterval::Duration(interval),
        }
    }

    /// Create config with manual GC only.
    pub fn manual() -> Self {
        Self {
            interval: GcInterval::Manual,
        }
    }
}

/// Internal entry with expiration tracking.
#[derive(Debug, Clone)]
struct InternalEntry {
    state: RateLimitState,
    expires_at: u64,
}

impl InternalEntry {
    fn live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

type Table = DashMap<String, InternalEntry>;

/// In-memory storage with garbage collection.
///
/// # Example
///
/// ```ignore
/// use throttlekit::storage::{MemoryStorage, GcConfig};
/// use std::time::Duration;
///
/// // Default GC (every 10000 operations)
/// let storage = MemoryStorage::new();
///
/// // Sweep once a minute on a background task (needs a tokio runtime)
/// let storage = MemoryStorage::with_gc(GcConfig::on_duration(Duration::from_secs(60)));
///
/// // Manual GC only
/// let storage = MemoryStorage::with_gc(GcConfig::manual());
/// storage.cleanup().await?;
/// ```
pub struct MemoryStorage {
    data: Arc<Table>,
    clock: Arc<dyn Clock>,
    gc_config: GcConfig,
    request_count: AtomicU64,
    gc_lock: Mutex<()>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("entries", &self.data.len())
            .field("gc_config", &self.gc_config)
            .finish()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new memory storage with default GC configuration.
    pub fn new() -> Self {
        Self::with_gc(GcConfig::default())
    }

    /// Create a new memory storage with custom GC configuration.
    pub fn with_gc(gc_config: GcConfig) -> Self {
        Self::with_gc_and_clock(gc_config, clock::system())
    }

    /// Create a memory storage reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_gc_and_clock(GcConfig::default(), clock)
    }

    /// Create a memory storage with custom GC configuration and clock.
    pub fn with_gc_and_clock(gc_config: GcConfig, clock: Arc<dyn Clock>) -> Self {
        let storage = Self {
            data: Arc::new(DashMap::new()),
            clock,
            gc_config: gc_config.clone(),
            request_count: AtomicU64::new(0),
            gc_lock: Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
        };

        // Start background GC task if duration-based
        if let GcInterval::Duration(interval) = gc_config.interval {
            storage.start_gc_task(interval);
        }

        storage
    }

    /// Start background GC task.
    fn start_gc_task(&self, interval: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime available, timed sweep disabled; call cleanup() manually");
            return;
        };

        let data = self.data.clone();
        let clock = self.clock.clone();
        let shutdown = self.shutdown.clone();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        sweep(&data, clock.now_ms());
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });
    }

    /// Number of entries physically held, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the storage holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Check if GC should run and run it if needed.
    fn maybe_run_gc(&self) {
        if let GcInterval::Requests(threshold) = self.gc_config.interval {
            let count = self.request_count.fetch_add(1, Ordering::Relaxed);
            if count % threshold == 0 && count > 0 {
                // Try to acquire GC lock (non-blocking)
                if let Some(_guard) = self.gc_lock.try_lock() {
                    sweep(&self.data, self.clock.now_ms());
                }
            }
        }
    }

    fn live_state(&self, key: &str, now: u64) -> Option<RateLimitState> {
        self.data
            .get(key)
            .filter(|internal| internal.live(now))
            .map(|internal| internal.state.clone())
    }
}

impl Drop for MemoryStorage {
    fn drop(&mut self) {
        // notify_one stores a permit, so a sweep in progress still sees it.
        self.shutdown.notify_one();
    }
}

/// Remove expired entries. Returns how many were removed.
fn sweep(data: &Table, now: u64) -> u64 {
    let mut removed = 0;
    data.retain(|_, entry| {
        let keep = entry.live(now);
        if !keep {
            removed += 1;
        }
        keep
    });
    if removed > 0 {
        debug!(removed, remaining = data.len(), "swept expired rate limit records");
    }
    removed
}

impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, key: &str) -> Result<Option<RateLimitState>> {
        self.maybe_run_gc();
        Ok(self.live_state(key, self.clock.now_ms()))
    }

    async fn save(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<()> {
        self.maybe_run_gc();

        let expires_at = expiry(self.clock.now_ms(), ttl);
        self.data
            .insert(key.to_string(), InternalEntry { state, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, internal)| internal.live(now)))
    }

    async fn delete_multiple(&self, keys: &[&str]) -> Result<u64> {
        let now = self.clock.now_ms();
        let removed = keys
            .iter()
            .filter_map(|key| self.data.remove(*key))
            .filter(|(_, internal)| internal.live(now))
            .count();
        Ok(removed as u64)
    }

    async fn find_multiple(&self, keys: &[&str]) -> Result<HashMap<String, RateLimitState>> {
        self.maybe_run_gc();

        let now = self.clock.now_ms();
        Ok(keys
            .iter()
            .filter_map(|key| self.live_state(key, now).map(|s| (key.to_string(), s)))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        Ok(self.data.get(key).is_some_and(|internal| internal.live(now)))
    }

    async fn count(&self) -> Result<u64> {
        let now = self.clock.now_ms();
        Ok(self.data.iter().filter(|e| e.value().live(now)).count() as u64)
    }

    async fn cleanup(&self) -> Result<u64> {
        let _guard = self.gc_lock.lock();
        Ok(sweep(&self.data, self.clock.now_ms()))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn health_check(&self) -> HealthCheckResult {
        // In-process table: nothing to reach.
        HealthCheckResult::healthy(self.backend_name(), Duration::ZERO)
    }

    async fn update<F, T>(&self, key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(Option<RateLimitState>) -> (RateLimitState, T) + Send,
        T: Send,
    {
        self.maybe_run_gc();

        let now = self.clock.now_ms();

        // The entry guard holds the shard lock until the new record is written.
        let result = match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = Some(occupied.get())
                    .filter(|internal| internal.live(now))
                    .map(|internal| internal.state.clone());
                let (state, result) = operation(current);
                let expires_at = expiry(now, ttl_for(&state, now));
                occupied.insert(InternalEntry { state, expires_at });
                result
            }
            Entry::Vacant(vacant) => {
                let (state, result) = operation(None);
                let expires_at = expiry(now, ttl_for(&state, now));
                vacant.insert(InternalEntry { state, expires_at });
                result
            }
        };

        Ok(result)
    }
}

/// Absolute expiry for a record written at `now`, clamped to the end of time.
fn expiry(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}
