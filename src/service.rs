//! The rate limit service.
//!
//! [`RateLimitService`] ties a configuration, an algorithm, a key generator and
//! a storage backend together. `check_limit` runs the algorithm inside
//! [`Storage::update`], so the read of the current record, the decision and the
//! write of the next record form one critical section per key.
//!
//! # Example
//!
//! ```ignore
//! use throttlekit::{AlgorithmKind, MemoryStorage, RateLimitConfig, RateLimitService};
//!
//! let config = RateLimitConfig::per_minute(100)?.with_algorithm(AlgorithmKind::SlidingWindow);
//! let limiter = RateLimitService::new(config, MemoryStorage::new());
//!
//! let decision = limiter.check_limit("user:123").await?;
//! if decision.is_denied() {
//!     println!("Retry after {:?}", decision.info().retry_after);
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::algorithm::{self, Algorithm};
use crate::clock::{self, Clock};
use crate::config::{FailureMode, RateLimitConfig};
use crate::decision::{Decision, DecisionMetadata, RateLimitInfo};
use crate::error::{RateLimitError, Result};
use crate::key::KeyGenerator;
use crate::storage::{HealthCheckResult, RateLimitState, Storage};

#[cfg(any(feature = "memory", feature = "redis"))]
use crate::storage::StorageBackend;

/// Admission control for one limiter configuration.
///
/// Cheap to clone; clones share storage.
pub struct RateLimitService<S> {
    config: RateLimitConfig,
    storage: Arc<S>,
    algorithm: Arc<dyn Algorithm>,
    keys: KeyGenerator,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for RateLimitService<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            storage: self.storage.clone(),
            algorithm: self.algorithm.clone(),
            keys: self.keys.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S> std::fmt::Debug for RateLimitService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitService")
            .field("config", &self.config)
            .field("algorithm", &self.algorithm.name())
            .finish()
    }
}

#[cfg(any(feature = "memory", feature = "redis"))]
impl RateLimitService<StorageBackend> {
    /// Build a service whose backend is chosen by `config.store()`.
    pub async fn from_config(config: RateLimitConfig) -> Result<Self> {
        let storage = StorageBackend::from_config(&config).await?;
        Ok(Self::new(config, storage))
    }
}

impl<S: Storage> RateLimitService<S> {
    /// Create a service over `storage`.
    pub fn new(config: RateLimitConfig, storage: S) -> Self {
        Self::with_shared_storage(config, Arc::new(storage))
    }

    /// Create a service over storage shared with other services.
    pub fn with_shared_storage(config: RateLimitConfig, storage: Arc<S>) -> Self {
        Self {
            algorithm: algorithm::for_kind(config.algorithm()),
            keys: KeyGenerator::new(config.namespace()),
            config,
            storage,
            clock: clock::system(),
        }
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decide on one request from `identifier`, consuming quota if admitted.
    ///
    /// Validation errors are always returned. Storage failures are handled
    /// according to the configured [`FailureMode`].
    #[instrument(
        skip(self),
        fields(namespace = %self.config.namespace(), algorithm = self.algorithm.name())
    )]
    pub async fn check_limit(&self, identifier: &str) -> Result<Decision> {
        let key = self.keys.generate(identifier, self.config.algorithm())?;

        let config = &self.config;
        let algorithm = &self.algorithm;
        let clock = &self.clock;
        let record_key = key.as_str();

        let outcome = self
            .storage
            .update(&key, |current| {
                let now = clock.now_ms();
                let current = current.filter(|record| record.state.kind() == algorithm.kind());
                let created_at = current.as_ref().map_or(now, |record| record.created_at);

                let transition = algorithm.process(current.as_ref().map(|r| &r.state), config, now);
                let record = RateLimitState::new(
                    record_key,
                    transition.state,
                    created_at,
                    transition.expires_at,
                );
                (record, transition.decision)
            })
            .await;

        match outcome {
            Ok(decision) => {
                debug!(
                    key = %key,
                    allowed = decision.is_allowed(),
                    remaining = decision.remaining(),
                    reset_time = decision.reset_time(),
                    "rate limit checked"
                );
                Ok(decision)
            }
            Err(e) if e.is_validation() => Err(e),
            Err(e) => self.on_storage_failure(&key, e),
        }
    }

    /// Apply the failure mode to a storage error.
    fn on_storage_failure(&self, key: &str, error: RateLimitError) -> Result<Decision> {
        let now = self.clock.now_ms();
        let limit = self.config.max_requests();
        let window = self.config.window();
        let reset_time = now.saturating_add(self.config.window_ms());
        let metadata = DecisionMetadata::new().with_key(key).degraded();

        match self.config.failure_mode() {
            FailureMode::Open => {
                warn!(key, error = %error, "storage failed, admitting request (fail-open)");
                let info = RateLimitInfo::new(limit, limit, reset_time, 0)
                    .with_algorithm(self.algorithm.name())
                    .with_metadata(metadata);
                Ok(Decision::allowed(info))
            }
            FailureMode::Closed => {
                warn!(key, error = %error, "storage failed, rejecting request (fail-closed)");
                let info = RateLimitInfo::new(limit, 0, reset_time, 0)
                    .with_algorithm(self.algorithm.name())
                    .with_metadata(metadata)
                    .with_retry_after(window);
                Ok(Decision::denied(info))
            }
            FailureMode::Error => {
                warn!(key, error = %error, "storage failed");
                Err(error)
            }
        }
    }

    /// Forget everything stored for `identifier`, restoring its full quota.
    #[instrument(skip(self), fields(namespace = %self.config.namespace()))]
    pub async fn reset_limit(&self, identifier: &str) -> Result<()> {
        let key = self.keys.generate(identifier, self.config.algorithm())?;
        let existed = self.storage.delete(&key).await?;
        debug!(key = %key, existed, "rate limit reset");
        Ok(())
    }

    /// The stored record for `identifier`, without consuming quota.
    pub async fn peek(&self, identifier: &str) -> Result<Option<RateLimitState>> {
        let key = self.keys.generate(identifier, self.config.algorithm())?;
        self.storage.find(&key).await
    }

    /// Storage keys currently tracked under this namespace and algorithm.
    pub async fn list_tracked(&self) -> Result<Vec<String>> {
        let prefix = self.keys.algorithm_prefix(self.config.algorithm());
        self.storage.list_keys(&prefix).await
    }

    /// The limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The key generator for this namespace.
    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    /// The time source decisions are made against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Probe the storage backend.
    pub async fn health_status(&self) -> HealthCheckResult {
        self.storage.health_check().await
    }
}
