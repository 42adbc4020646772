//! Limiter configuration.
//!
//! A [`RateLimitConfig`] fixes the window length, the request ceiling, the
//! algorithm, the key namespace and the storage backend of one limiter. It is
//! validated once, at construction, so algorithms never see a malformed
//! configuration.
//!
//! # Examples
//!
//! ```ignore
//! use throttlekit::{AlgorithmKind, RateLimitConfig};
//! use std::time::Duration;
//!
//! // 100 requests per minute, fixed window
//! let config = RateLimitConfig::per_minute(100)?;
//!
//! // 20 requests per 10 seconds, token bucket, isolated namespace
//! let config = RateLimitConfig::builder()
//!     .max_requests(20)
//!     .window(Duration::from_secs(10))
//!     .algorithm(AlgorithmKind::TokenBucket)
//!     .namespace("login")
//!     .build()?;
//!
//! // From the JSON configuration surface
//! let config = RateLimitConfig::from_json(
//!     r#"{"windowMs": 60000, "maxRequests": 10, "algorithm": "sliding-window", "namespace": "api"}"#,
//! )?;
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Throttling algorithm selected by a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmKind {
    /// Counter reset at fixed intervals.
    #[default]
    FixedWindow,
    /// Two-counter weighted approximation of a sliding window.
    SlidingWindow,
    /// Refilling pool of tokens.
    TokenBucket,
}

impl AlgorithmKind {
    /// Stable tag used in storage keys and headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedWindow => "fixed-window",
            Self::SlidingWindow => "sliding-window",
            Self::TokenBucket => "token-bucket",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend selected by a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process table.
    #[default]
    Memory,
    /// Shared Redis instance.
    Redis,
}

/// What `check_limit` does when the storage backend fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Admit the request.
    Open,
    /// Reject the request.
    #[default]
    Closed,
    /// Return the storage error to the caller.
    Error,
}

/// Validated, immutable limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig", rename_all = "camelCase")]
pub struct RateLimitConfig {
    window_ms: u64,
    max_requests: u64,
    algorithm: AlgorithmKind,
    namespace: String,
    store: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    refill_rate: Option<f64>,
    failure_mode: FailureMode,
}

impl RateLimitConfig {
    /// Create a fixed-window configuration in the default namespace.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        Self::builder()
            .max_requests(max_requests)
            .window(window)
            .build()
    }

    /// `n` requests per second.
    pub fn per_second(n: u64) -> Result<Self> {
        Self::new(n, Duration::from_secs(1))
    }

    /// `n` requests per minute.
    pub fn per_minute(n: u64) -> Result<Self> {
        Self::new(n, Duration::from_secs(60))
    }

    /// `n` requests per hour.
    pub fn per_hour(n: u64) -> Result<Self> {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Start a builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Parse and validate the JSON configuration surface.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Switch the algorithm.
    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Switch the storage backend.
    pub fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    /// Switch the storage failure policy.
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Request ceiling per window; also the token bucket capacity.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Configured algorithm.
    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    /// Key namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Configured storage backend.
    pub fn store(&self) -> StoreKind {
        self.store
    }

    /// Configured storage failure policy.
    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Token bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.max_requests as f64
    }

    /// Tokens added per second.
    ///
    /// Returns the configured rate, or `max_requests / window_seconds`.
    pub fn effective_refill_rate(&self) -> f64 {
        self.refill_rate
            .unwrap_or_else(|| self.max_requests as f64 / self.window().as_secs_f64())
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    max_requests: Option<u64>,
    // Err holds a window too long to count in u64 milliseconds.
    window_ms: Option<std::result::Result<u64, Duration>>,
    algorithm: AlgorithmKind,
    namespace: Option<String>,
    store: StoreKind,
    refill_rate: Option<f64>,
    failure_mode: FailureMode,
}

impl RateLimitConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum requests per window.
    pub fn max_requests(mut self, n: u64) -> Self {
        self.max_requests = Some(n);
        self
    }

    /// Set the window duration.
    pub fn window(mut self, duration: Duration) -> Self {
        self.window_ms = Some(u64::try_from(duration.as_millis()).map_err(|_| duration));
        self
    }

    /// Set the window duration in milliseconds.
    pub fn window_ms(mut self, ms: u64) -> Self {
        self.window_ms = Some(Ok(ms));
        self
    }

    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the key namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the storage backend.
    pub fn store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    /// Set a token bucket refill rate in tokens per second.
    pub fn refill_rate(mut self, rate: f64) -> Self {
        self.refill_rate = Some(rate);
        self
    }

    /// Set the storage failure policy.
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Build the configuration, returning an error if invalid.
    pub fn build(self) -> Result<RateLimitConfig> {
        let max_requests = self
            .max_requests
            .ok_or_else(|| ConfigError::MissingRequired("max_requests".into()))?;
        let window_ms = match self.window_ms {
            Some(Ok(ms)) => ms,
            Some(Err(window)) => {
                return Err(ConfigError::InvalidLimit(format!(
                    "window {window:?} does not fit in u64 milliseconds"
                ))
                .into());
            }
            None => return Err(ConfigError::MissingRequired("window".into()).into()),
        };

        if max_requests == 0 {
            return Err(ConfigError::InvalidLimit("max_requests must be at least 1".into()).into());
        }
        if window_ms == 0 {
            return Err(ConfigError::InvalidLimit("window must be at least 1ms".into()).into());
        }

        let namespace = self
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace("namespace must not be empty".into()).into());
        }

        if let Some(rate) = self.refill_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::InvalidAlgorithm(format!(
                    "refill_rate must be a positive number, got {rate}"
                ))
                .into());
            }
        }

        Ok(RateLimitConfig {
            window_ms,
            max_requests,
            algorithm: self.algorithm,
            namespace,
            store: self.store,
            refill_rate: self.refill_rate,
            failure_mode: self.failure_mode,
        })
    }
}

/// Unvalidated wire shape of [`RateLimitConfig`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    window_ms: u64,
    max_requests: u64,
    #[serde(default)]
    algorithm: AlgorithmKind,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    store: StoreKind,
    #[serde(default)]
    refill_rate: Option<f64>,
    #[serde(default)]
    failure_mode: FailureMode,
}

impl TryFrom<RawConfig> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        let mut builder = RateLimitConfig::builder()
            .max_requests(raw.max_requests)
            .window_ms(raw.window_ms)
            .algorithm(raw.algorithm)
            .store(raw.store)
            .failure_mode(raw.failure_mode);
        if let Some(namespace) = raw.namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(rate) = raw.refill_rate {
            builder = builder.refill_rate(rate);
        }
        builder.build().map_err(|e| match e {
            crate::error::RateLimitError::Config(c) => c,
            other => ConfigError::Parse(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_per_minute() {
        let config = RateLimitConfig::per_minute(60).unwrap();
        assert_eq!(config.max_requests(), 60);
        assert_eq!(config.window_ms(), 60_000);
        assert_eq!(config.algorithm(), AlgorithmKind::FixedWindow);
        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(config.failure_mode(), FailureMode::Closed);
        assert!((config.effective_refill_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_rejects_zero_limits() {
        let err = RateLimitConfig::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_validation());

        let err = RateLimitConfig::new(10, Duration::ZERO).unwrap_err();
        assert!(err.is_validation());

        // Sub-millisecond windows truncate to zero.
        assert!(RateLimitConfig::new(10, Duration::from_micros(500)).is_err());
    }

    #[test]
    fn test_config_rejects_window_beyond_u64_millis() {
        let err = RateLimitConfig::new(10, Duration::MAX).unwrap_err();
        assert!(matches!(
            err,
            crate::error::RateLimitError::Config(ConfigError::InvalidLimit(_))
        ));

        let longest = Duration::from_millis(u64::MAX);
        let config = RateLimitConfig::new(10, longest).unwrap();
        assert_eq!(config.window_ms(), u64::MAX);
    }

    #[test]
    fn test_builder_validation() {
        let config = RateLimitConfig::builder()
            .max_requests(5)
            .window(Duration::from_secs(5))
            .algorithm(AlgorithmKind::TokenBucket)
            .namespace("login")
            .build()
            .unwrap();
        assert_eq!(config.namespace(), "login");
        assert!((config.effective_refill_rate() - 1.0).abs() < 1e-9);

        assert!(RateLimitConfig::builder().max_requests(5).build().is_err());
        assert!(RateLimitConfig::builder().window_ms(5).build().is_err());
        assert!(
            RateLimitConfig::builder()
                .max_requests(5)
                .window_ms(1000)
                .namespace("  ")
                .build()
                .is_err()
        );
        assert!(
            RateLimitConfig::builder()
                .max_requests(5)
                .window_ms(1000)
                .refill_rate(f64::NAN)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_custom_refill_rate() {
        let config = RateLimitConfig::builder()
            .max_requests(10)
            .window_ms(60_000)
            .refill_rate(2.5)
            .build()
            .unwrap();
        assert_eq!(config.effective_refill_rate(), 2.5);
    }

    #[test]
    fn test_from_json() {
        let config = RateLimitConfig::from_json(
            r#"{"windowMs":60000,"maxRequests":10,"algorithm":"sliding-window","namespace":"api","store":"redis","failureMode":"open"}"#,
        )
        .unwrap();

        assert_eq!(config.window_ms(), 60_000);
        assert_eq!(config.max_requests(), 10);
        assert_eq!(config.algorithm(), AlgorithmKind::SlidingWindow);
        assert_eq!(config.namespace(), "api");
        assert_eq!(config.store(), StoreKind::Redis);
        assert_eq!(config.failure_mode(), FailureMode::Open);
    }

    #[test]
    fn test_from_json_validates() {
        let err = RateLimitConfig::from_json(r#"{"windowMs":0,"maxRequests":10}"#).unwrap_err();
        assert!(err.is_validation());

        let err = RateLimitConfig::from_json(r#"{"windowMs":1000,"maxRequests":10,"algorithm":"gcra"}"#)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_json_round_trip_keeps_camel_case() {
        let config = RateLimitConfig::per_second(3)
            .unwrap()
            .with_algorithm(AlgorithmKind::TokenBucket);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"maxRequests\":3"));
        assert!(json.contains("\"algorithm\":\"token-bucket\""));
        assert_eq!(RateLimitConfig::from_json(&json).unwrap(), config);
    }
}
