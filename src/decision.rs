//! Decision types for rate limiting results.
//!
//! Every `check_limit` call produces a [`Decision`]: whether the request is
//! admitted, plus the quota figures an adapter needs for response headers.
//! Decisions are never persisted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request is allowed.
    allowed: bool,
    /// Rate limit information.
    info: RateLimitInfo,
}

impl Decision {
    /// Create a new "allowed" decision.
    pub fn allowed(info: RateLimitInfo) -> Self {
        Self {
            allowed: true,
            info,
        }
    }

    /// Create a new "denied" decision.
    pub fn denied(info: RateLimitInfo) -> Self {
        Self {
            allowed: false,
            info,
        }
    }

    /// Check if the request is allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if the request is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Get the rate limit info.
    pub fn info(&self) -> &RateLimitInfo {
        &self.info
    }

    /// Requests still permitted in the current period.
    pub fn remaining(&self) -> u64 {
        self.info.remaining
    }

    /// When the caller may retry with a full quota (Unix milliseconds).
    pub fn reset_time(&self) -> u64 {
        self.info.reset_time
    }

    /// Count after this request.
    pub fn total_hits(&self) -> u64 {
        self.info.total_hits
    }

    /// Consume the decision and return the info.
    pub fn into_info(self) -> RateLimitInfo {
        self.info
    }
}

/// Quota figures attached to a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed.
    pub limit: u64,
    /// Remaining requests in the current period.
    pub remaining: u64,
    /// When the rate limit resets (Unix milliseconds).
    pub reset_time: u64,
    /// Requests counted in the current period, this one included.
    pub total_hits: u64,
    /// How long to wait before retrying (only set when rate limited).
    pub retry_after: Option<Duration>,
    /// Name of the algorithm that made this decision.
    pub algorithm: Option<&'static str>,
    /// Additional metadata.
    pub metadata: Option<DecisionMetadata>,
}

impl RateLimitInfo {
    /// Create a new rate limit info.
    pub fn new(limit: u64, remaining: u64, reset_time: u64, total_hits: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_time,
            total_hits,
            retry_after: None,
            algorithm: None,
            metadata: None,
        }
    }

    /// Set the retry-after duration.
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Set the algorithm name.
    pub fn with_algorithm(mut self, name: &'static str) -> Self {
        self.algorithm = Some(name);
        self
    }

    /// Set additional metadata.
    pub fn with_metadata(mut self, metadata: DecisionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Time left until reset, as seen at `now_ms`.
    pub fn time_until_reset(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.reset_time.saturating_sub(now_ms))
    }

    /// Whole seconds until reset, rounded up.
    pub fn reset_seconds(&self, now_ms: u64) -> u64 {
        self.reset_time.saturating_sub(now_ms).div_ceil(1000)
    }

    /// Seconds a denied caller should wait, rounded up and at least 1.
    pub fn retry_after_seconds(&self, now_ms: u64) -> u64 {
        let from_reset = self.reset_seconds(now_ms);
        let hinted = self
            .retry_after
            .map(|d| (d.as_millis() as u64).div_ceil(1000))
            .unwrap_or(0);
        from_reset.max(hinted).max(1)
    }
}

/// Additional metadata about a rate limit decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Storage key the decision was made for.
    pub key: Option<String>,
    /// Tokens left in the bucket (token bucket only).
    pub tokens_available: Option<f64>,
    /// Weighted request count (sliding window only).
    pub effective_count: Option<f64>,
    /// Set when the decision was synthesized because storage failed.
    pub degraded: bool,
}

impl DecisionMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set tokens available.
    pub fn with_tokens_available(mut self, tokens: f64) -> Self {
        self.tokens_available = Some(tokens);
        self
    }

    /// Set the weighted count.
    pub fn with_effective_count(mut self, count: f64) -> Self {
        self.effective_count = Some(count);
        self
    }

    /// Mark the decision as produced without consulting storage.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}
