//! Request extensions for accessing rate limit info in handlers.
//!
//! # Example
//!
//! ```ignore
//! use axum::Extension;
//! use throttlekit::extensions::RateLimitExt;
//!
//! async fn handler(Extension(rate_limit): Extension<RateLimitExt>) {
//!     println!("Remaining: {}", rate_limit.remaining);
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::decision::Decision;

/// Rate limit information attached to admitted requests by the axum middleware.
#[derive(Debug, Clone)]
pub struct RateLimitExt {
    /// The identifier the request was counted against.
    pub identifier: String,
    /// The rate limit decision.
    pub decision: Decision,
    /// Remaining requests in the current window.
    pub remaining: u64,
    /// Maximum requests allowed.
    pub limit: u64,
    /// Seconds until reset, as of the check.
    pub reset_seconds: u64,
}

impl RateLimitExt {
    /// Create a new rate limit extension from a decision taken at `now_ms`.
    pub fn new(identifier: impl Into<String>, decision: Decision, now_ms: u64) -> Self {
        let info = decision.info();
        Self {
            identifier: identifier.into(),
            remaining: info.remaining,
            limit: info.limit,
            reset_seconds: info.reset_seconds(now_ms),
            decision,
        }
    }

    /// Check if the request was allowed.
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Whether the decision was made without storage (see `FailureMode`).
    pub fn is_degraded(&self) -> bool {
        self.decision
            .info()
            .metadata
            .as_ref()
            .is_some_and(|m| m.degraded)
    }
}

/// Rate limit info that can be serialized to JSON.
///
/// Useful for returning rate limit information in API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    /// Whether the request was allowed.
    pub allowed: bool,
    /// Maximum requests allowed per window.
    pub limit: u64,
    /// Remaining requests in current window.
    pub remaining: u64,
    /// Seconds until the rate limit resets.
    pub reset_in_seconds: u64,
}

impl From<&RateLimitExt> for RateLimitResponse {
    fn from(ext: &RateLimitExt) -> Self {
        Self {
            allowed: ext.is_allowed(),
            limit: ext.limit,
            remaining: ext.remaining,
            reset_in_seconds: ext.reset_seconds,
        }
    }
}
