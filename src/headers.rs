//! HTTP headers and response bodies for rate limiting.
//!
//! Framework-neutral: the middleware adapters turn these into their own
//! header and response types.

use serde_json::{Value, json};

use crate::decision::Decision;

/// Standard rate limit header names.
pub mod names {
    /// Maximum requests allowed per window.
    pub const RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";

    /// Remaining requests in current window.
    pub const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";

    /// Seconds until the rate limit resets.
    pub const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";

    /// Seconds until the client should retry (standard HTTP header).
    pub const RETRY_AFTER: &str = "Retry-After";

    /// The algorithm in effect.
    pub const RATE_LIMIT_POLICY: &str = "X-RateLimit-Policy";
}

/// Error code in the body of a 429 response.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Error code in the body of a 500 response.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Builder for rate limit headers.
#[derive(Debug, Default)]
pub struct RateLimitHeaders {
    limit: Option<u64>,
    remaining: Option<u64>,
    reset: Option<u64>,
    retry_after: Option<u64>,
    policy: Option<&'static str>,
}

impl RateLimitHeaders {
    /// Create a new header builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers describing `decision` as seen at `now_ms`.
    ///
    /// `Retry-After` is set only for denials.
    pub fn from_decision(decision: &Decision, now_ms: u64) -> Self {
        let info = decision.info();
        let mut headers = Self::new()
            .limit(info.limit)
            .remaining(info.remaining)
            .reset(info.reset_seconds(now_ms));

        if decision.is_denied() {
            headers = headers.retry_after(info.retry_after_seconds(now_ms));
        }
        if let Some(algorithm) = info.algorithm {
            headers = headers.policy(algorithm);
        }
        headers
    }

    /// Set the limit header.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the remaining header.
    pub fn remaining(mut self, remaining: u64) -> Self {
        self.remaining = Some(remaining);
        self
    }

    /// Set the reset header (seconds until reset).
    pub fn reset(mut self, reset_seconds: u64) -> Self {
        self.reset = Some(reset_seconds);
        self
    }

    /// Set the retry-after header (seconds until retry).
    pub fn retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Set the policy header.
    pub fn policy(mut self, policy: &'static str) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Value of `Retry-After`, if set.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.retry_after
    }

    /// Convert to a vector of (name, value) pairs.
    pub fn to_vec(&self) -> Vec<(&'static str, String)> {
        let numeric = [
            (names::RATE_LIMIT_LIMIT, self.limit),
            (names::RATE_LIMIT_REMAINING, self.remaining),
            (names::RATE_LIMIT_RESET, self.reset),
            (names::RETRY_AFTER, self.retry_after),
        ];

        let mut headers: Vec<(&'static str, String)> = numeric
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.to_string())))
            .collect();
        if let Some(policy) = self.policy {
            headers.push((names::RATE_LIMIT_POLICY, policy.to_string()));
        }
        headers
    }
}

/// JSON body of a 429 response for `decision`.
///
/// ```text
/// {"error":{"code":"RATE_LIMIT_EXCEEDED","message":"..."},
///  "details":{"limit":10,"algorithm":"fixed-window","retryAfter":42}}
/// ```
pub fn rejection_body(decision: &Decision, now_ms: u64) -> Value {
    let info = decision.info();
    let retry_after = info.retry_after_seconds(now_ms);
    json!({
        "error": {
            "code": RATE_LIMIT_EXCEEDED,
            "message": format!("Too many requests, retry in {} seconds", retry_after),
        },
        "details": {
            "limit": info.limit,
            "algorithm": info.algorithm,
            "retryAfter": retry_after,
        }
    })
}

/// JSON body of a 500 response. Carries no detail about the failure.
pub fn internal_error_body() -> Value {
    json!({
        "error": {
            "code": INTERNAL_ERROR,
            "message": "Internal server error",
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::RateLimitInfo;
    use std::time::Duration;

    #[test]
    fn test_header_builder() {
        let headers = RateLimitHeaders::new()
            .limit(100)
            .remaining(50)
            .reset(30)
            .policy("token-bucket")
            .to_vec();

        assert_eq!(headers.len(), 4);
        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Limit" && v == "100"));
        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Remaining" && v == "50"));
        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Reset" && v == "30"));
        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Policy" && v == "token-bucket"));
    }

    #[test]
    fn test_allowed_decision_has_no_retry_after() {
        let decision = Decision::allowed(RateLimitInfo::new(10, 9, 61_000, 1));
        let headers = RateLimitHeaders::from_decision(&decision, 1_000);

        assert_eq!(headers.retry_after_seconds(), None);
        assert!(headers.to_vec().iter().any(|(k, v)| *k == "X-RateLimit-Reset" && v == "60"));
    }

    #[test]
    fn test_denied_decision_rounds_retry_after_up() {
        let info = RateLimitInfo::new(10, 0, 2_500, 11)
            .with_algorithm("fixed-window")
            .with_retry_after(Duration::from_millis(1_500));
        let decision = Decision::denied(info);

        let headers = RateLimitHeaders::from_decision(&decision, 1_000);
        assert_eq!(headers.retry_after_seconds(), Some(2));

        let body = rejection_body(&decision, 1_000);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["details"]["limit"], 10);
        assert_eq!(body["details"]["algorithm"], "fixed-window");
        assert_eq!(body["details"]["retryAfter"], 2);
    }

    #[test]
    fn test_internal_error_body_is_generic() {
        let body = internal_error_body();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(body.get("details").is_none());
    }
}
