//! Persisted per-key throttling record.

use serde::{Deserialize, Serialize};

use crate::config::AlgorithmKind;

/// Record stored for one rate limiting key.
///
/// The algorithm-specific part lives in [`AlgorithmState`]; the header fields
/// are shared by every algorithm and are what the storage layer looks at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitState {
    /// Storage key this record belongs to.
    pub key: String,

    /// First observation of the key (Unix milliseconds). Diagnostic only.
    pub created_at: u64,

    /// Instant after which the record carries no information (Unix milliseconds).
    ///
    /// Storage backends expire the record at or shortly after this time.
    pub expires_at: u64,

    /// Algorithm-specific counters.
    pub state: AlgorithmState,
}

/// Algorithm-specific part of a [`RateLimitState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum AlgorithmState {
    /// Fixed window counter.
    FixedWindow {
        /// Requests seen in the window, including denied ones.
        count: u64,
        /// Window start (Unix milliseconds).
        window_start: u64,
        /// Window end, `window_start + window_ms`.
        reset_time: u64,
    },

    /// Sliding window counters.
    SlidingWindow {
        /// Admitted requests in the window starting at `window_start`.
        current_count: u64,
        /// Admitted requests in the window immediately before it.
        previous_count: u64,
        /// Start of the current aligned window (Unix milliseconds).
        window_start: u64,
    },

    /// Token bucket level.
    TokenBucket {
        /// Tokens available after the last refill.
        tokens: f64,
        /// Time of the last refill (Unix milliseconds).
        last_refill_time: u64,
    },
}

impl AlgorithmState {
    /// The algorithm that owns this state.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::FixedWindow { .. } => AlgorithmKind::FixedWindow,
            Self::SlidingWindow { .. } => AlgorithmKind::SlidingWindow,
            Self::TokenBucket { .. } => AlgorithmKind::TokenBucket,
        }
    }
}

impl RateLimitState {
    /// Create a record.
    pub fn new(key: impl Into<String>, state: AlgorithmState, created_at: u64, expires_at: u64) -> Self {
        Self {
            key: key.into(),
            created_at,
            expires_at,
            state,
        }
    }

    /// Whether the record is past its useful lifetime at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    /// Milliseconds of life left at `now`.
    pub fn remaining_ttl_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Check the structural invariants of a record read from a backend.
    ///
    /// Returns the violated invariant on failure.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.key.is_empty() {
            return Err("empty key".into());
        }
        match &self.state {
            AlgorithmState::FixedWindow {
                window_start,
                reset_time,
                ..
            } => {
                if reset_time <= window_start {
                    return Err(format!(
                        "reset_time {reset_time} is not after window_start {window_start}"
                    ));
                }
            }
            AlgorithmState::SlidingWindow { .. } => {}
            AlgorithmState::TokenBucket { tokens, .. } => {
                if !tokens.is_finite() || *tokens < 0.0 {
                    return Err(format!("token level {tokens} out of range"));
                }
            }
        }
        Ok(())
    }
}
