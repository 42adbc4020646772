//! Sliding Window rate limiting algorithm.
//!
//! Approximates a true sliding window with two counters per key: admitted
//! requests in the current aligned window and in the one before it. The
//! previous window's count is weighted by how much of it still overlaps a
//! window ending now:
//!
//! ```text
//! effective = current + previous * (1 - elapsed / window)
//! ```
//!
//! Windows are aligned to multiples of `window_ms` since the epoch. When more
//! than one full window has passed since the stored one, both counters start
//! over at zero.

use std::time::Duration;

use crate::algorithm::{Algorithm, Transition};
use crate::config::{AlgorithmKind, RateLimitConfig};
use crate::decision::{Decision, DecisionMetadata, RateLimitInfo};
use crate::storage::AlgorithmState;

/// Sliding Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow;

impl SlidingWindow {
    /// Create a new Sliding Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    /// Calculate the current window start.
    fn window_start(&self, now: u64, window_ms: u64) -> u64 {
        (now / window_ms) * window_ms
    }

    /// Calculate weighted count using current and previous window.
    fn weighted_count(&self, current: u64, previous: u64, window_progress: f64) -> f64 {
        current as f64 + (previous as f64 * (1.0 - window_progress))
    }

    /// Earliest time a request would be admitted, given a denial at `now`.
    fn next_admission(
        &self,
        current: u64,
        previous: u64,
        limit: u64,
        window_start: u64,
        window_ms: u64,
        now: u64,
    ) -> u64 {
        let w = window_ms as f64;
        let at = if current < limit && previous > 0 {
            // previous * (1 - t / w) must drop below limit - current
            let t = w * (1.0 - (limit - current) as f64 / previous as f64);
            window_start.saturating_add(t.max(0.0) as u64).saturating_add(1)
        } else {
            // In the next window the current count becomes the decaying one.
            let t = w * (1.0 - limit as f64 / current.max(1) as f64);
            window_start
                .saturating_add(window_ms)
                .saturating_add(t.max(0.0) as u64)
                .saturating_add(1)
        };
        at.max(now.saturating_add(1))
    }
}

impl Algorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        AlgorithmKind::SlidingWindow.as_str()
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SlidingWindow
    }

    fn process(
        &self,
        current: Option<&AlgorithmState>,
        config: &RateLimitConfig,
        now: u64,
    ) -> Transition {
        let window_ms = config.window_ms();
        let limit = config.max_requests();
        let aligned = self.window_start(now, window_ms);

        let (current_count, prev_count, window_start) = match current {
            Some(AlgorithmState::SlidingWindow {
                current_count,
                previous_count,
                window_start,
            }) if *window_start >= aligned => {
                // Same window (or a clock that stepped back): keep counting.
                (*current_count, *previous_count, *window_start)
            }
            Some(AlgorithmState::SlidingWindow {
                current_count,
                window_start,
                ..
            }) if window_start.checked_add(window_ms) == Some(aligned) => {
                // We're in the next window, use current as previous
                (0, *current_count, aligned)
            }
            _ => (0, 0, aligned),
        };

        let window_progress = now.saturating_sub(window_start) as f64 / window_ms as f64;
        let weighted = self.weighted_count(current_count, prev_count, window_progress);
        let reset_time = window_start.saturating_add(window_ms);
        // The record outlives the next window, where it is the decaying count.
        let expires_at = window_start.saturating_add(window_ms.saturating_mul(2));
        let metadata = DecisionMetadata::new().with_effective_count(weighted);

        if weighted < limit as f64 {
            let new_count = current_count + 1;
            let remaining = (limit as f64 - weighted - 1.0).max(0.0) as u64;
            let info = RateLimitInfo::new(limit, remaining, reset_time, new_count)
                .with_algorithm(self.name())
                .with_metadata(metadata);

            Transition {
                state: AlgorithmState::SlidingWindow {
                    current_count: new_count,
                    previous_count: prev_count,
                    window_start,
                },
                expires_at,
                decision: Decision::allowed(info),
            }
        } else {
            let retry_at = self.next_admission(
                current_count,
                prev_count,
                limit,
                window_start,
                window_ms,
                now,
            );
            let info = RateLimitInfo::new(limit, 0, reset_time, current_count)
                .with_algorithm(self.name())
                .with_metadata(metadata)
                .with_retry_after(Duration::from_millis(retry_at.saturating_sub(now)));

            Transition {
                state: AlgorithmState::SlidingWindow {
                    current_count,
                    previous_count: prev_count,
                    window_start,
                },
                expires_at,
                decision: Decision::denied(info),
            }
        }
    }
}
