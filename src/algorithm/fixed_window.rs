//! Fixed Window rate limiting algorithm.
//!
//! Counts requests in a window that opens with the first request and lasts
//! `window_ms`. Bursts straddling a window boundary can admit up to twice the
//! limit in a short span; the sliding window algorithm trades a second counter
//! for smoothing that out.

use std::time::Duration;

use crate::algorithm::{Algorithm, Transition};
use crate::config::{AlgorithmKind, RateLimitConfig};
use crate::decision::{Decision, RateLimitInfo};
use crate::storage::AlgorithmState;

/// Fixed Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Create a new Fixed Window algorithm instance.
    pub fn new() -> Self {
        Self
    }
}

impl Algorithm for FixedWindow {
    fn name(&self) -> &'static str {
        AlgorithmKind::FixedWindow.as_str()
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::FixedWindow
    }

    fn process(
        &self,
        current: Option<&AlgorithmState>,
        config: &RateLimitConfig,
        now: u64,
    ) -> Transition {
        let limit = config.max_requests();

        let (count, window_start, reset_time) = match current {
            Some(AlgorithmState::FixedWindow {
                count,
                window_start,
                reset_time,
            }) if now < *reset_time => (count + 1, *window_start, *reset_time),
            _ => (1, now, now.saturating_add(config.window_ms())),
        };

        // Denied requests still count, so total_hits reflects attempted volume.
        let info = RateLimitInfo::new(limit, limit.saturating_sub(count), reset_time, count)
            .with_algorithm(self.name());

        let decision = if count <= limit {
            Decision::allowed(info)
        } else {
            let retry_after = Duration::from_millis(reset_time.saturating_sub(now));
            Decision::denied(info.with_retry_after(retry_after))
        };

        Transition {
            state: AlgorithmState::FixedWindow {
                count,
                window_start,
                reset_time,
            },
            expires_at: reset_time,
            decision,
        }
    }
}
