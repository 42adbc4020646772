//! Rate limiting algorithm trait and implementations.
//!
//! Algorithms are pure decision functions: given the stored state for a key
//! (or none), the limiter configuration and the current time, they return the
//! next state and a verdict. They never touch storage and never block; the
//! service runs them inside the storage backend's per-key critical section.
//!
//! # Available Algorithms
//!
//! | Algorithm | Accuracy | Memory | Burst | Best For |
//! |-----------|----------|--------|-------|----------|
//! | Fixed Window | Low | 1 counter | Up to 2x at boundaries | Simple use cases |
//! | Sliding Window | Medium | 2 counters | Smoothed | General purpose |
//! | Token Bucket | High | 1 float + timestamp | Up to capacity | Bursty traffic |

mod fixed_window;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use std::sync::Arc;

use crate::config::{AlgorithmKind, RateLimitConfig};
use crate::decision::Decision;
use crate::storage::AlgorithmState;

/// Outcome of running an algorithm once.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to persist.
    pub state: AlgorithmState,
    /// When the persisted state stops carrying information (Unix milliseconds).
    pub expires_at: u64,
    /// Verdict for the request.
    pub decision: Decision,
}

/// Rate limiting algorithm.
///
/// Implementations must treat a `current` state belonging to another
/// algorithm as absent.
pub trait Algorithm: Send + Sync + 'static {
    /// Get the algorithm name (for logging/metrics).
    fn name(&self) -> &'static str;

    /// The configuration tag this algorithm implements.
    fn kind(&self) -> AlgorithmKind;

    /// Decide on one request at `now` (Unix milliseconds).
    fn process(
        &self,
        current: Option<&AlgorithmState>,
        config: &RateLimitConfig,
        now: u64,
    ) -> Transition;
}

/// Instantiate the algorithm selected by a configuration.
pub fn for_kind(kind: AlgorithmKind) -> Arc<dyn Algorithm> {
    match kind {
        AlgorithmKind::FixedWindow => Arc::new(FixedWindow::new()),
        AlgorithmKind::SlidingWindow => Arc::new(SlidingWindow::new()),
        AlgorithmKind::TokenBucket => Arc::new(TokenBucket::new()),
    }
}
