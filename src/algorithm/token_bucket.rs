//! Token Bucket rate limiting algorithm.

use std::time::Duration;

use crate::algorithm::{Algorithm, Transition};
use crate::config::{AlgorithmKind, RateLimitConfig};
use crate::decision::{Decision, DecisionMetadata, RateLimitInfo};
use crate::storage::AlgorithmState;

/// Token Bucket rate limiting algorithm.
///
/// Allows controlled bursts while enforcing an average rate limit.
/// The bucket holds up to `max_requests` tokens, starts full, and refills
/// continuously at the configured rate. Each admitted request takes one token.
#[derive(Debug, Clone, Default)]
pub struct TokenBucket;

impl TokenBucket {
    /// Create a new Token Bucket algorithm instance.
    pub fn new() -> Self {
        Self
    }

    /// Calculate token refill based on elapsed time.
    fn calculate_refill(&self, elapsed_ms: u64, refill_rate: f64) -> f64 {
        let elapsed_secs = elapsed_ms as f64 / 1000.0;
        elapsed_secs * refill_rate
    }

    /// Milliseconds until `tokens` reaches `target`, rounded up.
    fn time_to(&self, tokens: f64, target: f64, refill_rate: f64) -> u64 {
        let missing = target - tokens;
        if missing <= 0.0 {
            0
        } else {
            (missing / refill_rate * 1000.0).ceil() as u64
        }
    }
}

impl Algorithm for TokenBucket {
    fn name(&self) -> &'static str {
        AlgorithmKind::TokenBucket.as_str()
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::TokenBucket
    }

    fn process(
        &self,
        current: Option<&AlgorithmState>,
        config: &RateLimitConfig,
        now: u64,
    ) -> Transition {
        let capacity = config.capacity();
        let refill_rate = config.effective_refill_rate();
        let limit = config.max_requests();

        let (mut tokens, last_refill_time) = match current {
            Some(AlgorithmState::TokenBucket {
                tokens,
                last_refill_time,
            }) => (tokens.min(capacity), *last_refill_time),
            _ => (capacity, now),
        };

        if now > last_refill_time {
            let refill = self.calculate_refill(now - last_refill_time, refill_rate);
            tokens = (tokens + refill).min(capacity);
        }
        let last_refill_time = last_refill_time.max(now);

        let allowed = tokens >= 1.0;
        if allowed {
            tokens -= 1.0;
        }

        let remaining = tokens.floor() as u64;
        let reset_time = now.saturating_add(self.time_to(tokens, 1.0, refill_rate));
        let info = RateLimitInfo::new(limit, remaining, reset_time, limit - remaining)
            .with_algorithm(self.name())
            .with_metadata(DecisionMetadata::new().with_tokens_available(tokens));

        let decision = if allowed {
            Decision::allowed(info)
        } else {
            let retry_after = Duration::from_millis(reset_time.saturating_sub(now));
            Decision::denied(info.with_retry_after(retry_after))
        };

        // Once full again the record is indistinguishable from no record.
        let expires_at = now.saturating_add(self.time_to(tokens, capacity, refill_rate).max(1));

        Transition {
            state: AlgorithmState::TokenBucket {
                tokens,
                last_refill_time,
            },
            expires_at,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        algorithm: &TokenBucket,
        state: &mut Option<AlgorithmState>,
        config: &RateLimitConfig,
        now: u64,
    ) -> Decision {
        let transition = algorithm.process(state.as_ref(), config, now);
        *state = Some(transition.state);
        transition.decision
    }

    fn one_per_second(capacity: u64) -> RateLimitConfig {
        RateLimitConfig::builder()
            .max_requests(capacity)
            .window(Duration::from_secs(capacity))
            .algorithm(AlgorithmKind::TokenBucket)
            .build()
            .unwrap()
    }

    #[test]
    fn test_token_bucket_basic() {
        let algorithm = TokenBucket::new();
        let config = one_per_second(5);
        let mut state = None;

        for i in 1..=5 {
            let decision = run(&algorithm, &mut state, &config, 10_000);
            assert!(decision.is_allowed(), "Request {} should be allowed", i);
            assert_eq!(decision.remaining(), 5 - i);
        }

        let decision = run(&algorithm, &mut state, &config, 10_000);
        assert!(decision.is_denied());
        assert_eq!(decision.reset_time(), 11_000);
        assert_eq!(decision.info().retry_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_token_bucket_refill() {
        let algorithm = TokenBucket::new();
        let config = one_per_second(5);
        let mut state = None;

        for _ in 0..5 {
            run(&algorithm, &mut state, &config, 10_000);
        }

        assert!(run(&algorithm, &mut state, &config, 10_500).is_denied());
        assert!(run(&algorithm, &mut state, &config, 11_000).is_allowed());
        assert!(run(&algorithm, &mut state, &config, 11_000).is_denied());
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let algorithm = TokenBucket::new();
        let config = one_per_second(3);
        let mut state = None;

        run(&algorithm, &mut state, &config, 0);
        let decision = run(&algorithm, &mut state, &config, 3_600_000);
        assert_eq!(decision.remaining(), 2);
        match state {
            Some(AlgorithmState::TokenBucket { tokens, .. }) => assert!(tokens <= 3.0),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_custom_refill_rate() {
        let algorithm = TokenBucket::new();
        let config = RateLimitConfig::builder()
            .max_requests(2)
            .window(Duration::from_secs(60))
            .algorithm(AlgorithmKind::TokenBucket)
            .refill_rate(10.0)
            .build()
            .unwrap();
        let mut state = None;

        run(&algorithm, &mut state, &config, 0);
        run(&algorithm, &mut state, &config, 0);
        assert!(run(&algorithm, &mut state, &config, 0).is_denied());
        assert!(run(&algorithm, &mut state, &config, 100).is_allowed());
    }

    #[test]
    fn test_expires_when_full() {
        let algorithm = TokenBucket::new();
        let config = one_per_second(5);
        let transition = algorithm.process(None, &config, 1_000);
        // 4 tokens left, one second to get back to 5
        assert_eq!(transition.expires_at, 2_000);
    }

    #[test]
    fn test_negligible_refill_rate_saturates() {
        let algorithm = TokenBucket::new();
        let config = RateLimitConfig::builder()
            .max_requests(1)
            .window(Duration::from_secs(60))
            .algorithm(AlgorithmKind::TokenBucket)
            .refill_rate(1e-20)
            .build()
            .unwrap();
        let mut state = None;

        let decision = run(&algorithm, &mut state, &config, 10_000);
        assert!(decision.is_allowed());
        assert_eq!(decision.reset_time(), u64::MAX);

        let decision = run(&algorithm, &mut state, &config, 20_000);
        assert!(decision.is_denied());
        assert_eq!(decision.reset_time(), u64::MAX);
        assert_eq!(
            decision.info().retry_after,
            Some(Duration::from_millis(u64::MAX - 20_000))
        );
    }
}
