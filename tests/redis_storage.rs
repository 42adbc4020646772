//! Redis backend tests. They need a server, so they are ignored by default:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379 cargo test --features redis -- --ignored
//! ```

#![cfg(feature = "redis")]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use throttlekit::{
    AlgorithmKind, AlgorithmState, RateLimitConfig, RateLimitService, RateLimitState, RedisConfig,
    RedisStorage, Storage,
};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Storage under a prefix unique to one test, so runs never share keys.
async fn storage(test: &str) -> RedisStorage {
    let prefix = format!("throttlekit-test:{}:{}:", test, std::process::id());
    RedisStorage::new(RedisConfig::new(redis_url()).with_prefix(prefix))
        .await
        .unwrap()
}

fn record(key: &str, count: u64, now: u64) -> RateLimitState {
    RateLimitState::new(
        key,
        AlgorithmState::FixedWindow {
            count,
            window_start: now,
            reset_time: now + 60_000,
        },
        now,
        now + 60_000,
    )
}

#[tokio::test]
#[ignore]
async fn test_redis_save_find_delete() {
    let storage = storage("crud").await;
    let now = throttlekit::clock::current_timestamp_ms();

    storage
        .save("k", record("k", 3, now), Duration::from_secs(60))
        .await
        .unwrap();
    let found = storage.find("k").await.unwrap().unwrap();
    assert_eq!(found.state, record("k", 3, now).state);
    assert!(storage.exists("k").await.unwrap());
    assert_eq!(storage.list_keys("").await.unwrap(), vec!["k"]);

    assert!(storage.delete("k").await.unwrap());
    assert!(!storage.delete("k").await.unwrap());
    assert!(storage.find("k").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_redis_ttl_expires_record() {
    let storage = storage("ttl").await;
    let now = throttlekit::clock::current_timestamp_ms();

    storage
        .save("short", record("short", 1, now), Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!storage.exists("short").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_redis_concurrent_checks_are_exact() {
    let storage = Arc::new(storage("contention").await);
    let config = RateLimitConfig::per_minute(20)
        .unwrap()
        .with_algorithm(AlgorithmKind::SlidingWindow);
    let limiter = RateLimitService::with_shared_storage(config, storage.clone());
    limiter.reset_limit("shared").await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..60 {
        let limiter = limiter.clone();
        set.spawn(async move { limiter.check_limit("shared").await });
    }

    let mut admitted = 0;
    while let Some(joined) = set.join_next().await {
        if joined.unwrap().unwrap().is_allowed() {
            admitted += 1;
        }
    }
    assert!(admitted <= 20, "admitted {admitted}");

    limiter.reset_limit("shared").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_health_check() {
    let storage = storage("health").await;
    let health = storage.health_check().await;
    assert!(health.healthy);
    assert_eq!(health.backend, "redis");
}
