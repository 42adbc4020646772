//! Pluggable request admission control for Rust services.
//!
//! `throttlekit` decides whether a request may proceed, based on how many
//! requests the same identifier has made recently:
//!
//! - **Three Algorithms**: Fixed Window, Sliding Window and Token Bucket
//! - **Pluggable Storage**: In-memory with GC, Redis with connection pooling
//! - **Per-Key Atomicity**: every check is one atomic read-modify-write in storage
//! - **Explicit Failure Policy**: fail open, fail closed, or surface storage errors
//! - **Framework Integration**: Axum (tower) and Actix-web middleware
//!
//! # Quick Start
//!
//! ```ignore
//! use throttlekit::{MemoryStorage, RateLimitConfig, RateLimitService};
//!
//! #[tokio::main]
//! async fn main() -> throttlekit::Result<()> {
//!     let config = RateLimitConfig::per_second(10)?;
//!     let limiter = RateLimitService::new(config, MemoryStorage::new());
//!
//!     let decision = limiter.check_limit("user:123").await?;
//!     if decision.is_allowed() {
//!         println!("Request allowed! {} remaining", decision.remaining());
//!     } else {
//!         println!("Rate limited! Retry after {:?}", decision.info().retry_after);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Best For | State per key |
//! |-----------|----------|---------------|
//! | Fixed Window | Simple use cases | Counter + window bounds |
//! | Sliding Window | General purpose | Two counters |
//! | Token Bucket | Bursty traffic | Token count + refill time |
//!
//! # Feature Flags
//!
//! - `memory` (default): In-memory storage with garbage collection
//! - `redis`: Redis storage backend
//! - `axum`: Axum middleware integration
//! - `actix`: Actix-web middleware integration
//! - `full`: everything above

pub mod algorithm;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod extensions;
pub mod headers;
pub mod identifier;
pub mod key;
pub mod service;
pub mod storage;

#[cfg(any(feature = "axum", feature = "actix"))]
pub mod middleware;

// Re-export main types
pub use algorithm::{Algorithm, FixedWindow, SlidingWindow, TokenBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AlgorithmKind, FailureMode, RateLimitConfig, RateLimitConfigBuilder, StoreKind};
pub use decision::{Decision, DecisionMetadata, RateLimitInfo};
pub use error::{ConfigError, ConnectionError, RateLimitError, Result, StorageError};
pub use identifier::ExtractIdentifier;
pub use key::KeyGenerator;
pub use service::RateLimitService;
pub use storage::{AlgorithmState, HealthCheckResult, RateLimitState, Storage};

// Re-export extensions and headers
pub use extensions::{RateLimitExt, RateLimitResponse};
pub use headers::RateLimitHeaders;

// Re-export storage types
#[cfg(feature = "memory")]
pub use storage::{GcConfig, GcInterval, MemoryStorage};

#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisStorage};

#[cfg(any(feature = "memory", feature = "redis"))]
pub use storage::StorageBackend;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{AlgorithmKind, FailureMode, RateLimitConfig};
    pub use crate::decision::{Decision, RateLimitInfo};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::identifier::ExtractIdentifier;
    pub use crate::service::RateLimitService;
    pub use crate::storage::Storage;

    #[cfg(feature = "memory")]
    pub use crate::storage::{GcConfig, GcInterval, MemoryStorage};

    #[cfg(feature = "redis")]
    pub use crate::storage::{RedisConfig, RedisStorage};
}
