//! Framework middleware for rate limiting.
//!
//! Both adapters do the same three things: derive an identifier with an
//! [`ExtractIdentifier`](crate::identifier::ExtractIdentifier), ask a
//! [`RateLimitService`](crate::RateLimitService), and translate the decision:
//!
//! - **allowed**: the request continues; the response gets `X-RateLimit-Limit`,
//!   `X-RateLimit-Remaining` and `X-RateLimit-Reset`.
//! - **denied**: `429 Too Many Requests` with `Retry-After` and a JSON body
//!   (see [`rejection_body`](crate::headers::rejection_body)).
//! - **no identifier**: the request continues unlimited.
//! - **service error**: a generic `500` that reveals nothing about the cause.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use throttlekit::{
//!     identifier::IpIdentifier,
//!     middleware::RateLimitLayer,
//!     MemoryStorage, RateLimitConfig, RateLimitService,
//! };
//!
//! let limiter = RateLimitService::new(RateLimitConfig::per_second(10)?, MemoryStorage::new());
//!
//! let app = Router::new()
//!     .route("/api/data", get(handler))
//!     .layer(RateLimitLayer::new(limiter, IpIdentifier::new()));
//! ```

#[cfg(feature = "axum")]
mod layer;

#[cfg(feature = "actix")]
pub mod actix;

#[cfg(feature = "axum")]
pub use layer::{RateLimitLayer, RateLimitMiddleware};
