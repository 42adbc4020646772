//! Identifier extraction for rate limiting.
//!
//! An identifier says *who* a request counts against: a client address, a user,
//! an API token, a route, or everyone at once. The middleware adapters take any
//! [`ExtractIdentifier`] and hand its output to
//! [`RateLimitService::check_limit`](crate::RateLimitService::check_limit).
//!
//! Extractors are generic over the request type. They read the request through
//! the accessor traits [`HasIpAddr`], [`HasPath`], [`HasMethod`] and
//! [`HasHeaders`], which are implemented for `http::Request` (with the `axum`
//! feature) and for actix-web's `ServiceRequest` (with the `actix` feature).
//!
//! # Example
//!
//! ```ignore
//! use throttlekit::identifier::{CompositeIdentifier, EitherIdentifier, HeaderIdentifier, IpIdentifier, PathIdentifier};
//!
//! // Per client address
//! let by_ip = IpIdentifier::with_forwarded_for();
//!
//! // Authenticated users by id, everyone else by address
//! let by_user = EitherIdentifier::new(HeaderIdentifier::user_id(), IpIdentifier::new());
//!
//! // Address and path together
//! let by_ip_and_path = CompositeIdentifier::new(IpIdentifier::new(), PathIdentifier::new());
//! ```

mod composite;
mod extractors;

pub use composite::{CompositeIdentifier, EitherIdentifier, OptionalIdentifier};
pub use extractors::*;

/// Derives the rate limiting identifier for a request.
///
/// Returning `None` means the request carries no usable identifier; the
/// middleware then lets it through without consulting the limiter.
pub trait ExtractIdentifier<R>: Send + Sync + 'static {
    /// Extract the identifier from the request.
    fn extract(&self, request: &R) -> Option<String>;

    /// Extractor name for logging.
    fn name(&self) -> &'static str;
}

/// One shared quota for every request.
#[derive(Debug, Clone, Default)]
pub struct GlobalIdentifier;

impl GlobalIdentifier {
    /// Create a new global identifier.
    pub fn new() -> Self {
        Self
    }
}

impl<R> ExtractIdentifier<R> for GlobalIdentifier {
    fn extract(&self, _request: &R) -> Option<String> {
        Some("global".to_string())
    }

    fn name(&self) -> &'static str {
        "global"
    }
}

/// Identifier computed by a closure.
#[derive(Clone)]
pub struct FnIdentifier<F> {
    extractor: F,
    name: &'static str,
}

impl<F> std::fmt::Debug for FnIdentifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnIdentifier").field("name", &self.name).finish()
    }
}

impl<F> FnIdentifier<F> {
    /// Create a new closure-based extractor.
    pub fn new(name: &'static str, extractor: F) -> Self {
        Self { extractor, name }
    }
}

impl<R, F> ExtractIdentifier<R> for FnIdentifier<F>
where
    F: Fn(&R) -> Option<String> + Send + Sync + 'static,
{
    fn extract(&self, request: &R) -> Option<String> {
        (self.extractor)(request).filter(|id| !id.is_empty())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// A fixed identifier, e.g. to give one mounted router its own quota.
///
/// An empty value identifies nothing, so requests pass through unlimited.
#[derive(Debug, Clone)]
pub struct StaticIdentifier {
    value: String,
}

impl StaticIdentifier {
    /// Create a new static identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl<R> ExtractIdentifier<R> for StaticIdentifier {
    fn extract(&self, _request: &R) -> Option<String> {
        Some(self.value.clone()).filter(|id| !id.is_empty())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
