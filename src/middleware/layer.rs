//! Tower layer for rate limiting in Axum.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode},
    response::IntoResponse,
};
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::clock::Clock;
use crate::decision::Decision;
use crate::extensions::RateLimitExt;
use crate::headers::{RateLimitHeaders, internal_error_body, rejection_body};
use crate::identifier::ExtractIdentifier;
use crate::service::RateLimitService;
use crate::storage::Storage;

/// Tower layer for rate limiting.
pub struct RateLimitLayer<S, E> {
    limiter: RateLimitService<S>,
    extractor: Arc<E>,
}

impl<S, E> RateLimitLayer<S, E> {
    /// Limit requests through `limiter`, counting each against the identifier
    /// `extractor` derives from it.
    pub fn new(limiter: RateLimitService<S>, extractor: E) -> Self {
        Self {
            limiter,
            extractor: Arc::new(extractor),
        }
    }
}

impl<S, E> Clone for RateLimitLayer<S, E> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, E, Inner> Layer<Inner> for RateLimitLayer<S, E> {
    type Service = RateLimitMiddleware<S, E, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// The rate limiting service produced by [`RateLimitLayer`].
pub struct RateLimitMiddleware<S, E, Inner> {
    inner: Inner,
    limiter: RateLimitService<S>,
    extractor: Arc<E>,
}

impl<S, E, Inner: Clone> Clone for RateLimitMiddleware<S, E, Inner> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, E, Inner> Service<Request<Body>> for RateLimitMiddleware<S, E, Inner>
where
    S: Storage,
    E: ExtractIdentifier<Request<Body>>,
    Inner: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let identifier = self.extractor.extract(&request);
        let extractor_name = self.extractor.name();
        // The clone may not be ready; keep the instance poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(identifier) = identifier else {
                debug!(extractor = extractor_name, "no identifier for request, not rate limited");
                return inner.call(request).await;
            };

            let decision = match limiter.check_limit(&identifier).await {
                Ok(decision) => decision,
                Err(e) => {
                    error!(error = %e, "rate limit check failed");
                    return Ok(internal_error_response());
                }
            };
            let now = limiter.clock().now_ms();

            if decision.is_denied() {
                return Ok(rate_limited_response(&decision, now));
            }

            request
                .extensions_mut()
                .insert(RateLimitExt::new(identifier, decision.clone(), now));
            let mut response = inner.call(request).await?;
            apply_headers(
                response.headers_mut(),
                &RateLimitHeaders::from_decision(&decision, now),
            );
            Ok(response)
        })
    }
}

fn apply_headers(map: &mut HeaderMap, headers: &RateLimitHeaders) {
    for (name, value) in headers.to_vec() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            map.insert(name, value);
        }
    }
}

/// Create a 429 Too Many Requests response.
fn rate_limited_response(decision: &Decision, now: u64) -> Response<Body> {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(rejection_body(decision, now)),
    )
        .into_response();
    apply_headers(
        response.headers_mut(),
        &RateLimitHeaders::from_decision(decision, now),
    );
    response
}

fn internal_error_response() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(internal_error_body())).into_response()
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::identifier::{GlobalIdentifier, HeaderIdentifier, StaticIdentifier};
    use crate::storage::MemoryStorage;
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    async fn ok(request: Request<Body>) -> Result<Response<Body>, Infallible> {
        let remaining = request
            .extensions()
            .get::<RateLimitExt>()
            .map(|ext| ext.remaining.to_string())
            .unwrap_or_default();
        Ok(Response::new(Body::from(remaining)))
    }

    fn limiter(max: u64) -> RateLimitService<MemoryStorage> {
        RateLimitService::new(RateLimitConfig::per_minute(max).unwrap(), MemoryStorage::new())
    }

    fn get() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_allows_then_rejects() {
        let layer = RateLimitLayer::new(limiter(1), GlobalIdentifier::new());
        let svc = layer.layer(service_fn(ok));

        let response = svc.clone().oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().get("retry-after").is_none());

        let response = svc.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_missing_identifier_passes_through() {
        let layer = RateLimitLayer::new(limiter(1), HeaderIdentifier::api_key());
        let svc = layer.layer(service_fn(ok));

        for _ in 0..3 {
            let response = svc.clone().oneshot(get()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_empty_static_identifier_passes_through() {
        let layer = RateLimitLayer::new(limiter(1), StaticIdentifier::new(""));
        let svc = layer.layer(service_fn(ok));

        for _ in 0..3 {
            let response = svc.clone().oneshot(get()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
