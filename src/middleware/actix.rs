//! Actix-web middleware for rate limiting.
//!
//! # Example
//!
//! ```ignore
//! use actix_web::{web, App, HttpServer};
//! use throttlekit::{
//!     identifier::IpIdentifier,
//!     middleware::actix::RateLimiter,
//!     MemoryStorage, RateLimitConfig, RateLimitService,
//! };
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = RateLimitConfig::per_second(10).unwrap();
//!     let limiter = RateLimitService::new(config, MemoryStorage::new());
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(RateLimiter::new(limiter.clone(), IpIdentifier::new()))
//!             .route("/api/data", web::get().to(handler))
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{
        StatusCode,
        header::{HeaderName, HeaderValue},
    },
};
use tracing::{debug, error};

use crate::clock::Clock;
use crate::decision::Decision;
use crate::headers::{RateLimitHeaders, internal_error_body, rejection_body};
use crate::identifier::ExtractIdentifier;
use crate::service::RateLimitService;
use crate::storage::Storage;

/// Rate limiter middleware for Actix-web.
pub struct RateLimiter<S, E> {
    limiter: RateLimitService<S>,
    extractor: Arc<E>,
}

impl<S, E> RateLimiter<S, E> {
    /// Limit requests through `limiter`, counting each against the identifier
    /// `extractor` derives from it.
    pub fn new(limiter: RateLimitService<S>, extractor: E) -> Self {
        Self {
            limiter,
            extractor: Arc::new(extractor),
        }
    }
}

impl<S, E> Clone for RateLimiter<S, E> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, E, Svc, B> Transform<Svc, ServiceRequest> for RateLimiter<S, E>
where
    S: Storage,
    E: ExtractIdentifier<ServiceRequest>,
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    Svc::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S, E, Svc>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }))
    }
}

/// The actual middleware service.
pub struct RateLimiterMiddleware<S, E, Svc> {
    service: Rc<Svc>,
    limiter: RateLimitService<S>,
    extractor: Arc<E>,
}

impl<S, E, Svc, B> Service<ServiceRequest> for RateLimiterMiddleware<S, E, Svc>
where
    S: Storage,
    E: ExtractIdentifier<ServiceRequest>,
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    Svc::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let identifier = self.extractor.extract(&req);
        let extractor_name = self.extractor.name();

        Box::pin(async move {
            let Some(identifier) = identifier else {
                debug!(extractor = extractor_name, "no identifier for request, not rate limited");
                return Ok(service.call(req).await?.map_into_left_body());
            };

            let decision = match limiter.check_limit(&identifier).await {
                Ok(decision) => decision,
                Err(e) => {
                    error!(error = %e, "rate limit check failed");
                    let response =
                        HttpResponse::InternalServerError().json(internal_error_body());
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };
            let now = limiter.clock().now_ms();
            let headers = RateLimitHeaders::from_decision(&decision, now);

            if decision.is_denied() {
                let response = rate_limited_response(&decision, &headers, now);
                return Ok(req.into_response(response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            for (name, value) in headers.to_vec() {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    res.headers_mut().insert(name, value);
                }
            }
            Ok(res.map_into_left_body())
        })
    }
}

/// Create a 429 Too Many Requests response.
fn rate_limited_response(decision: &Decision, headers: &RateLimitHeaders, now: u64) -> HttpResponse {
    let mut builder = HttpResponse::build(StatusCode::TOO_MANY_REQUESTS);
    for header in headers.to_vec() {
        builder.insert_header(header);
    }
    builder.json(rejection_body(decision, now))
}
