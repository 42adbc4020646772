//! Stock extractors and the request accessor traits they read through.

use std::net::IpAddr;

use crate::identifier::ExtractIdentifier;

/// Requests that know the client's address.
pub trait HasIpAddr {
    /// Address of the connected peer.
    fn client_ip(&self) -> Option<IpAddr>;
}

/// Requests that have a path.
pub trait HasPath {
    /// The request path, without the query string.
    fn path(&self) -> &str;
}

/// Requests that have a method.
pub trait HasMethod {
    /// The request method (GET, POST, etc).
    fn method(&self) -> &str;
}

/// Requests that have headers.
pub trait HasHeaders {
    /// A header value by lowercase name, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;
}

/// Client network address.
///
/// Behind a reverse proxy, configure the header the proxy writes the original
/// address to; its first entry wins over the peer address.
#[derive(Debug, Clone, Default)]
pub struct IpIdentifier {
    proxy_header: Option<&'static str>,
}

impl IpIdentifier {
    /// Use the peer address only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer the first address in `X-Forwarded-For`.
    pub fn with_forwarded_for() -> Self {
        Self::with_header("x-forwarded-for")
    }

    /// Prefer `X-Real-IP`.
    pub fn with_real_ip() -> Self {
        Self::with_header("x-real-ip")
    }

    /// Prefer a custom header.
    pub fn with_header(header: &'static str) -> Self {
        Self {
            proxy_header: Some(header),
        }
    }
}

impl<R> ExtractIdentifier<R> for IpIdentifier
where
    R: HasIpAddr + HasHeaders,
{
    fn extract(&self, request: &R) -> Option<String> {
        let forwarded = self
            .proxy_header
            .and_then(|header| request.header(header))
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match forwarded {
            Some(ip) => Some(format!("ip:{}", ip)),
            None => request.client_ip().map(|ip| format!("ip:{}", ip)),
        }
    }

    fn name(&self) -> &'static str {
        "ip"
    }
}

/// Value of a request header: an auth token, an API key, a user id.
#[derive(Debug, Clone)]
pub struct HeaderIdentifier {
    header_name: &'static str,
    label: &'static str,
    strip_bearer: bool,
}

impl HeaderIdentifier {
    /// Identify by the raw value of `header_name` (lowercase).
    pub fn new(header_name: &'static str) -> Self {
        Self {
            header_name,
            label: "header",
            strip_bearer: false,
        }
    }

    /// The credential in `Authorization`, with any `Bearer ` scheme removed.
    pub fn authorization() -> Self {
        Self {
            header_name: "authorization",
            label: "token",
            strip_bearer: true,
        }
    }

    /// The `X-API-Key` header.
    pub fn api_key() -> Self {
        Self {
            header_name: "x-api-key",
            label: "api_key",
            strip_bearer: false,
        }
    }

    /// An authenticated user id set by an upstream auth layer in `X-User-Id`.
    pub fn user_id() -> Self {
        Self {
            header_name: "x-user-id",
            label: "user",
            strip_bearer: false,
        }
    }
}

impl<R: HasHeaders> ExtractIdentifier<R> for HeaderIdentifier {
    fn extract(&self, request: &R) -> Option<String> {
        let mut value = request.header(self.header_name)?.trim();
        if self.strip_bearer {
            value = strip_bearer(value);
        }
        if value.is_empty() {
            return None;
        }
        if self.label == "header" {
            Some(format!("header:{}:{}", self.header_name, value))
        } else {
            Some(format!("{}:{}", self.label, value))
        }
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Drop a case-insensitive `Bearer` scheme; a bare scheme leaves nothing.
fn strip_bearer(value: &str) -> &str {
    match value.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        None if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    }
}

/// The concrete request path, so `/users/1` and `/users/2` are counted apart.
#[derive(Debug, Clone, Default)]
pub struct PathIdentifier;

impl PathIdentifier {
    /// Create a new path identifier.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasPath> ExtractIdentifier<R> for PathIdentifier {
    fn extract(&self, request: &R) -> Option<String> {
        Some(format!("path:{}", request.path()))
    }

    fn name(&self) -> &'static str {
        "path"
    }
}

/// The request method.
#[derive(Debug, Clone, Default)]
pub struct MethodIdentifier;

impl MethodIdentifier {
    /// Create a new method identifier.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasMethod> ExtractIdentifier<R> for MethodIdentifier {
    fn extract(&self, request: &R) -> Option<String> {
        Some(format!("method:{}", request.method()))
    }

    fn name(&self) -> &'static str {
        "method"
    }
}

/// A route pattern plus the request method.
///
/// Unlike [`PathIdentifier`] every path matched by the pattern (e.g.
/// `/users/{id}`) shares one quota per method. Attach it where the route is
/// known, typically as a layer on that route.
#[derive(Debug, Clone)]
pub struct RouteIdentifier {
    pattern: String,
}

impl RouteIdentifier {
    /// Create a route identifier for `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl<R: HasMethod> ExtractIdentifier<R> for RouteIdentifier {
    fn extract(&self, request: &R) -> Option<String> {
        Some(format!("route:{} {}", request.method(), self.pattern))
    }

    fn name(&self) -> &'static str {
        "route"
    }
}

#[cfg(feature = "axum")]
mod http_request {
    use std::net::{IpAddr, SocketAddr};

    use axum::extract::ConnectInfo;

    use super::{HasHeaders, HasIpAddr, HasMethod, HasPath};

    impl<B> HasIpAddr for http::Request<B> {
        fn client_ip(&self) -> Option<IpAddr> {
            self.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        }
    }

    impl<B> HasPath for http::Request<B> {
        fn path(&self) -> &str {
            self.uri().path()
        }
    }

    impl<B> HasMethod for http::Request<B> {
        fn method(&self) -> &str {
            http::Request::method(self).as_str()
        }
    }

    impl<B> HasHeaders for http::Request<B> {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers().get(name).and_then(|v| v.to_str().ok())
        }
    }
}

#[cfg(feature = "actix")]
mod actix_request {
    use std::net::IpAddr;

    use actix_web::dev::ServiceRequest;

    use super::{HasHeaders, HasIpAddr, HasMethod, HasPath};

    impl HasIpAddr for ServiceRequest {
        fn client_ip(&self) -> Option<IpAddr> {
            self.peer_addr().map(|addr| addr.ip())
        }
    }

    impl HasPath for ServiceRequest {
        fn path(&self) -> &str {
            ServiceRequest::path(self)
        }
    }

    impl HasMethod for ServiceRequest {
        fn method(&self) -> &str {
            ServiceRequest::method(self).as_str()
        }
    }

    impl HasHeaders for ServiceRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers().get(name).and_then(|v| v.to_str().ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockRequest {
        ip: Option<IpAddr>,
        path: String,
        method: String,
        headers: HashMap<String, String>,
    }

    impl HasIpAddr for MockRequest {
        fn client_ip(&self) -> Option<IpAddr> {
            self.ip
        }
    }

    impl HasPath for MockRequest {
        fn path(&self) -> &str {
            &self.path
        }
    }

    impl HasMethod for MockRequest {
        fn method(&self) -> &str {
            &self.method
        }
    }

    impl HasHeaders for MockRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).map(|s| s.as_str())
        }
    }

    fn with_header(name: &str, value: &str) -> MockRequest {
        let mut req = MockRequest::default();
        req.headers.insert(name.into(), value.into());
        req
    }

    #[test]
    fn test_ip_identifier() {
        let req = MockRequest {
            ip: Some("192.168.1.1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(IpIdentifier::new().extract(&req), Some("ip:192.168.1.1".to_string()));
        assert_eq!(IpIdentifier::new().extract(&MockRequest::default()), None);
    }

    #[test]
    fn test_ip_identifier_prefers_proxy_header() {
        let mut req = with_header("x-forwarded-for", "203.0.113.50, 70.41.3.18");
        req.ip = Some("10.0.0.1".parse().unwrap());

        assert_eq!(
            IpIdentifier::with_forwarded_for().extract(&req),
            Some("ip:203.0.113.50".to_string())
        );
        // Header ignored unless configured
        assert_eq!(IpIdentifier::new().extract(&req), Some("ip:10.0.0.1".to_string()));
    }

    #[test]
    fn test_authorization_strips_bearer() {
        let req = with_header("authorization", "Bearer abc.def");
        assert_eq!(
            HeaderIdentifier::authorization().extract(&req),
            Some("token:abc.def".to_string())
        );

        let req = with_header("authorization", "Bearer ");
        assert_eq!(HeaderIdentifier::authorization().extract(&req), None);
    }

    #[test]
    fn test_header_identifiers() {
        let req = with_header("x-api-key", "secret-key");
        assert_eq!(
            HeaderIdentifier::api_key().extract(&req),
            Some("api_key:secret-key".to_string())
        );

        let req = with_header("x-user-id", "42");
        assert_eq!(HeaderIdentifier::user_id().extract(&req), Some("user:42".to_string()));
        assert_eq!(HeaderIdentifier::api_key().extract(&req), None);

        let req = with_header("x-tenant", "acme");
        assert_eq!(
            HeaderIdentifier::new("x-tenant").extract(&req),
            Some("header:x-tenant:acme".to_string())
        );
    }

    #[test]
    fn test_path_and_method_identifiers() {
        let req = MockRequest {
            path: "/api/users/123".into(),
            method: "POST".into(),
            ..Default::default()
        };

        assert_eq!(PathIdentifier::new().extract(&req), Some("path:/api/users/123".to_string()));
        assert_eq!(MethodIdentifier::new().extract(&req), Some("method:POST".to_string()));
        assert_eq!(
            RouteIdentifier::new("/api/users/{id}").extract(&req),
            Some("route:POST /api/users/{id}".to_string())
        );
    }
}
