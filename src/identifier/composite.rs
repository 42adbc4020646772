//! Combinators over other extractors.

use crate::identifier::ExtractIdentifier;

/// Two identifiers joined by a separator, e.g. `"ip:1.2.3.4|path:/upload"`.
///
/// Yields `None` unless both parts are present.
#[derive(Debug, Clone)]
pub struct CompositeIdentifier<A, B> {
    first: A,
    second: B,
    separator: &'static str,
}

impl<A, B> CompositeIdentifier<A, B> {
    /// Join with the default separator `|`.
    pub fn new(first: A, second: B) -> Self {
        Self::with_separator(first, second, "|")
    }

    /// Join with a custom separator.
    pub fn with_separator(first: A, second: B, separator: &'static str) -> Self {
        Self {
            first,
            second,
            separator,
        }
    }
}

impl<R, A, B> ExtractIdentifier<R> for CompositeIdentifier<A, B>
where
    A: ExtractIdentifier<R>,
    B: ExtractIdentifier<R>,
{
    fn extract(&self, request: &R) -> Option<String> {
        let first = self.first.extract(request)?;
        let second = self.second.extract(request)?;
        Some(format!("{}{}{}", first, self.separator, second))
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// The primary identifier when present, otherwise the fallback.
#[derive(Debug, Clone)]
pub struct EitherIdentifier<A, B> {
    primary: A,
    fallback: B,
}

impl<A, B> EitherIdentifier<A, B> {
    /// Create a new either identifier.
    pub fn new(primary: A, fallback: B) -> Self {
        Self { primary, fallback }
    }
}

impl<R, A, B> ExtractIdentifier<R> for EitherIdentifier<A, B>
where
    A: ExtractIdentifier<R>,
    B: ExtractIdentifier<R>,
{
    fn extract(&self, request: &R) -> Option<String> {
        self.primary
            .extract(request)
            .or_else(|| self.fallback.extract(request))
    }

    fn name(&self) -> &'static str {
        "either"
    }
}

/// Never fails: substitutes `default` when the inner extractor finds nothing.
///
/// Requests without an identifier then share the default's quota instead of
/// bypassing the limiter.
#[derive(Debug, Clone)]
pub struct OptionalIdentifier<E> {
    inner: E,
    default: String,
}

impl<E> OptionalIdentifier<E> {
    /// Create a new optional identifier with a default value.
    pub fn new(inner: E, default: impl Into<String>) -> Self {
        Self {
            inner,
            default: default.into(),
        }
    }
}

impl<R, E> ExtractIdentifier<R> for OptionalIdentifier<E>
where
    E: ExtractIdentifier<R>,
{
    fn extract(&self, request: &R) -> Option<String> {
        Some(
            self.inner
                .extract(request)
                .unwrap_or_else(|| self.default.clone()),
        )
    }

    fn name(&self) -> &'static str {
        "optional"
    }
}
