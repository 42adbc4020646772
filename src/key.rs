//! Storage key generation.
//!
//! Keys have the shape `rl:{namespace}:{algorithm}:{identifier}`. `%` and `:`
//! are percent-escaped inside the namespace and the identifier, so the three
//! separators are the only raw colons in a key and distinct
//! `(namespace, identifier)` pairs never map to the same key.

use crate::config::AlgorithmKind;
use crate::error::{RateLimitError, Result};

const KEY_ROOT: &str = "rl";

/// Maps identifiers to storage keys for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenerator {
    namespace: String,
    escaped_namespace: String,
}

impl KeyGenerator {
    /// Create a generator for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let escaped_namespace = escape(&namespace);
        Self {
            namespace,
            escaped_namespace,
        }
    }

    /// The namespace as given.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Storage key for `identifier` under `algorithm`.
    ///
    /// Fails with a validation error when `identifier` is empty.
    pub fn generate(&self, identifier: &str, algorithm: AlgorithmKind) -> Result<String> {
        if identifier.is_empty() {
            return Err(RateLimitError::validation("identifier must not be empty"));
        }
        Ok(format!(
            "{}{}",
            self.algorithm_prefix(algorithm),
            escape(identifier)
        ))
    }

    /// Prefix shared by every key in this namespace.
    pub fn prefix(&self) -> String {
        format!("{}:{}:", KEY_ROOT, self.escaped_namespace)
    }

    /// Prefix shared by every key in this namespace under `algorithm`.
    pub fn algorithm_prefix(&self, algorithm: AlgorithmKind) -> String {
        format!("{}{}:", self.prefix(), algorithm.as_str())
    }
}

fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(c),
        }
    }
    escaped
}
