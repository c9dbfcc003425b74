//! Canonical identifiers for the image hash resolver.

use std::fmt;

/// Error returned when a tag reference or hash string fails to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// Canonicalized Docker image reference, e.g. `ubuntu:18.04` or
/// `registry.example.com/ns/repo@sha256:...`. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(String);

impl TagId {
    /// Parse and canonicalize a raw tag reference.
    ///
    /// A reference must be non-empty, contain no whitespace, and carry
    /// either a `:tag` or `@digest` component.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::new("tag reference is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ParseError::new(format!(
                "tag reference contains whitespace: {trimmed:?}"
            )));
        }
        if !trimmed.contains(':') && !trimmed.contains('@') {
            return Err(ParseError::new(format!(
                "tag reference missing ':tag' or '@digest': {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable content digest naming a concrete image manifest, e.g.
/// `sha256:9b1702...`. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashValue(String);

impl HashValue {
    /// Parse a `algorithm:digest` hash string.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        let Some((algorithm, digest)) = trimmed.split_once(':') else {
            return Err(ParseError::new(format!(
                "hash value missing 'algorithm:digest' separator: {trimmed}"
            )));
        };
        if algorithm.is_empty() || digest.is_empty() {
            return Err(ParseError::new(format!(
                "hash value has an empty algorithm or digest: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_tag_and_digest_references() {
        assert!(TagId::parse("ubuntu:18.04").is_ok());
        assert!(TagId::parse("registry.example.com/ns/repo@sha256:abcd").is_ok());
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(TagId::parse("").is_err());
        assert!(TagId::parse("   ").is_err());
        assert!(TagId::parse("ubuntu latest").is_err());
        assert!(TagId::parse("ubuntu").is_err());
    }

    #[test]
    fn hash_value_requires_algorithm_and_digest() {
        assert!(HashValue::parse("sha256:deadbeef").is_ok());
        assert!(HashValue::parse("deadbeef").is_err());
        assert!(HashValue::parse("sha256:").is_err());
        assert!(HashValue::parse(":deadbeef").is_err());
    }
}
