#![forbid(unsafe_code)]

use std::fmt;

/// Which of the two located elements a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    /// The element whose content the caller wants to trust.
    Target,
    /// The `ds:Signature` element covering the target.
    Signature,
}

impl fmt::Display for ElementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRole::Target => f.write_str("target"),
            ElementRole::Signature => f.write_str("signature"),
        }
    }
}

/// Errors produced by the ulriksdal validation pipeline.
///
/// Every variant is fatal to the validation that raised it. A signature
/// that is well-formed but does not verify is not an error: it is reported
/// as a negative validation result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("unresolvable entity: {0}")]
    UnresolvableEntity(String),

    #[error("namespace prefix cannot be resolved: {0}")]
    NamespacePrefixUnresolved(String),

    #[error("malformed element locator: {0}")]
    MalformedLocator(String),

    #[error("{role} element not found: {locator}")]
    ElementNotFound { role: ElementRole, locator: String },

    #[error("locator matches more than one element: {0}")]
    AmbiguousElement(String),

    #[error("cannot bind identifier attribute: {0}")]
    IdBinding(String),

    #[error("malformed XML signature: {0}")]
    SignatureUnmarshal(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_not_found_names_role() {
        let err = Error::ElementNotFound {
            role: ElementRole::Signature,
            locator: "/a:Envelope/ds:Signature".into(),
        };
        assert_eq!(
            err.to_string(),
            "signature element not found: /a:Envelope/ds:Signature"
        );
    }
}
