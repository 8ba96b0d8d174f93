#![forbid(unsafe_code)]

//! The local schema catalog.
//!
//! Maps the identifiers that SAML and WS-Security documents and schemas use
//! for their external references onto locally trusted resources. An
//! identifier the table does not know is refused; nothing is ever fetched.

use ulriksdal_core::{Error, Result};

use crate::resource::{Resource, ResourceStore};

/// How a catalog entry matches an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// The identifier ends with this text.
    Suffix(&'static str),
    /// The identifier is exactly this text.
    Exact(&'static str),
}

impl Match {
    pub fn matches(&self, identifier: &str) -> bool {
        match self {
            Match::Suffix(suffix) => identifier.ends_with(suffix),
            Match::Exact(exact) => identifier == *exact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub identifier: Match,
    pub resource: &'static str,
}

const fn suffix(identifier: &'static str, resource: &'static str) -> CatalogEntry {
    CatalogEntry {
        identifier: Match::Suffix(identifier),
        resource,
    }
}

const fn exact(identifier: &'static str, resource: &'static str) -> CatalogEntry {
    CatalogEntry {
        identifier: Match::Exact(identifier),
        resource,
    }
}

/// The identifier table, checked in order.
pub const CATALOG: &[CatalogEntry] = &[
    suffix(
        "oasis-200401-wss-wssecurity-secext-1.0.xsd",
        "oasis-200401-wss-wssecurity-secext-1.0.xsd",
    ),
    suffix(
        "oasis-200401-wss-wssecurity-utility-1.0.xsd",
        "oasis-200401-wss-wssecurity-utility-1.0.xsd",
    ),
    suffix("xml.xsd", "xml.xsd"),
    suffix("xmldsig-core-schema.xsd", "xmldsig-core-schema.xsd"),
    suffix("XMLSchema.dtd", "XMLSchema.dtd"),
    suffix("datatypes.dtd", "datatypes.dtd"),
    suffix("ws-policy.xsd", "ws-policy.xsd"),
    exact(
        "urn:oasis:names:tc:SAML:1.0:protocol",
        "saml-schema-protocol-1.1.xsd",
    ),
    exact(
        "urn:oasis:names:tc:SAML:1.0:assertion",
        "saml-schema-assertion-1.0.xsd",
    ),
    suffix("addressing/", "addressing.xsd"),
    exact(
        "urn:oasis:names:tc:SAML:2.0:assertion",
        "saml-schema-assertion-2.0.xsd",
    ),
];

/// Resolves external identifiers to local resources.
///
/// `system_id` is the location a document or schema names, or the
/// namespace URI when a schema import carries no location.
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, public_id: Option<&str>, system_id: &str) -> Result<Resource>;
}

/// The catalog-backed resolver.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    entries: &'static [CatalogEntry],
    store: ResourceStore,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new(ResourceStore::Bundled)
    }
}

impl SchemaCatalog {
    pub fn new(store: ResourceStore) -> Self {
        Self {
            entries: CATALOG,
            store,
        }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// The resource name `system_id` maps to, if any.
    pub fn lookup(&self, system_id: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|entry| entry.identifier.matches(system_id))
            .map(|entry| entry.resource)
    }
}

impl EntityResolver for SchemaCatalog {
    fn resolve(&self, public_id: Option<&str>, system_id: &str) -> Result<Resource> {
        let found = self.lookup(system_id);
        tracing::info!(
            "resolveEntity systemId={} publicId={} returns {}",
            system_id,
            public_id.unwrap_or("null"),
            found.unwrap_or("null")
        );
        let name = found.ok_or_else(|| Error::UnresolvableEntity(system_id.to_owned()))?;
        let data = self.store.load(name)?;
        Ok(Resource::new(system_id, name, data))
    }
}

/// Whether `identifier` is a syntactically valid URI reference.
///
/// Checks the RFC 3986 character repertoire and percent-encoding; relative
/// references are accepted.
pub fn is_uri_conformant(identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    let bytes = identifier.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'%' => {
                let valid = bytes
                    .get(i + 1..i + 3)
                    .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
                if !valid {
                    return false;
                }
                i += 3;
                continue;
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => {}
            b'-' | b'.' | b'_' | b'~' => {}
            b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@' => {}
            b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=' => {}
            _ => return false,
        }
        i += 1;
    }
    if let Some(colon) = identifier.find(':') {
        let scheme = &identifier[..colon];
        let first_slash = identifier.find('/').unwrap_or(identifier.len());
        // A colon before any slash introduces a scheme, which must be well formed.
        if colon < first_slash {
            let mut chars = scheme.chars();
            let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
            let valid_rest =
                chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
            return valid_start && valid_rest;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_lookup() {
        let catalog = SchemaCatalog::default();
        assert_eq!(
            catalog.lookup("http://www.w3.org/TR/xmldsig-core/xmldsig-core-schema.xsd"),
            Some("xmldsig-core-schema.xsd")
        );
        assert_eq!(
            catalog.lookup("http://schemas.xmlsoap.org/ws/2004/08/addressing/"),
            Some("addressing.xsd")
        );
        assert_eq!(catalog.lookup("datatypes.dtd"), Some("datatypes.dtd"));
    }

    #[test]
    fn test_exact_lookup() {
        let catalog = SchemaCatalog::default();
        assert_eq!(
            catalog.lookup("urn:oasis:names:tc:SAML:2.0:assertion"),
            Some("saml-schema-assertion-2.0.xsd")
        );
        // Exact entries never match by suffix.
        assert_eq!(
            catalog.lookup("urn:example:urn:oasis:names:tc:SAML:2.0:assertion"),
            None
        );
    }

    #[test]
    fn test_unknown_identifier_fails_closed() {
        let catalog = SchemaCatalog::default();
        let err = catalog
            .resolve(None, "http://attacker.example/evil.xsd")
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(id) if id.contains("evil.xsd")));
    }

    #[test]
    fn test_resolve_returns_bundled_bytes() {
        let catalog = SchemaCatalog::default();
        let resource = catalog
            .resolve(Some("-//W3C//DTD XMLSCHEMA 200102//EN"), "http://www.w3.org/2001/XMLSchema.dtd")
            .unwrap();
        assert_eq!(resource.location, "XMLSchema.dtd");
        assert!(resource.text().unwrap().contains("xs-datatypes"));
    }

    #[test]
    fn test_every_entry_has_a_bundled_resource() {
        for entry in CATALOG {
            assert!(
                crate::resource::bundled(entry.resource).is_some(),
                "{} is not bundled",
                entry.resource
            );
        }
    }

    #[test]
    fn test_uri_conformance() {
        assert!(is_uri_conformant("http://www.w3.org/2001/XMLSchema.dtd"));
        assert!(is_uri_conformant("datatypes.dtd"));
        assert!(is_uri_conformant("urn:oasis:names:tc:SAML:1.0:assertion"));
        assert!(is_uri_conformant("a%20b"));
        assert!(!is_uri_conformant("a b.dtd"));
        assert!(!is_uri_conformant("c:\\schemas\\x.xsd"));
        assert!(!is_uri_conformant("bad%zz"));
        assert!(!is_uri_conformant("1http://x"));
        assert!(!is_uri_conformant(""));
    }
}
