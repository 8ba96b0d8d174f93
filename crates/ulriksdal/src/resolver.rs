#![forbid(unsafe_code)]

//! Namespace prefix resolution for element locators.
//!
//! Prefixes in a locator are resolved against the parsed document's root
//! element first and a fixed table of well-known prefixes second. The
//! empty prefix is never looked up in the document: it always names the
//! XML-DSig namespace.

use roxmltree::Document;
use ulriksdal_core::{ns, Error, Result};

/// Well-known prefixes, consulted when the document does not bind one.
pub const FALLBACK_NAMESPACES: &[(&str, &str)] = &[
    ("saml", ns::SAML1_ASSERTION),
    ("saml2", ns::SAML2_ASSERTION),
    ("wsse", ns::WSSE),
    ("wsu", ns::WSU),
    ("ds", ns::DSIG),
    ("xs", ns::XSD),
    ("wsp", ns::WSP),
    ("xsa", ns::WSA),
    ("wst", ns::WST),
    ("", ns::DSIG),
];

/// Maps namespace prefixes to URIs and back.
pub trait NamespaceContext {
    /// URI bound to `prefix`.
    fn resolve_uri(&self, prefix: &str) -> Option<&str>;

    /// A prefix bound to `uri`.
    fn resolve_prefix(&self, uri: &str) -> Option<&str>;

    /// Every prefix bound to `uri`. Not supported by default.
    fn prefixes(&self, uri: &str) -> Result<Vec<String>> {
        Err(Error::UnsupportedOperation(format!(
            "listing prefixes bound to {uri}"
        )))
    }
}

/// Namespace bindings of one document, backed by [`FALLBACK_NAMESPACES`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentNamespaces {
    /// `(prefix, uri)` in declaration order. Never holds the empty prefix.
    bindings: Vec<(String, String)>,
}

impl DocumentNamespaces {
    /// No document bindings: only the fallback table answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// The prefixes in scope on the root element of `doc`.
    pub fn from_document(doc: &Document<'_>) -> Self {
        let bindings = doc
            .root_element()
            .namespaces()
            .filter_map(|namespace| {
                namespace
                    .name()
                    .map(|prefix| (prefix.to_owned(), namespace.uri().to_owned()))
            })
            .collect();
        Self { bindings }
    }

    /// Add a binding that takes precedence over the fallback table.
    ///
    /// A binding for the empty prefix is ignored.
    pub fn with_binding(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.bindings.push((prefix, uri.into()));
        }
        self
    }

    fn document_uri(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

fn fallback_uri(prefix: &str) -> Option<&'static str> {
    FALLBACK_NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}

impl NamespaceContext for DocumentNamespaces {
    fn resolve_uri(&self, prefix: &str) -> Option<&str> {
        let found = if prefix.is_empty() {
            fallback_uri(prefix)
        } else {
            self.document_uri(prefix).or_else(|| fallback_uri(prefix))
        };
        match found {
            Some(uri) => tracing::info!("prefix {prefix:?} resolves to {uri}"),
            None => tracing::warn!("no namespace URI bound to prefix {prefix:?}"),
        }
        found
    }

    fn resolve_prefix(&self, uri: &str) -> Option<&str> {
        let found = self
            .bindings
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(prefix, _)| prefix.as_str());
        match found {
            Some(prefix) => tracing::info!("namespace {uri} has prefix {prefix:?}"),
            None => tracing::warn!("no prefix bound to namespace {uri}"),
        }
        found
    }
}
