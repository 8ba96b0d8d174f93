#![forbid(unsafe_code)]

//! Element locator hardening.
//!
//! A locator is an absolute path of element names such as
//! `/soape:Envelope/soape:Body/saml:Assertion`. Prefixes in it mean
//! nothing to an attacker-controlled document, which can bind any prefix
//! to any namespace. Hardening resolves each prefix once, through a
//! [`NamespaceContext`], and produces a query that matches only on local
//! name and namespace URI:
//!
//! ```text
//! /*[local-name()="Envelope" and namespace-uri()="http://schemas.xmlsoap.org/soap/envelope/"][1]/...
//! ```
//!
//! [`HardenedLocator`] renders that XPath and evaluates exactly that
//! subset against a parsed tree.

use std::fmt;

use roxmltree::{Document, Node};
use ulriksdal_core::{Error, Result};

use crate::resolver::NamespaceContext;

/// How a step that matches several siblings is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocatorPolicy {
    /// Take the first match in document order.
    #[default]
    FirstMatch,
    /// Fail with [`Error::AmbiguousElement`] when more than one sibling matches.
    RequireUnique,
}

/// One `*[local-name()=... and namespace-uri()=...][1]` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub local_name: String,
    /// `None` for a bare name, which matches in any namespace.
    pub namespace: Option<String>,
}

impl Step {
    fn matches(&self, node: Node<'_, '_>) -> bool {
        if !node.is_element() {
            return false;
        }
        let name = node.tag_name();
        if name.name() != self.local_name {
            return false;
        }
        match &self.namespace {
            Some(uri) => name.namespace().unwrap_or("") == uri,
            None => true,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*[local-name()={}", Literal(&self.local_name))?;
        if let Some(uri) = &self.namespace {
            write!(f, " and namespace-uri()={}", Literal(uri))?;
        }
        f.write_str("][1]")
    }
}

/// An XPath string literal.
struct Literal<'a>(&'a str);

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // XPath 1.0 literals have no escapes.
        match (self.0.contains('"'), self.0.contains('\'')) {
            (false, _) => write!(f, "\"{}\"", self.0),
            (true, false) => write!(f, "'{}'", self.0),
            (true, true) => {
                let mut args = Vec::new();
                for (i, part) in self.0.split('"').enumerate() {
                    if i > 0 {
                        args.push("'\"'".to_owned());
                    }
                    if !part.is_empty() {
                        args.push(format!("\"{part}\""));
                    }
                }
                write!(f, "concat({})", args.join(", "))
            }
        }
    }
}

/// A locator reduced to local-name and namespace-URI predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardenedLocator {
    source: String,
    steps: Vec<Step>,
}

impl HardenedLocator {
    /// The locator this was hardened from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The element the locator reaches in `doc`, if any.
    pub fn evaluate<'a, 'input>(
        &self,
        doc: &'a Document<'input>,
        policy: LocatorPolicy,
    ) -> Result<Option<Node<'a, 'input>>> {
        let mut current = doc.root();
        for step in &self.steps {
            let mut matches = current.children().filter(|child| step.matches(*child));
            let Some(first) = matches.next() else {
                return Ok(None);
            };
            if policy == LocatorPolicy::RequireUnique && matches.next().is_some() {
                return Err(Error::AmbiguousElement(format!(
                    "{} (step {step})",
                    self.source
                )));
            }
            current = first;
        }
        Ok(Some(current))
    }
}

impl fmt::Display for HardenedLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// Harden `locator`, resolving its prefixes through `namespaces`.
pub fn harden(locator: &str, namespaces: &dyn NamespaceContext) -> Result<HardenedLocator> {
    if !locator.starts_with('/') {
        return Err(Error::MalformedLocator(format!(
            "{locator:?} does not start with '/'"
        )));
    }
    let mut steps = Vec::new();
    for segment in locator.split('/').filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = segment.split(':').collect();
        let step = match parts.as_slice() {
            [local_name] => Step {
                local_name: check_name(locator, local_name)?,
                namespace: None,
            },
            [prefix, local_name] => {
                let local_name = check_name(locator, local_name)?;
                let uri = namespaces.resolve_uri(prefix).ok_or_else(|| {
                    Error::NamespacePrefixUnresolved(format!("{prefix:?} in {locator}"))
                })?;
                Step {
                    local_name,
                    namespace: Some(uri.to_owned()),
                }
            }
            _ => {
                return Err(Error::MalformedLocator(format!(
                    "segment {segment:?} of {locator} has more than one ':'"
                )))
            }
        };
        steps.push(step);
    }
    if steps.is_empty() {
        return Err(Error::MalformedLocator(format!(
            "{locator:?} names no element"
        )));
    }
    let hardened = HardenedLocator {
        source: locator.to_owned(),
        steps,
    };
    tracing::debug!(locator, hardened = %hardened, "hardened locator");
    Ok(hardened)
}

fn check_name(locator: &str, name: &str) -> Result<String> {
    let bad = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '*' | '@' | '='));
    if bad {
        return Err(Error::MalformedLocator(format!(
            "{name:?} in {locator} is not an element name"
        )));
    }
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DocumentNamespaces;
    use ulriksdal_core::ns;

    fn soap() -> DocumentNamespaces {
        DocumentNamespaces::new().with_binding("soape", ns::SOAP11_ENVELOPE)
    }

    #[test]
    fn test_harden_envelope_body() {
        let hardened = harden("/soape:Envelope/soape:Body", &soap()).unwrap();
        assert_eq!(
            hardened.to_string(),
            r#"/*[local-name()="Envelope" and namespace-uri()="http://schemas.xmlsoap.org/soap/envelope/"][1]/*[local-name()="Body" and namespace-uri()="http://schemas.xmlsoap.org/soap/envelope/"][1]"#
        );
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(Literal("urn:a").to_string(), r#""urn:a""#);
        assert_eq!(Literal(r#"a"b"#).to_string(), r#"'a"b'"#);
        assert_eq!(Literal(r#"a"b'c"#).to_string(), r#"concat("a", '"', "b'c")"#);
        assert_eq!(Literal(r#""'"#).to_string(), r#"concat('"', "'")"#);
    }

    #[test]
    fn test_namespace_with_both_quotes() {
        let doc = Document::parse(r#"<q:Root xmlns:q="urn:a&quot;b&apos;c"/>"#).unwrap();
        let namespaces = DocumentNamespaces::from_document(&doc);
        let hardened = harden("/q:Root", &namespaces).unwrap();
        assert_eq!(
            hardened.to_string(),
            r#"/*[local-name()="Root" and namespace-uri()=concat("urn:a", '"', "b'c")][1]"#
        );
        let root = hardened.evaluate(&doc, LocatorPolicy::FirstMatch).unwrap();
        assert_eq!(root, Some(doc.root_element()));
    }

    #[test]
    fn test_bare_name() {
        let hardened = harden("/Response", &DocumentNamespaces::new()).unwrap();
        assert_eq!(hardened.to_string(), r#"/*[local-name()="Response"][1]"#);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let a = harden("//soape:Envelope//", &soap()).unwrap();
        let b = harden("/soape:Envelope", &soap()).unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_empty_prefix_is_dsig() {
        let hardened = harden("/:Signature", &DocumentNamespaces::new()).unwrap();
        assert_eq!(hardened.steps()[0].namespace.as_deref(), Some(ns::DSIG));
    }

    #[test]
    fn test_relative_locator_is_malformed() {
        let err = harden("soape:Envelope/soape:Body", &soap()).unwrap_err();
        assert!(matches!(err, Error::MalformedLocator(_)));
    }

    #[test]
    fn test_root_only_is_malformed() {
        assert!(matches!(
            harden("/", &soap()),
            Err(Error::MalformedLocator(_))
        ));
    }

    #[test]
    fn test_too_many_colons() {
        assert!(matches!(
            harden("/a:b:c", &soap()),
            Err(Error::MalformedLocator(_))
        ));
    }

    #[test]
    fn test_unresolved_prefix() {
        let err = harden("/soape:Envelope/evil:Body", &soap()).unwrap_err();
        assert!(matches!(err, Error::NamespacePrefixUnresolved(p) if p.contains("evil")));
    }

    #[test]
    fn test_injected_predicate_rejected() {
        assert!(matches!(
            harden("/soape:Envelope[2]", &soap()),
            Err(Error::MalformedLocator(_))
        ));
    }

    const SPOOFED: &str = r#"<e:Envelope xmlns:e="http://schemas.xmlsoap.org/soap/envelope/">
  <e:Body xmlns:e="urn:example:spoofed" Id="fake"/>
  <e:Body Id="real"/>
  <e:Body Id="second"/>
</e:Envelope>"#;

    #[test]
    fn test_evaluate_skips_spoofed_namespace() {
        let doc = Document::parse(SPOOFED).unwrap();
        let hardened = harden("/soape:Envelope/soape:Body", &soap()).unwrap();
        let body = hardened
            .evaluate(&doc, LocatorPolicy::FirstMatch)
            .unwrap()
            .unwrap();
        assert_eq!(body.attribute("Id"), Some("real"));
    }

    #[test]
    fn test_evaluate_require_unique() {
        let doc = Document::parse(SPOOFED).unwrap();
        let hardened = harden("/soape:Envelope/soape:Body", &soap()).unwrap();
        let err = hardened
            .evaluate(&doc, LocatorPolicy::RequireUnique)
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousElement(_)));
    }

    #[test]
    fn test_evaluate_no_match() {
        let doc = Document::parse(SPOOFED).unwrap();
        let hardened = harden("/soape:Envelope/soape:Header", &soap()).unwrap();
        assert!(hardened
            .evaluate(&doc, LocatorPolicy::FirstMatch)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bare_name_matches_any_namespace() {
        let doc = Document::parse(SPOOFED).unwrap();
        let hardened = harden("/Envelope/Body", &DocumentNamespaces::new()).unwrap();
        let body = hardened
            .evaluate(&doc, LocatorPolicy::FirstMatch)
            .unwrap()
            .unwrap();
        assert_eq!(body.attribute("Id"), Some("fake"));
    }
}
