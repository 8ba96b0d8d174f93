#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for the ulriksdal verifier.
//!
//! Implements the six W3C canonicalization variants over a parsed
//! `roxmltree` document:
//! - Canonical XML 1.0 (with and without comments)
//! - Canonical XML 1.1 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)

pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod render;

use ulriksdal_core::{algorithm, Result};
use ulriksdal_xml::NodeSet;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Canonical XML 1.1
    Inclusive11,
    /// Canonical XML 1.1 with comments
    Inclusive11WithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Inclusive11 => algorithm::C14N11,
            Self::Inclusive11WithComments => algorithm::C14N11_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::C14N11 => Some(Self::Inclusive11),
            algorithm::C14N11_WITH_COMMENTS => Some(Self::Inclusive11WithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(
            self,
            Self::InclusiveWithComments
                | Self::Inclusive11WithComments
                | Self::ExclusiveWithComments
        )
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize a parsed document.
///
/// - `node_set`: optional node set (for document-subset canonicalization)
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces PrefixList
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let out = match mode {
        C14nMode::Inclusive | C14nMode::InclusiveWithComments => inclusive::canonicalize(
            doc,
            mode.with_comments(),
            node_set,
            inclusive::Version::V1_0,
        )?,
        C14nMode::Inclusive11 | C14nMode::Inclusive11WithComments => inclusive::canonicalize(
            doc,
            mode.with_comments(),
            node_set,
            inclusive::Version::V1_1,
        )?,
        C14nMode::Exclusive | C14nMode::ExclusiveWithComments => {
            exclusive::canonicalize(doc, mode.with_comments(), node_set, inclusive_prefixes)?
        }
    };
    tracing::trace!(mode = mode.uri(), bytes = out.len(), "canonicalized");
    Ok(out)
}

/// Canonicalize the subtree rooted at `node`.
pub fn canonicalize_subtree(
    node: roxmltree::Node<'_, '_>,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let set = if mode.with_comments() {
        NodeSet::tree_with_comments(node)
    } else {
        NodeSet::tree_without_comments(node)
    };
    canonicalize(node.document(), mode, Some(&set), inclusive_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_uri_round_trip() {
        for mode in [
            C14nMode::Inclusive,
            C14nMode::InclusiveWithComments,
            C14nMode::Inclusive11,
            C14nMode::Inclusive11WithComments,
            C14nMode::Exclusive,
            C14nMode::ExclusiveWithComments,
        ] {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
        }
        assert_eq!(C14nMode::from_uri("urn:unknown"), None);
    }

    #[test]
    fn test_subtree_inclusive_vs_exclusive() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:b="urn:b"><a:x b:y="1"/><a:z/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let z = doc.root_element().last_element_child().unwrap();

        let inc = canonicalize_subtree(z, C14nMode::Inclusive, &[]).unwrap();
        assert_eq!(
            String::from_utf8(inc).unwrap(),
            r#"<a:z xmlns:a="urn:a" xmlns:b="urn:b"></a:z>"#
        );

        let exc = canonicalize_subtree(z, C14nMode::Exclusive, &[]).unwrap();
        assert_eq!(String::from_utf8(exc).unwrap(), r#"<a:z xmlns:a="urn:a"></a:z>"#);
    }
}
