#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) implementation.
//!
//! Unmarshals a located `<ds:Signature>`, verifies it against one key and
//! reports per-reference results. Same-document references resolve only
//! through an explicit identifier binding. A template signer produces
//! signed documents for tests and tooling.

pub mod context;
pub mod sign;
pub mod signature;
pub mod verify;

pub use context::{SignContext, VerifyContext};
pub use signature::{SignedReference, XmlSignature};
pub use verify::{verify, ReferenceOutcome, VerifyOutcome};

use roxmltree::Node;
use ulriksdal_core::ns;

pub(crate) fn find_child_element<'a, 'input>(
    parent: Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    parent
        .children()
        .find(|n| n.has_tag_name((ns_uri, local_name)))
}

/// `PrefixList` of an `InclusiveNamespaces` child, split on whitespace.
pub(crate) fn read_inclusive_prefixes(node: Node<'_, '_>) -> Vec<String> {
    node.children()
        .find(|c| c.has_tag_name((ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)))
        .and_then(|c| c.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Decode base64 element content, ignoring embedded whitespace.
pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(clean)
}

pub(crate) fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}
