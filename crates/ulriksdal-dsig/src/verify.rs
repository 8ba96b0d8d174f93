#![forbid(unsafe_code)]

//! XML-DSig core validation of one located signature.
//!
//! Processing order:
//! 1. Unmarshal `<Signature>` (structure and algorithms)
//! 2. Canonicalize `<SignedInfo>` and check `<SignatureValue>` with the
//!    context key
//! 3. For each `<Reference>`: dereference its URI through the identifier
//!    binding, run transforms, digest and compare
//!
//! Steps 2 and 3 always both run so that a failure reports every result.

use roxmltree::{Document, Node};
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::Result;
use ulriksdal_transforms::TransformData;
use ulriksdal_xml::{xpath, NodeSet};

use crate::context::VerifyContext;
use crate::signature::{SignedReference, XmlSignature};

/// Validity of one `<Reference>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceOutcome {
    /// Position within `SignedInfo`, from 0.
    pub index: usize,
    pub uri: Option<String>,
    pub valid: bool,
    /// Why the reference failed; `None` when valid.
    pub reason: Option<String>,
}

/// Result of core validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub signature_value_valid: bool,
    pub signature_value_reason: Option<String>,
    pub references: Vec<ReferenceOutcome>,
}

impl VerifyOutcome {
    /// SignatureValue verified and every Reference digest matched.
    pub fn is_core_valid(&self) -> bool {
        self.signature_value_valid && self.references.iter().all(|r| r.valid)
    }
}

/// Verify the `<ds:Signature>` element `sig_node`.
///
/// Structural defects and unknown algorithms are errors. A signature that
/// is well-formed but does not verify yields `Ok` with `is_core_valid()`
/// false.
pub fn verify(ctx: &VerifyContext, sig_node: Node<'_, '_>) -> Result<VerifyOutcome> {
    let doc = sig_node.document();
    let signature = XmlSignature::unmarshal(sig_node)?;

    let (signature_value_valid, signature_value_reason) =
        match check_signature_value(ctx, &signature) {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("signature value does not verify".to_owned())),
            Err(reason) => (false, Some(reason)),
        };
    tracing::debug!(valid = signature_value_valid, "checked SignatureValue");

    let references = signature
        .references
        .iter()
        .enumerate()
        .map(|(index, reference)| {
            let result = check_reference(ctx, doc, reference);
            let uri = reference.uri.map(str::to_owned);
            match result {
                Ok(()) => {
                    tracing::debug!(index, uri = ?uri, "reference digest matches");
                    ReferenceOutcome {
                        index,
                        uri,
                        valid: true,
                        reason: None,
                    }
                }
                Err(reason) => {
                    tracing::debug!(index, uri = ?uri, %reason, "reference invalid");
                    ReferenceOutcome {
                        index,
                        uri,
                        valid: false,
                        reason: Some(reason),
                    }
                }
            }
        })
        .collect();

    Ok(VerifyOutcome {
        signature_value_valid,
        signature_value_reason,
        references,
    })
}

fn check_signature_value(
    ctx: &VerifyContext,
    signature: &XmlSignature<'_, '_>,
) -> std::result::Result<bool, String> {
    let c14n_signed_info = ulriksdal_c14n::canonicalize_subtree(
        signature.signed_info,
        signature.c14n_mode,
        &signature.inclusive_prefixes,
    )
    .map_err(|e| e.to_string())?;
    signature
        .signature_method
        .verify(ctx.key(), &c14n_signed_info, &signature.signature_value)
        .map_err(|e| e.to_string())
}

fn check_reference(
    ctx: &VerifyContext,
    doc: &Document<'_>,
    reference: &SignedReference<'_, '_>,
) -> std::result::Result<(), String> {
    let node_set = dereference(ctx, doc, reference.uri)?;
    let computed = digest_reference(doc, reference, node_set).map_err(|e| e.to_string())?;
    if computed == reference.digest_value {
        Ok(())
    } else {
        Err("digest value does not match".to_owned())
    }
}

/// Run a reference's transforms over `node_set` and digest the result.
pub(crate) fn digest_reference(
    doc: &Document<'_>,
    reference: &SignedReference<'_, '_>,
    node_set: NodeSet,
) -> Result<Vec<u8>> {
    let data = reference
        .transforms
        .execute(doc, TransformData::Xml(node_set))?;
    let bytes = data.into_binary(doc)?;
    ulriksdal_crypto::digest::digest(reference.digest_method, &bytes)
}

/// Dereference a same-document URI.
///
/// `#id` forms resolve only to the bound element; there is no document-wide
/// identifier lookup. External URIs are never fetched.
fn dereference(
    ctx: &VerifyContext,
    doc: &Document<'_>,
    uri: Option<&str>,
) -> std::result::Result<NodeSet, String> {
    let Some(uri) = uri else {
        return Err("reference has no URI".to_owned());
    };
    if uri.is_empty() {
        return Ok(NodeSet::all_without_comments(doc));
    }
    let Some(fragment) = xpath::parse_same_document_ref(uri) else {
        return Err(format!("external URI is not dereferenced: {uri}"));
    };
    if xpath::is_xpointer_root(fragment) {
        return Ok(NodeSet::all(doc));
    }
    let (id, with_comments) = match xpath::parse_xpointer_id(fragment) {
        Some(id) => (id, true),
        None if fragment.starts_with("xpointer(") => {
            return Err(format!("unsupported XPointer: {fragment}"));
        }
        None => (fragment, false),
    };
    let binding = ctx
        .id_binding()
        .ok_or_else(|| format!("no identifier attribute is bound, cannot resolve {uri}"))?;
    let node = binding.resolve(doc, id).ok_or_else(|| {
        format!(
            "{uri} does not name the bound element ({}=\"{}\")",
            binding.attribute(),
            binding.value()
        )
    })?;
    Ok(if with_comments {
        NodeSet::tree_with_comments(node)
    } else {
        NodeSet::tree_without_comments(node)
    })
}

/// Exclusive canonical form of `node`, without comments.
pub fn canonical_bytes(node: Node<'_, '_>) -> Result<Vec<u8>> {
    ulriksdal_c14n::canonicalize_subtree(node, C14nMode::Exclusive, &[])
}
