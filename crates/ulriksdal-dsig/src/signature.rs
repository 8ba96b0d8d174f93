#![forbid(unsafe_code)]

//! Unmarshalling of `<ds:Signature>` elements.
//!
//! The element structure is checked strictly:
//!
//! ```text
//! Signature      := SignedInfo SignatureValue KeyInfo? Object*
//! SignedInfo     := CanonicalizationMethod SignatureMethod Reference+
//! Reference      := Transforms? DigestMethod DigestValue
//! ```
//!
//! Every algorithm URI is looked up here, so an unknown algorithm is an
//! unmarshal error rather than a verification failure.

use roxmltree::Node;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{algorithm, ns, Error, Result};
use ulriksdal_crypto::SignatureAlgorithm;
use ulriksdal_transforms::{
    C14nTransform, EnvelopedSignatureTransform, EnvelopedXPathTransform, TransformPipeline,
};

use crate::{decode_base64, read_inclusive_prefixes};

fn malformed(msg: impl Into<String>) -> Error {
    Error::SignatureUnmarshal(msg.into())
}

/// An unmarshalled `<ds:Signature>`.
pub struct XmlSignature<'a, 'input> {
    pub node: Node<'a, 'input>,
    pub signed_info: Node<'a, 'input>,
    pub c14n_mode: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: Box<dyn SignatureAlgorithm>,
    pub signature_value_node: Node<'a, 'input>,
    pub signature_value: Vec<u8>,
    pub references: Vec<SignedReference<'a, 'input>>,
}

/// One `<ds:Reference>` of `SignedInfo`.
pub struct SignedReference<'a, 'input> {
    pub node: Node<'a, 'input>,
    /// The `URI` attribute; `None` when absent.
    pub uri: Option<&'a str>,
    pub transforms: TransformPipeline,
    pub digest_method: &'a str,
    pub digest_value_node: Node<'a, 'input>,
    pub digest_value: Vec<u8>,
}

impl std::fmt::Debug for XmlSignature<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSignature")
            .field("c14n_mode", &self.c14n_mode)
            .field("signature_method", &self.signature_method.uri())
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SignedReference<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedReference")
            .field("uri", &self.uri)
            .field("transforms", &self.transforms)
            .field("digest_method", &self.digest_method)
            .finish_non_exhaustive()
    }
}

/// Cursor over the element children of a signature component.
struct Children<'a, 'input> {
    parent: &'static str,
    elements: Vec<Node<'a, 'input>>,
    pos: usize,
}

impl<'a, 'input: 'a> Children<'a, 'input> {
    /// Fails on non-whitespace text between the children.
    fn of(parent: Node<'a, 'input>, name: &'static str) -> Result<Self> {
        let mut elements = Vec::new();
        for child in parent.children() {
            if child.is_element() {
                elements.push(child);
            } else if child.is_text() && !child.text().unwrap_or_default().trim().is_empty() {
                return Err(malformed(format!("unexpected text content in {name}")));
            }
        }
        Ok(Self {
            parent: name,
            elements,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<Node<'a, 'input>> {
        self.elements.get(self.pos).copied()
    }

    fn optional(&mut self, local_name: &str) -> Option<Node<'a, 'input>> {
        let node = self
            .peek()
            .filter(|n| n.has_tag_name((ns::DSIG, local_name)))?;
        self.pos += 1;
        Some(node)
    }

    fn required(&mut self, local_name: &str) -> Result<Node<'a, 'input>> {
        if let Some(node) = self.optional(local_name) {
            return Ok(node);
        }
        Err(match self.peek() {
            Some(found) => malformed(format!(
                "expected {local_name} in {}, found {}",
                self.parent,
                found.tag_name().name()
            )),
            None => malformed(format!("{} is missing {local_name}", self.parent)),
        })
    }

    fn finish(self) -> Result<()> {
        match self.peek() {
            Some(extra) => Err(malformed(format!(
                "unexpected element {} in {}",
                extra.tag_name().name(),
                self.parent
            ))),
            None => Ok(()),
        }
    }
}

fn algorithm_attr<'a>(node: Node<'a, '_>) -> Result<&'a str> {
    node.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
        malformed(format!(
            "missing Algorithm attribute on {}",
            node.tag_name().name()
        ))
    })
}

impl<'a, 'input: 'a> XmlSignature<'a, 'input> {
    /// Unmarshal the `<ds:Signature>` element `node`.
    pub fn unmarshal(node: Node<'a, 'input>) -> Result<Self> {
        if !node.has_tag_name((ns::DSIG, ns::node::SIGNATURE)) {
            return Err(malformed(format!(
                "located element {{{}}}{} is not a ds:Signature",
                node.tag_name().namespace().unwrap_or_default(),
                node.tag_name().name()
            )));
        }

        let mut children = Children::of(node, ns::node::SIGNATURE)?;
        let signed_info = children.required(ns::node::SIGNED_INFO)?;
        let signature_value_node = children.required(ns::node::SIGNATURE_VALUE)?;
        children.optional(ns::node::KEY_INFO);
        while children.optional(ns::node::OBJECT).is_some() {}
        children.finish()?;

        let mut si = Children::of(signed_info, ns::node::SIGNED_INFO)?;
        let c14n_node = si.required(ns::node::CANONICALIZATION_METHOD)?;
        let c14n_uri = algorithm_attr(c14n_node)?;
        let c14n_mode = C14nMode::from_uri(c14n_uri)
            .ok_or_else(|| malformed(format!("unsupported canonicalization method: {c14n_uri}")))?;
        let inclusive_prefixes = read_inclusive_prefixes(c14n_node);

        let method_node = si.required(ns::node::SIGNATURE_METHOD)?;
        let method_uri = algorithm_attr(method_node)?;
        let signature_method = ulriksdal_crypto::sign::from_uri(method_uri)
            .map_err(|_| malformed(format!("unsupported signature method: {method_uri}")))?;

        let mut references = Vec::new();
        while let Some(reference) = si.optional(ns::node::REFERENCE) {
            references.push(SignedReference::unmarshal(reference, node)?);
        }
        if references.is_empty() {
            return Err(malformed("SignedInfo has no Reference"));
        }
        si.finish()?;

        let signature_value = decode_base64(signature_value_node.text().unwrap_or_default())
            .map_err(|e| malformed(format!("SignatureValue is not base64: {e}")))?;

        tracing::debug!(
            c14n = c14n_uri,
            method = method_uri,
            references = references.len(),
            "unmarshalled signature"
        );

        Ok(Self {
            node,
            signed_info,
            c14n_mode,
            inclusive_prefixes,
            signature_method,
            signature_value_node,
            signature_value,
            references,
        })
    }
}

impl<'a, 'input: 'a> SignedReference<'a, 'input> {
    fn unmarshal(node: Node<'a, 'input>, signature: Node<'a, 'input>) -> Result<Self> {
        let mut children = Children::of(node, ns::node::REFERENCE)?;
        let transforms_node = children.optional(ns::node::TRANSFORMS);
        let digest_method_node = children.required(ns::node::DIGEST_METHOD)?;
        let digest_value_node = children.required(ns::node::DIGEST_VALUE)?;
        children.finish()?;

        let mut transforms = TransformPipeline::new();
        if let Some(list) = transforms_node {
            let mut items = Children::of(list, ns::node::TRANSFORMS)?;
            while let Some(transform) = items.optional(ns::node::TRANSFORM) {
                transforms.push(build_transform(transform, signature)?);
            }
            items.finish()?;
            if transforms.is_empty() {
                return Err(malformed("Transforms has no Transform"));
            }
        }

        let digest_method = algorithm_attr(digest_method_node)?;
        if !ulriksdal_crypto::digest::is_supported(digest_method) {
            return Err(malformed(format!(
                "unsupported digest method: {digest_method}"
            )));
        }
        let digest_value = decode_base64(digest_value_node.text().unwrap_or_default())
            .map_err(|e| malformed(format!("DigestValue is not base64: {e}")))?;

        Ok(Self {
            node,
            uri: node.attribute(ns::attr::URI),
            transforms,
            digest_method,
            digest_value_node,
            digest_value,
        })
    }
}

fn build_transform(
    node: Node<'_, '_>,
    signature: Node<'_, '_>,
) -> Result<Box<dyn ulriksdal_transforms::Transform>> {
    let uri = algorithm_attr(node)?;
    if let Some(mode) = C14nMode::from_uri(uri) {
        return Ok(Box::new(C14nTransform::new(
            mode,
            read_inclusive_prefixes(node),
        )));
    }
    match uri {
        algorithm::ENVELOPED_SIGNATURE => {
            Ok(Box::new(EnvelopedSignatureTransform::new(signature.id())))
        }
        algorithm::XPATH => {
            let expr_node = crate::find_child_element(node, ns::DSIG, ns::node::XPATH)
                .ok_or_else(|| malformed("XPath transform has no XPath element"))?;
            let expr = expr_node.text().unwrap_or_default();
            if EnvelopedXPathTransform::matches(expr, expr_node) {
                Ok(Box::new(EnvelopedXPathTransform))
            } else {
                Err(malformed(format!(
                    "unsupported XPath expression: {}",
                    expr.trim()
                )))
            }
        }
        _ => Err(malformed(format!("unsupported transform: {uri}"))),
    }
}
