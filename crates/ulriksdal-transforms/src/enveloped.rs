#![forbid(unsafe_code)]

//! Transforms that cut signatures out of the signed data.

use roxmltree::{Document, NodeId};
use ulriksdal_core::{algorithm, ns, Error, Result};

use crate::pipeline::{Transform, TransformData};

/// The enveloped signature transform: removes the `<Signature>` element
/// being verified, with its descendants, from the node set.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    /// Create for the Signature element with the given id.
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, doc: &Document<'_>, input: TransformData) -> Result<TransformData> {
        match input {
            TransformData::Xml(mut node_set) => {
                let sig = doc
                    .get_node(self.signature)
                    .ok_or_else(|| Error::Transform("signature node not in document".into()))?;
                node_set.remove_subtree(sig);
                Ok(TransformData::Xml(node_set))
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

/// The XPath filter `not(ancestor-or-self::ds:Signature)`.
///
/// This is the only XPath 1.0 transform expression accepted. It drops every
/// XML-DSig `Signature` subtree in the document, not just the one being
/// verified.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopedXPathTransform;

impl EnvelopedXPathTransform {
    /// Whether `expr` is `not(ancestor-or-self::P:Signature)` with `P` bound
    /// to the XML-DSig namespace on `xpath_node`.
    pub fn matches(expr: &str, xpath_node: roxmltree::Node<'_, '_>) -> bool {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let Some(prefix) = compact
            .strip_prefix("not(ancestor-or-self::")
            .and_then(|s| s.strip_suffix(":Signature)"))
        else {
            return false;
        };
        xpath_node.lookup_namespace_uri(Some(prefix)) == Some(ns::DSIG)
    }
}

impl Transform for EnvelopedXPathTransform {
    fn uri(&self) -> &str {
        algorithm::XPATH
    }

    fn execute(&self, doc: &Document<'_>, input: TransformData) -> Result<TransformData> {
        match input {
            TransformData::Xml(mut node_set) => {
                for sig in doc
                    .descendants()
                    .filter(|n| n.has_tag_name((ns::DSIG, ns::node::SIGNATURE)))
                {
                    node_set.remove_subtree(sig);
                }
                Ok(TransformData::Xml(node_set))
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "XPath transform requires XML input".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_xml::NodeSet;

    const XML: &str = r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a/><ds:Signature><ds:SignedInfo/></ds:Signature><ds:Signature/></r>"#;

    #[test]
    fn test_enveloped_removes_only_own_signature() {
        let doc = Document::parse(XML).unwrap();
        let sigs: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name((ns::DSIG, "Signature")))
            .collect();
        let t = EnvelopedSignatureTransform::new(sigs[0].id());
        let TransformData::Xml(set) = t
            .execute(&doc, TransformData::Xml(NodeSet::all(&doc)))
            .unwrap()
        else {
            panic!("expected node set");
        };
        assert!(!set.contains(sigs[0]));
        assert!(!set.contains(sigs[0].first_child().unwrap()));
        assert!(set.contains(sigs[1]));
    }

    #[test]
    fn test_xpath_filter_removes_all_signatures() {
        let doc = Document::parse(XML).unwrap();
        let TransformData::Xml(set) = EnvelopedXPathTransform
            .execute(&doc, TransformData::Xml(NodeSet::all(&doc)))
            .unwrap()
        else {
            panic!("expected node set");
        };
        let out = ulriksdal_c14n::canonicalize(
            &doc,
            ulriksdal_c14n::C14nMode::Inclusive,
            Some(&set),
            &[],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a></a></r>"#
        );
    }

    #[test]
    fn test_xpath_expression_match() {
        let xml = r#"<XPath xmlns:dsig="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x"/>"#;
        let doc = Document::parse(xml).unwrap();
        let node = doc.root_element();
        assert!(EnvelopedXPathTransform::matches(
            "not(ancestor-or-self::dsig:Signature)",
            node
        ));
        assert!(!EnvelopedXPathTransform::matches(
            "not(ancestor-or-self::x:Signature)",
            node
        ));
        assert!(!EnvelopedXPathTransform::matches("//*", node));
    }
}
