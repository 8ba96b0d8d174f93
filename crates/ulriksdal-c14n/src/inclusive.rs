#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 and 1.1.
//!
//! Algorithm URIs:
//! - `http://www.w3.org/TR/2001/REC-xml-c14n-20010315` (`#WithComments`)
//! - `http://www.w3.org/2006/12/xml-c14n11` (`#WithComments`)
//!
//! Every namespace in scope is rendered on the first output element that
//! has it in scope, and again wherever its binding changes. When the parent
//! of an output element is not itself output, the element also picks up
//! the `xml:*` attributes of its ancestors.

use std::collections::BTreeMap;

use roxmltree::{Document, Node, NodeType};
use ulriksdal_core::{ns, Result};
use ulriksdal_xml::{names, NodeSet};

use crate::render::{self, Attr, NsDecl};

/// Which inclusive variant is being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1_0,
    /// C14N 1.1: `xml:id` is not inherited, `xml:base` is not inherited.
    V1_1,
}

/// Canonicalize a document using inclusive C14N.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    version: Version,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let ctx = Inclusive {
        with_comments,
        node_set,
        version,
    };
    for child in doc.root().children() {
        ctx.process(child, &mut output, &BTreeMap::new());
    }
    Ok(output)
}

struct Inclusive<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    version: Version,
}

impl Inclusive<'_> {
    fn is_visible(&self, node: Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process(&self, node: Node<'_, '_>, out: &mut Vec<u8>, rendered: &BTreeMap<String, String>) {
        if node.node_type() == NodeType::Element {
            self.element(node, out, rendered);
        } else if self.is_visible(node) {
            render::leaf(out, node, self.with_comments);
        }
    }

    fn element(&self, node: Node<'_, '_>, out: &mut Vec<u8>, rendered: &BTreeMap<String, String>) {
        if !self.is_visible(node) {
            for child in node.children() {
                self.process(child, out, rendered);
            }
            return;
        }

        let in_scope = render::in_scope_namespaces(node);
        let mut decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| render::needs_decl(rendered, prefix, uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        decls.sort();

        let mut attrs = render::element_attrs(node);
        let parent_hidden = self.node_set.is_some()
            && node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(p));
        if parent_hidden {
            attrs.extend(self.inherited_xml_attrs(node, &attrs));
            attrs.sort();
        }

        let name = names::qualified_name(node);
        render::start_tag(out, &name, &decls, &attrs);

        let mut child_rendered = rendered.clone();
        for (prefix, uri) in in_scope {
            if prefix != "xml" {
                child_rendered.insert(prefix, uri);
            }
        }
        for child in node.children() {
            self.process(child, out, &child_rendered);
        }

        render::end_tag(out, &name);
    }

    /// `xml:*` attributes of all ancestors (nearest wins) that the element
    /// does not already carry.
    fn inherited_xml_attrs(&self, node: Node<'_, '_>, existing: &[Attr]) -> Vec<Attr> {
        let mut inherited: BTreeMap<&str, &str> = BTreeMap::new();
        for ancestor in node.ancestors().skip(1).filter(|a| a.is_element()) {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(ns::XML) {
                    inherited.entry(attr.name()).or_insert(attr.value());
                }
            }
        }

        inherited
            .into_iter()
            .filter(|(name, _)| {
                self.version == Version::V1_0 || !matches!(*name, "id" | "base")
            })
            .filter(|(name, _)| {
                !existing
                    .iter()
                    .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
            })
            .map(|(name, value)| Attr {
                ns_uri: ns::XML.to_owned(),
                local_name: name.to_owned(),
                qualified_name: format!("xml:{name}"),
                value: value.to_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str, with_comments: bool) -> String {
        let doc = Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, with_comments, None, Version::V1_0).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#, false),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn test_redundant_declarations_dropped() {
        let xml = r#"<r xmlns:a="urn:a"><a:c xmlns:a="urn:a"/></r>"#;
        assert_eq!(c14n(xml, false), r#"<r xmlns:a="urn:a"><a:c></a:c></r>"#);
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let xml = r#"<r xmlns="urn:d"><c xmlns=""/></r>"#;
        assert_eq!(c14n(xml, false), r#"<r xmlns="urn:d"><c xmlns=""></c></r>"#);
        assert_eq!(c14n(r#"<r><c xmlns=""/></r>"#, false), "<r><c></c></r>");
    }

    #[test]
    fn test_comments_and_pis_outside_root() {
        let xml = "<?pi data?><!--before--><r>x<!--in--></r><!--after-->";
        assert_eq!(
            c14n(xml, true),
            "<?pi data?>\n<!--before-->\n<r>x<!--in--></r>\n<!--after-->"
        );
        assert_eq!(c14n(xml, false), "<?pi data?>\n<r>x</r>");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c &gt; d</root>", false),
            "<root>a &amp; b &lt; c &gt; d</root>"
        );
    }

    #[test]
    fn test_subset_inherits_xml_attrs() {
        let xml = r#"<r xml:lang="en" xml:id="r1"><c/></r>"#;
        let doc = Document::parse(xml).unwrap();
        let c = doc.root_element().first_element_child().unwrap();
        let set = NodeSet::tree_without_comments(c);

        let v10 = canonicalize(&doc, false, Some(&set), Version::V1_0).unwrap();
        assert_eq!(
            String::from_utf8(v10).unwrap(),
            r#"<c xml:id="r1" xml:lang="en"></c>"#
        );
        let v11 = canonicalize(&doc, false, Some(&set), Version::V1_1).unwrap();
        assert_eq!(String::from_utf8(v11).unwrap(), r#"<c xml:lang="en"></c>"#);
    }
}
