#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output. A namespace is
//! visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.
//!
//! An unprefixed element always utilizes the default namespace. No `xml:*`
//! attributes are inherited.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Document, Node, NodeType};
use ulriksdal_core::{ns, Result};
use ulriksdal_xml::{names, NodeSet};

use crate::render::{self, NsDecl};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let inclusive_prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let ctx = Exclusive {
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    let mut output = Vec::new();
    for child in doc.root().children() {
        ctx.process(child, &mut output, &BTreeMap::new());
    }
    Ok(output)
}

struct Exclusive<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    /// PrefixList entries, with `#default` mapped to "".
    inclusive_prefixes: BTreeSet<String>,
}

impl Exclusive<'_> {
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

        let mut utilized: BTreeSet<String> = self.inclusive_prefixes.clone();
        utilized.insert(names::element_prefix(node).unwrap_or("").to_owned());
        for attr in node.attributes() {
            if attr.namespace().is_some_and(|uri| uri != ns::XML) {
                if let Some(prefix) = names::attribute_prefix(node, &attr) {
                    utilized.insert(prefix.to_owned());
                }
            }
        }

        let in_scope = render::in_scope_namespaces(node);
        let mut decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            // A PrefixList entry that is not in scope contributes nothing;
            // an unprefixed element with no default namespace may need
            // `xmlns=""`.
            let uri = match in_scope.get(prefix) {
                Some(uri) => uri.as_str(),
                None if prefix.is_empty() => "",
                None => continue,
            };
            if render::needs_decl(rendered, prefix, uri) {
                decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.to_owned(),
                });
            }
        }
        decls.sort();

        let attrs = render::element_attrs(node);
        let name = names::qualified_name(node);
        render::start_tag(out, &name, &decls, &attrs);

        let mut child_rendered = rendered.clone();
        for decl in decls {
            child_rendered.insert(decl.prefix, decl.uri);
        }
        for child in node.children() {
            self.process(child, out, &child_rendered);
        }

        render::end_tag(out, &name);
    }
}
