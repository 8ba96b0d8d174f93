#![forbid(unsafe_code)]

//! Shared rendering for the inclusive and exclusive serializers.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use roxmltree::{Node, NodeType};
use ulriksdal_core::ns;
use ulriksdal_xml::names;

use crate::escape;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI ("" undeclares the default namespace).
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        escape::push_attr(out, &self.uri);
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    // Default namespace first, then by prefix.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// `prefix:local` or just `local`.
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::push_attr(out, &self.value);
        out.push(b'"');
    }
}

impl Ord for Attr {
    // Unqualified attributes first, then by (namespace URI, local name).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The element's own attributes, sorted in canonical order.
pub fn element_attrs(node: Node<'_, '_>) -> Vec<Attr> {
    let mut attrs: Vec<Attr> = node
        .attributes()
        .map(|attr| {
            let ns_uri = attr.namespace().unwrap_or("");
            let prefix = if ns_uri == ns::XML {
                Some("xml")
            } else {
                names::attribute_prefix(node, &attr)
            };
            let qualified_name = match prefix {
                Some(p) => format!("{p}:{}", attr.name()),
                None => attr.name().to_owned(),
            };
            Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            }
        })
        .collect();
    attrs.sort();
    attrs
}

/// Namespaces in scope at `node`, keyed by prefix ("" for the default).
/// An undeclared default namespace maps to "".
pub fn in_scope_namespaces(node: Node<'_, '_>) -> BTreeMap<String, String> {
    node.namespaces()
        .map(|ns| (ns.name().unwrap_or("").to_owned(), ns.uri().to_owned()))
        .collect()
}

/// Whether a namespace binding must be emitted given what the nearest
/// output ancestor already rendered.
pub fn needs_decl(rendered: &BTreeMap<String, String>, prefix: &str, uri: &str) -> bool {
    if prefix == "xml" {
        return false;
    }
    match rendered.get(prefix) {
        Some(prev) => prev != uri,
        // `xmlns=""` is only meaningful if a non-empty default is in effect.
        None => !uri.is_empty(),
    }
}

pub fn start_tag(out: &mut Vec<u8>, name: &str, decls: &[NsDecl], attrs: &[Attr]) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for decl in decls {
        decl.render(out);
    }
    for attr in attrs {
        attr.render(out);
    }
    out.push(b'>');
}

pub fn end_tag(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(b"</");
    out.extend_from_slice(name.as_bytes());
    out.push(b'>');
}

/// Render a text, comment or PI node. Comments are skipped unless
/// `with_comments`. Outside the document element, a line feed separates
/// the node from the document element.
pub fn leaf(out: &mut Vec<u8>, node: Node<'_, '_>, with_comments: bool) {
    let top_level = node.parent().is_some_and(|p| p.is_root());
    let before_root = top_level && node.next_siblings().any(|s| s.is_element());
    let after_root = top_level && node.prev_siblings().any(|s| s.is_element());

    match node.node_type() {
        NodeType::Text => escape::push_text(out, node.text().unwrap_or("")),
        NodeType::Comment if with_comments => {
            if after_root {
                out.push(b'\n');
            }
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(node.text().unwrap_or("").as_bytes());
            out.extend_from_slice(b"-->");
            if before_root {
                out.push(b'\n');
            }
        }
        NodeType::PI => {
            if after_root {
                out.push(b'\n');
            }
            if let Some(pi) = node.pi() {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(pi.target.as_bytes());
                if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                    out.push(b' ');
                    escape::push_pi(out, value);
                }
                out.extend_from_slice(b"?>");
            }
            if before_root {
                out.push(b'\n');
            }
        }
        _ => {}
    }
}
