#![forbid(unsafe_code)]

//! Lexical prefixes of elements and attributes.
//!
//! roxmltree resolves names to `(namespace, local)` pairs and drops the
//! prefix. Canonicalization must reproduce the prefixes exactly as written,
//! so they are read back from the input text through node positions.

use roxmltree::{Attribute, Node};

/// Prefix of an element's tag as written, `None` when unprefixed.
pub fn element_prefix<'input>(node: Node<'_, 'input>) -> Option<&'input str> {
    let text = node.document().input_text();
    let tag = text.get(node.range().start..)?;
    match tag.strip_prefix('<') {
        Some(rest) => {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .unwrap_or(rest.len());
            rest[..end].split_once(':').map(|(prefix, _)| prefix)
        }
        // Produced by entity expansion, no tag text to read.
        None => node.tag_name().namespace().and_then(|uri| {
            node.lookup_prefix(uri).filter(|p| !p.is_empty())
        }),
    }
}

/// Prefix of an attribute name as written, `None` when unprefixed.
pub fn attribute_prefix<'input>(
    node: Node<'_, 'input>,
    attr: &Attribute<'_, 'input>,
) -> Option<&'input str> {
    attr.namespace()?;
    let text = node.document().input_text();
    match text.get(attr.range_qname()) {
        Some(qname) if qname.ends_with(attr.name()) => {
            qname.split_once(':').map(|(prefix, _)| prefix)
        }
        _ => attr.namespace().and_then(|uri| node.lookup_prefix(uri)),
    }
}

/// `prefix:local` (or `local`) for an element.
pub fn qualified_name(node: Node<'_, '_>) -> String {
    match element_prefix(node) {
        Some(prefix) => format!("{prefix}:{}", node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_prefix() {
        let xml = r#"<a:root xmlns:a="urn:a" xmlns="urn:d"><child/><a:x/></a:root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = doc.root_element();
        assert_eq!(element_prefix(root), Some("a"));
        let mut kids = root.children().filter(|n| n.is_element());
        assert_eq!(element_prefix(kids.next().unwrap()), None);
        assert_eq!(qualified_name(kids.next().unwrap()), "a:x");
    }

    #[test]
    fn test_attribute_prefix() {
        let xml = r#"<r xmlns:w="urn:w" w:Id="x" plain="y"/>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = doc.root_element();
        let attrs: Vec<_> = root.attributes().collect();
        assert_eq!(attribute_prefix(root, &attrs[0]), Some("w"));
        assert_eq!(attribute_prefix(root, &attrs[1]), None);
    }

    #[test]
    fn test_same_uri_two_prefixes() {
        let xml = r#"<p:r xmlns:p="urn:x" xmlns:q="urn:x"><q:c/></p:r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let child = doc.root_element().first_element_child().unwrap();
        assert_eq!(element_prefix(child), Some("q"));
    }
}
