#![forbid(unsafe_code)]

//! The few XPath and XPointer forms XML-DSig references use:
//! - `#id-value` same-document references
//! - `#xpointer(/)` and `#xpointer(id('...'))`
//! - the ancestor-or-self axis (needed for the enveloped transform)

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr
        .strip_prefix("xpointer(id('")
        .and_then(|s| s.strip_suffix("'))"))
        .or_else(|| {
            expr.strip_prefix("xpointer(id(\"")
                .and_then(|s| s.strip_suffix("\"))"))
        })?;
    Some(inner)
}

/// Whether `expr` is the whole-document XPointer `xpointer(/)`.
pub fn is_xpointer_root(expr: &str) -> bool {
    expr == "xpointer(/)"
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(
    ancestor: roxmltree::Node<'_, '_>,
    node: roxmltree::Node<'_, '_>,
) -> bool {
    node.ancestors().any(|n| n.id() == ancestor.id())
}
