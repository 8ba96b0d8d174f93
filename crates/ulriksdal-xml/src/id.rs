#![forbid(unsafe_code)]

//! Identifier binding.
//!
//! An [`IdBinding`] marks the named attribute of one specific element as
//! the document's ID attribute. Same-document references (`#value`) are
//! resolved only through the binding: the value must match, and the node
//! returned is always the bound one. There is no document-wide index, so an
//! element elsewhere carrying the same value is never reachable.

use std::fmt;

use roxmltree::{Document, Node, NodeId};
use ulriksdal_core::{Error, Result};

/// Name of the attribute that carries an element's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdAttribute {
    namespace: Option<String>,
    name: String,
}

impl IdAttribute {
    /// An attribute in no namespace, e.g. SAML 1.x `AssertionID`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// A namespaced attribute, e.g. `wsu:Id`.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute's value on `node`, if present.
    pub fn value_on<'a>(&self, node: Node<'a, '_>) -> Option<&'a str> {
        match &self.namespace {
            Some(ns) => node.attribute((ns.as_str(), self.name.as_str())),
            None => node.attribute(self.name.as_str()),
        }
    }
}

impl fmt::Display for IdAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The identifier attribute of one located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdBinding {
    node: NodeId,
    value: String,
    attribute: IdAttribute,
}

impl IdBinding {
    /// Bind `attribute` on `node`. Fails if `node` is not an element or
    /// does not carry the attribute.
    pub fn bind(node: Node<'_, '_>, attribute: &IdAttribute) -> Result<Self> {
        if !node.is_element() {
            return Err(Error::IdBinding(format!(
                "cannot bind {attribute} on a non-element node"
            )));
        }
        let value = attribute.value_on(node).ok_or_else(|| {
            Error::IdBinding(format!(
                "element <{}> has no attribute {attribute}",
                node.tag_name().name()
            ))
        })?;
        tracing::debug!(attribute = %attribute, value, "bound identifier attribute");
        Ok(Self {
            node: node.id(),
            value: value.to_owned(),
            attribute: attribute.clone(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn attribute(&self) -> &IdAttribute {
        &self.attribute
    }

    /// Resolve `id` to the bound element, or `None` if it names anything else.
    pub fn resolve<'a, 'input>(
        &self,
        doc: &'a Document<'input>,
        id: &str,
    ) -> Option<Node<'a, 'input>> {
        if id == self.value {
            doc.get_node(self.node)
        } else {
            None
        }
    }
}
