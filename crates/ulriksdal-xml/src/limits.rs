#![forbid(unsafe_code)]

//! Secure-processing limits.

use ulriksdal_core::{Error, Result};

/// Upper bounds applied while parsing documents and schemas.
///
/// Every limit is checked before or during tree construction; exceeding one
/// is a parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserLimits {
    /// Largest accepted input, in bytes.
    pub max_document_bytes: usize,
    /// Largest node count (elements, text, comments, PIs).
    pub max_nodes: u32,
    /// Deepest element nesting.
    pub max_depth: usize,
    /// Most attributes on a single element.
    pub max_attributes: usize,
    /// Most `<!ENTITY` declarations in an internal DTD subset.
    pub max_entity_declarations: usize,
    /// Content-model matching steps allowed per element.
    pub max_content_model_steps: u64,
    /// Schema documents loaded for one validation.
    pub max_schema_documents: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: 16 * 1024 * 1024,
            max_nodes: 1_000_000,
            max_depth: 256,
            max_attributes: 256,
            max_entity_declarations: 64,
            max_content_model_steps: 100_000,
            max_schema_documents: 64,
        }
    }
}

impl ParserLimits {
    pub fn with_max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    pub fn with_max_nodes(mut self, nodes: u32) -> Self {
        self.max_nodes = nodes;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_attributes(mut self, attributes: usize) -> Self {
        self.max_attributes = attributes;
        self
    }

    /// Check element depth and per-element attribute counts of a built tree.
    pub fn check_tree(&self, doc: &roxmltree::Document<'_>) -> Result<()> {
        let mut stack: Vec<(roxmltree::Node<'_, '_>, usize)> = vec![(doc.root_element(), 1)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(Error::Parse(format!(
                    "element nesting exceeds {} levels at {}",
                    self.max_depth,
                    doc.text_pos_at(node.range().start)
                )));
            }
            let attrs = node.attributes().len();
            if attrs > self.max_attributes {
                return Err(Error::Parse(format!(
                    "element <{}> has {attrs} attributes, limit is {}",
                    node.tag_name().name(),
                    self.max_attributes
                )));
            }
            for child in node.children().filter(|c| c.is_element()) {
                stack.push((child, depth + 1));
            }
        }
        Ok(())
    }
}
