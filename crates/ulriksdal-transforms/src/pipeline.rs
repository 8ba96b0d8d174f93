#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use roxmltree::Document;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{Error, Result};
use ulriksdal_xml::{NodeSet, ParserLimits};

/// Data flowing through the transform pipeline.
///
/// XML data is a subset of the document the pipeline runs against; it is
/// never re-serialized and re-parsed between transforms, so node identities
/// stay those of the validated tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformData {
    /// A node set over the pipeline's document.
    Xml(NodeSet),
    /// Raw octets.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, applying inclusive C14N 1.0 to a node set.
    pub fn into_binary(self, doc: &Document<'_>) -> Result<Vec<u8>> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml(node_set) => {
                ulriksdal_c14n::canonicalize(doc, C14nMode::Inclusive, Some(&node_set), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform. `doc` is the document node sets refer to.
    fn execute(&self, doc: &Document<'_>, input: TransformData) -> Result<TransformData>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, doc: &Document<'_>, input: TransformData) -> Result<TransformData> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::debug!(transform = transform.uri(), "applying transform");
            data = transform.execute(doc, data)?;
        }
        Ok(data)
    }

    /// Algorithm URIs in pipeline order.
    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.uris()).finish()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
#[derive(Debug, Clone)]
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, doc: &Document<'_>, input: TransformData) -> Result<TransformData> {
        let bytes = match input {
            TransformData::Xml(node_set) => ulriksdal_c14n::canonicalize(
                doc,
                self.mode,
                Some(&node_set),
                &self.inclusive_prefixes,
            )?,
            TransformData::Binary(data) => {
                // Octets become a fresh document, parsed under default limits.
                let text = std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                let parsed = ulriksdal_xml::parse(text, &ParserLimits::default())?;
                ulriksdal_c14n::canonicalize(&parsed, self.mode, None, &self.inclusive_prefixes)?
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}
