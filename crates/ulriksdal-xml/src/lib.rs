#![forbid(unsafe_code)]

//! XML tree support for the ulriksdal validator.
//!
//! Wraps `roxmltree` with the resource limits the secure parser enforces,
//! plus the `NodeSet` type used by canonicalization and transforms and the
//! identifier binding that ties `#id` references to one located element.

pub mod id;
pub mod limits;
pub mod names;
pub mod nodeset;
pub mod xpath;

pub use id::{IdAttribute, IdBinding};
pub use limits::ParserLimits;
pub use nodeset::NodeSet;

use ulriksdal_core::{Error, Result};

/// Return roxmltree parsing options for the given limits.
///
/// DTDs are allowed: roxmltree never fetches an external subset and only
/// expands internal entities, with its own loop detection. The prolog is
/// screened for external entity declarations before this is used.
pub fn parsing_options(limits: &ParserLimits) -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        nodes_limit: limits.max_nodes,
    }
}

/// Parse text into a tree and check it against `limits`.
pub fn parse<'input>(
    text: &'input str,
    limits: &ParserLimits,
) -> Result<roxmltree::Document<'input>> {
    if text.len() > limits.max_document_bytes {
        return Err(Error::Parse(format!(
            "document is {} bytes, limit is {}",
            text.len(),
            limits.max_document_bytes
        )));
    }
    let doc = roxmltree::Document::parse_with_options(text, parsing_options(limits))
        .map_err(|e| Error::Parse(e.to_string()))?;
    limits.check_tree(&doc)?;
    Ok(doc)
}

/// Decode document bytes as UTF-8, dropping a leading byte order mark.
pub fn decode_utf8(data: &[u8]) -> Result<&str> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    std::str::from_utf8(data).map_err(|e| Error::Parse(format!("invalid UTF-8: {e}")))
}
