#![forbid(unsafe_code)]

//! Transform pipeline engine for the ulriksdal verifier.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! contains a sequence of transforms that are applied in order to the
//! data its URI selected.

pub mod enveloped;
pub mod pipeline;

pub use enveloped::{EnvelopedSignatureTransform, EnvelopedXPathTransform};
pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
