#![forbid(unsafe_code)]

//! Shared foundations for the ulriksdal crates: the error type, namespace
//! URIs and XML-DSig algorithm identifiers.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{ElementRole, Error, Result};
