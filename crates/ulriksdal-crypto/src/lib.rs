#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for ulriksdal.
//!
//! Provides the digest and signature algorithms an XML-DSig `SignedInfo`
//! may name. Algorithms are looked up by URI.

pub mod digest;
pub mod sign;

pub use sign::{CryptoKey, SignatureAlgorithm};
