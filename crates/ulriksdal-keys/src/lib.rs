#![forbid(unsafe_code)]

//! Key material for ulriksdal.
//!
//! Loads the verification trust anchor from a certificate or public key,
//! and private keys for the signing helper.

pub mod key;
pub mod loader;
pub mod trust;

pub use key::{Key, KeyData, KeyUsage};
pub use trust::TrustAnchor;
