#![forbid(unsafe_code)]

//! Hardened XML signature validation for SAML assertions and SOAP messages.
//!
//! A [`Validator`] parses a document with a fixed secure configuration,
//! validates it against a schema, locates the target element and its
//! `ds:Signature` through namespace-anchored locators, binds the target's
//! identifier attribute to that exact node and verifies the signature
//! against one trust anchor. The element it reports as validated is always
//! the one the locator reached, so signed content moved elsewhere in the
//! document cannot be passed off as the target.

pub mod config;
pub mod locator;
pub mod parser;
pub mod pipeline;
pub mod resolver;

pub use config::{SchemaSource, ValidatorConfig};
pub use locator::{harden, HardenedLocator, LocatorPolicy};
pub use parser::{SecureParser, PARSER_FEATURES};
pub use pipeline::{Diagnostics, ValidatedElement, ValidationResult, Validator};
pub use resolver::{DocumentNamespaces, NamespaceContext, FALLBACK_NAMESPACES};

pub use ulriksdal_core as core;
pub use ulriksdal_xml as xml;
pub use ulriksdal_c14n as c14n;
pub use ulriksdal_crypto as crypto;
pub use ulriksdal_keys as keys;
pub use ulriksdal_transforms as transforms;
pub use ulriksdal_dsig as dsig;
pub use ulriksdal_schema as schema;
