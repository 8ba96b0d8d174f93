#![forbid(unsafe_code)]

//! Contexts for signature operations.

use ulriksdal_crypto::CryptoKey;
use ulriksdal_xml::{IdAttribute, IdBinding};

/// Context for verifying one signature.
///
/// The key is the only key used: `KeyInfo` in the signature is ignored.
/// Same-document references resolve only through `id_binding`.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    key: CryptoKey,
    id_binding: Option<IdBinding>,
}

impl VerifyContext {
    pub fn new(key: CryptoKey) -> Self {
        Self {
            key,
            id_binding: None,
        }
    }

    pub fn with_id_binding(mut self, binding: IdBinding) -> Self {
        self.id_binding = Some(binding);
        self
    }

    pub fn key(&self) -> &CryptoKey {
        &self.key
    }

    pub fn id_binding(&self) -> Option<&IdBinding> {
        self.id_binding.as_ref()
    }
}

/// Context for filling in a signature template.
#[derive(Debug, Clone)]
pub struct SignContext {
    pub key: CryptoKey,
    /// Attribute that `#id` references in the template name. When unset,
    /// unqualified `ID`, `Id` and `id` are tried.
    pub id_attribute: Option<IdAttribute>,
}

impl SignContext {
    pub fn new(key: CryptoKey) -> Self {
        Self {
            key,
            id_attribute: None,
        }
    }

    pub fn with_id_attribute(mut self, attribute: IdAttribute) -> Self {
        self.id_attribute = Some(attribute);
        self
    }
}
