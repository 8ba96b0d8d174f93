#![forbid(unsafe_code)]

//! Key types and data structures.

use ulriksdal_crypto::CryptoKey;

/// Usage flags for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Sign,
    Verify,
    Any,
}

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
}

impl KeyData {
    pub fn has_private(&self) -> bool {
        match self {
            Self::Rsa { private, .. } => private.is_some(),
            Self::EcP256 { private, .. } => private.is_some(),
            Self::EcP384 { private, .. } => private.is_some(),
        }
    }

    fn family(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RSA",
            Self::EcP256 { .. } => "EC P-256",
            Self::EcP384 { .. } => "EC P-384",
        }
    }
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_private() {
            write!(f, "{} private+public key", self.family())
        } else {
            write!(f, "{} public key", self.family())
        }
    }
}

/// A key with its intended usage.
#[derive(Debug, Clone)]
pub struct Key {
    /// Optional name, e.g. the certificate subject.
    pub name: Option<String>,
    pub data: KeyData,
    pub usage: KeyUsage,
}

impl Key {
    pub fn new(data: KeyData, usage: KeyUsage) -> Self {
        Self {
            name: None,
            data,
            usage,
        }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Key for signing, if this key holds a private half.
    pub fn to_signing_key(&self) -> Option<CryptoKey> {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => Some(CryptoKey::Rsa(pk.clone())),
            KeyData::EcP256 { private: Some(sk), .. } => Some(CryptoKey::EcP256(sk.clone())),
            KeyData::EcP384 { private: Some(sk), .. } => Some(CryptoKey::EcP384(sk.clone())),
            _ => None,
        }
    }

    /// Public key for verification.
    pub fn to_verifying_key(&self) -> CryptoKey {
        match &self.data {
            KeyData::Rsa { public, .. } => CryptoKey::RsaPublic(public.clone()),
            KeyData::EcP256 { public, .. } => CryptoKey::EcP256Public(*public),
            KeyData::EcP384 { public, .. } => CryptoKey::EcP384Public(*public),
        }
    }

    /// Drop any private half.
    pub fn into_public(self) -> Key {
        let data = match self.data {
            KeyData::Rsa { public, .. } => KeyData::Rsa {
                private: None,
                public,
            },
            KeyData::EcP256 { public, .. } => KeyData::EcP256 {
                private: None,
                public,
            },
            KeyData::EcP384 { public, .. } => KeyData::EcP384 {
                private: None,
                public,
            },
        };
        Key {
            name: self.name,
            data,
            usage: KeyUsage::Verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec_key_halves() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let public = *sk.verifying_key();
        let key = Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        );
        assert!(key.to_signing_key().is_some());
        assert_eq!(format!("{:?}", key.data), "EC P-256 private+public key");

        let public_only = key.into_public();
        assert!(public_only.to_signing_key().is_none());
        assert_eq!(public_only.usage, KeyUsage::Verify);
        assert!(matches!(
            public_only.to_verifying_key(),
            CryptoKey::EcP256Public(_)
        ));
    }
}
