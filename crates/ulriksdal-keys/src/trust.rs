#![forbid(unsafe_code)]

//! The single trust anchor a validation checks signatures against.

use std::path::Path;

use ulriksdal_core::{Error, Result};
use ulriksdal_crypto::CryptoKey;

use crate::key::Key;
use crate::loader;

/// A public key trusted to sign documents.
///
/// Only ever holds a public key. Key material embedded in a signature's
/// `KeyInfo` is never consulted; this key is the only one used.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    key: Key,
}

impl TrustAnchor {
    /// Load from a file holding a DER or PEM X.509 certificate, or a DER or
    /// PEM public key.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let anchor = Self::from_bytes(&data)?;
        tracing::info!(
            path = %path.display(),
            key = ?anchor.key.data,
            "loaded trust anchor"
        );
        Ok(anchor)
    }

    /// Load from certificate or public key bytes, detecting the encoding.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let trimmed = &data[start..];
        let key = if trimmed.starts_with(b"-----BEGIN CERTIFICATE") {
            loader::load_x509_cert_pem(trimmed)?
        } else if trimmed.starts_with(b"-----BEGIN") {
            if trimmed.windows(b"PRIVATE KEY".len()).any(|w| w == b"PRIVATE KEY") {
                return Err(Error::Key(
                    "trust anchor must be a certificate or public key, not a private key".into(),
                ));
            }
            loader::load_public_key_pem(trimmed)?
        } else {
            match loader::load_x509_cert_der(data) {
                Ok(key) => key,
                Err(cert_err) => loader::load_spki_der(data).map_err(|_| cert_err)?,
            }
        };
        Ok(Self::from_key(key))
    }

    /// Wrap an already loaded key, keeping only its public half.
    pub fn from_key(key: Key) -> Self {
        Self {
            key: key.into_public(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The key used for signature verification.
    pub fn verifying_key(&self) -> CryptoKey {
        self.key.to_verifying_key()
    }

    /// Certificate subject, when loaded from a certificate.
    pub fn subject(&self) -> Option<&str> {
        self.key.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyData;

    const KEYS: &str = "../../test-data/keys";

    #[test]
    fn test_detects_each_encoding() {
        let dir = Path::new(KEYS);
        for name in [
            "signer1-cert.pem",
            "signer1-cert.der",
            "signer1-pubkey.pem",
            "signer1-pubkey.der",
        ] {
            let anchor = TrustAnchor::from_file(&dir.join(name)).unwrap();
            assert!(
                matches!(anchor.key().data, KeyData::Rsa { private: None, .. }),
                "{name}"
            );
        }
        let ec = TrustAnchor::from_file(&dir.join("ec-p256-cert.pem")).unwrap();
        assert!(matches!(ec.verifying_key(), CryptoKey::EcP256Public(_)));
        assert!(ec.subject().unwrap().contains("ec-p256"));
    }

    #[test]
    fn test_private_key_is_not_an_anchor() {
        let path = Path::new(KEYS).join("signer1-key.pem");
        assert!(matches!(TrustAnchor::from_file(&path), Err(Error::Key(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TrustAnchor::from_file(&dir.path().join("absent.pem")),
            Err(Error::Io(_))
        ));
    }
}
