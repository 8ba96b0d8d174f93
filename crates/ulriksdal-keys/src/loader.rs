#![forbid(unsafe_code)]

//! Key loading from PEM and DER (PKCS#8, PKCS#1, SPKI, X.509).

use ulriksdal_core::{Error, Result};

use crate::key::{Key, KeyData, KeyUsage};

fn pem_str(pem_data: &[u8]) -> Result<&str> {
    std::str::from_utf8(pem_data)
        .map(str::trim)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))
}

/// Load a private key from PEM data.
///
/// Tries RSA PKCS#8, RSA PKCS#1, then EC P-256 and P-384 PKCS#8.
pub fn load_private_key_pem(pem_data: &[u8]) -> Result<Key> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;
    let pem = pem_str(pem_data)?;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(rsa_private(pk));
    }
    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(rsa_private(pk));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_pem(pem) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP384 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }
    Err(Error::Key(
        "unable to parse private key PEM (expected PKCS#8 or PKCS#1)".into(),
    ))
}

fn rsa_private(pk: rsa::RsaPrivateKey) -> Key {
    let public = pk.to_public_key();
    Key::new(
        KeyData::Rsa {
            private: Some(pk),
            public,
        },
        KeyUsage::Any,
    )
}

/// Load a key from raw SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key> {
    use spki::DecodePublicKey;

    if let Ok(public) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::Rsa {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }
    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::EcP256 {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }
    if let Ok(public) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::EcP384 {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }
    Err(Error::Key(
        "unsupported public key algorithm in SPKI DER".into(),
    ))
}

/// Load a public key from PEM (`PUBLIC KEY` or `RSA PUBLIC KEY`).
pub fn load_public_key_pem(pem_data: &[u8]) -> Result<Key> {
    let (label, der_bytes) = pem_rfc7468::decode_vec(pem_str(pem_data)?.as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode public key PEM: {e}")))?;
    match label {
        "PUBLIC KEY" => load_spki_der(&der_bytes),
        "RSA PUBLIC KEY" => {
            use pkcs1::DecodeRsaPublicKey;
            let public = rsa::RsaPublicKey::from_pkcs1_der(&der_bytes)
                .map_err(|e| Error::Key(format!("failed to parse RSA public key: {e}")))?;
            Ok(Key::new(
                KeyData::Rsa {
                    private: None,
                    public,
                },
                KeyUsage::Verify,
            ))
        }
        _ => Err(Error::Key(format!("unsupported PEM label: {label}"))),
    }
}

/// Load the public key of a DER-encoded X.509 certificate. The key is named
/// after the certificate subject.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key> {
    use der::{Decode, Encode};
    use x509_cert::Certificate;

    let cert = Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
    let subject = cert.tbs_certificate.subject.to_string();
    tracing::debug!(%subject, "loaded X.509 certificate");
    load_spki_der(&spki_der)
        .map(|key| key.with_name(subject))
        .map_err(|e| Error::Certificate(format!("certificate public key: {e}")))
}

/// Load the public key of a PEM-encoded X.509 certificate.
pub fn load_x509_cert_pem(pem_data: &[u8]) -> Result<Key> {
    let (label, der_bytes) = pem_rfc7468::decode_vec(pem_str(pem_data)?.as_bytes())
        .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
    if label != "CERTIFICATE" {
        return Err(Error::Certificate(format!(
            "expected CERTIFICATE PEM label, got: {label}"
        )));
    }
    load_x509_cert_der(&der_bytes)
}

/// Load a private key from a PEM file.
pub fn load_private_key_file(path: &std::path::Path) -> Result<Key> {
    let data = std::fs::read(path)?;
    load_private_key_pem(&data)
}
