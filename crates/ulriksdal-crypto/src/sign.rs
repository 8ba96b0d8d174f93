#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, RSA-PSS, ECDSA).

use signature::SignatureEncoding;
use ulriksdal_core::{algorithm, Error, Result};

use crate::digest;

/// Key material for signature operations.
///
/// Verification accepts either half of a key pair; signing needs a
/// private key.
#[derive(Debug, Clone)]
pub enum CryptoKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

impl CryptoKey {
    /// Short algorithm family name, for log messages.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            CryptoKey::Rsa(_) | CryptoKey::RsaPublic(_) => "RSA",
            CryptoKey::EcP256(_) | CryptoKey::EcP256Public(_) => "EC P-256",
            CryptoKey::EcP384(_) | CryptoKey::EcP384Public(_) => "EC P-384",
        }
    }

    pub fn has_private_key(&self) -> bool {
        matches!(
            self,
            CryptoKey::Rsa(_) | CryptoKey::EcP256(_) | CryptoKey::EcP384(_)
        )
    }

    /// The public half of this key.
    pub fn to_public(&self) -> CryptoKey {
        match self {
            CryptoKey::Rsa(sk) => CryptoKey::RsaPublic(sk.to_public_key()),
            CryptoKey::EcP256(sk) => CryptoKey::EcP256Public(*sk.verifying_key()),
            CryptoKey::EcP384(sk) => CryptoKey::EcP384Public(*sk.verifying_key()),
            public => public.clone(),
        }
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &CryptoKey, data: &[u8]) -> Result<Vec<u8>>;
    /// Returns `Ok(false)` for a well-formed signature that does not verify.
    fn verify(&self, key: &CryptoKey, data: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>> {
    let alg: Box<dyn SignatureAlgorithm> = match uri {
        algorithm::RSA_SHA1 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA1, hash: HashType::Sha1 }),
        algorithm::RSA_SHA224 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA224, hash: HashType::Sha224 }),
        algorithm::RSA_SHA256 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA256, hash: HashType::Sha256 }),
        algorithm::RSA_SHA384 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA384, hash: HashType::Sha384 }),
        algorithm::RSA_SHA512 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA512, hash: HashType::Sha512 }),

        algorithm::RSA_PSS_SHA256 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA256, hash: HashType::Sha256 }),
        algorithm::RSA_PSS_SHA384 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA384, hash: HashType::Sha384 }),
        algorithm::RSA_PSS_SHA512 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA512, hash: HashType::Sha512 }),

        algorithm::ECDSA_SHA1 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA1, digest: algorithm::SHA1 }),
        algorithm::ECDSA_SHA224 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA224, digest: algorithm::SHA224 }),
        algorithm::ECDSA_SHA256 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA256, digest: algorithm::SHA256 }),
        algorithm::ECDSA_SHA384 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA384, digest: algorithm::SHA384 }),
        algorithm::ECDSA_SHA512 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA512, digest: algorithm::SHA512 }),

        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    };
    Ok(alg)
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

fn rsa_public(key: &CryptoKey) -> Result<rsa::RsaPublicKey> {
    match key {
        CryptoKey::Rsa(pk) => Ok(pk.to_public_key()),
        CryptoKey::RsaPublic(pk) => Ok(pk.clone()),
        other => Err(Error::Key(format!(
            "RSA key required, got {}",
            other.algorithm_name()
        ))),
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &CryptoKey, data: &[u8]) -> Result<Vec<u8>> {
        use signature::Signer;
        let CryptoKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required".into()));
        };
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                let sig = sk
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))?;
                Ok(sig.to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha224 => do_sign!(sha2::Sha224),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify(&self, key: &CryptoKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool> {
        use signature::Verifier;
        let public_key = rsa_public(key)?;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha224 => do_verify!(sha2::Sha224),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

// ── RSA-PSS ──────────────────────────────────────────────────────────

struct RsaPss {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPss {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &CryptoKey, data: &[u8]) -> Result<Vec<u8>> {
        use signature::RandomizedSigner;
        let CryptoKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required for PSS".into()));
        };
        let mut rng = rand::thread_rng();
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pss::SigningKey::<$hasher>::new(private_key.clone());
                let sig = sk
                    .try_sign_with_rng(&mut rng, data)
                    .map_err(|e| Error::Crypto(format!("RSA-PSS signing failed: {e}")))?;
                Ok(sig.to_vec())
            }};
        }
        match self.hash {
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!("RSA-PSS with {other:?}"))),
        }
    }

    fn verify(&self, key: &CryptoKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool> {
        use signature::Verifier;
        let public_key = rsa_public(key)?;
        let sig = rsa::pss::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA-PSS signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pss::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!("RSA-PSS with {other:?}"))),
        }
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// ECDSA over the curve of whatever key it is given. The message is hashed
/// with the digest the algorithm URI names, then signed as a prehash.
struct Ecdsa {
    uri: &'static str,
    digest: &'static str,
}

macro_rules! xmldsig_ecdsa_codec {
    ($to_typed:ident, $to_xmldsig:ident, $curve:ident, $len:expr, $name:expr) => {
        /// Convert an XML-DSig ECDSA `r || s` value to a typed signature.
        pub fn $to_typed(rs: &[u8]) -> Result<$curve::ecdsa::Signature> {
            if rs.len() != 2 * $len {
                return Err(Error::Crypto(format!(
                    "{} signature must be {} bytes, got {}",
                    $name,
                    2 * $len,
                    rs.len()
                )));
            }
            let r = $curve::FieldBytes::from_slice(&rs[..$len]);
            let s = $curve::FieldBytes::from_slice(&rs[$len..]);
            $curve::ecdsa::Signature::from_scalars(*r, *s)
                .map_err(|e| Error::Crypto(format!("invalid {} signature: {e}", $name)))
        }

        /// Convert a typed signature to the XML-DSig `r || s` form.
        pub fn $to_xmldsig(sig: &$curve::ecdsa::Signature) -> Vec<u8> {
            let (r, s) = sig.split_bytes();
            let mut out = Vec::with_capacity(2 * $len);
            out.extend_from_slice(&r);
            out.extend_from_slice(&s);
            out
        }
    };
}

xmldsig_ecdsa_codec!(xmldsig_to_p256, p256_to_xmldsig, p256, 32, "P-256");
xmldsig_ecdsa_codec!(xmldsig_to_p384, p384_to_xmldsig, p384, 48, "P-384");

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &CryptoKey, data: &[u8]) -> Result<Vec<u8>> {
        use signature::hazmat::PrehashSigner;
        let prehash = digest::digest(self.digest, data)?;
        let map_err = |e: signature::Error| Error::Crypto(format!("ECDSA signing failed: {e}"));
        match key {
            CryptoKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(map_err)?;
                Ok(p256_to_xmldsig(&sig))
            }
            CryptoKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(map_err)?;
                Ok(p384_to_xmldsig(&sig))
            }
            _ => Err(Error::Key("EC private key required".into())),
        }
    }

    fn verify(&self, key: &CryptoKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool> {
        use signature::hazmat::PrehashVerifier;
        let prehash = digest::digest(self.digest, data)?;
        let valid = match key {
            CryptoKey::EcP256(sk) => sk
                .verifying_key()
                .verify_prehash(&prehash, &xmldsig_to_p256(sig_bytes)?)
                .is_ok(),
            CryptoKey::EcP256Public(vk) => vk
                .verify_prehash(&prehash, &xmldsig_to_p256(sig_bytes)?)
                .is_ok(),
            CryptoKey::EcP384(sk) => sk
                .verifying_key()
                .verify_prehash(&prehash, &xmldsig_to_p384(sig_bytes)?)
                .is_ok(),
            CryptoKey::EcP384Public(vk) => vk
                .verify_prehash(&prehash, &xmldsig_to_p384(sig_bytes)?)
                .is_ok(),
            other => {
                return Err(Error::Key(format!(
                    "EC key required, got {}",
                    other.algorithm_name()
                )))
            }
        };
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key() -> CryptoKey {
        let mut rng = rand::thread_rng();
        CryptoKey::Rsa(rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap())
    }

    #[test]
    fn test_rsa_pkcs1_sign_verify() {
        let key = rsa_key();
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let sig = alg.sign(&key, b"signed info").unwrap();
        let public = key.to_public();
        assert!(alg.verify(&public, b"signed info", &sig).unwrap());
        assert!(!alg.verify(&public, b"signed inf0", &sig).unwrap());
    }

    #[test]
    fn test_rsa_pss_sign_verify() {
        let key = rsa_key();
        let alg = from_uri(algorithm::RSA_PSS_SHA256).unwrap();
        let sig = alg.sign(&key, b"data").unwrap();
        assert!(alg.verify(&key.to_public(), b"data", &sig).unwrap());
    }

    #[test]
    fn test_ecdsa_p256_with_sha384() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let key = CryptoKey::EcP256(sk);
        let alg = from_uri(algorithm::ECDSA_SHA384).unwrap();
        let sig = alg.sign(&key, b"data").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(alg.verify(&key.to_public(), b"data", &sig).unwrap());
        assert!(!alg.verify(&key.to_public(), b"other", &sig).unwrap());
    }

    #[test]
    fn test_ecdsa_p384_signature_length() {
        let sk = p384::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let key = CryptoKey::EcP384(sk);
        let sig = from_uri(algorithm::ECDSA_SHA512)
            .unwrap()
            .sign(&key, b"data")
            .unwrap();
        assert_eq!(sig.len(), 96);
        assert!(xmldsig_to_p384(&sig[..95]).is_err());
    }

    #[test]
    fn test_key_family_mismatch() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let key = CryptoKey::EcP256(sk).to_public();
        let alg = from_uri(algorithm::RSA_SHA1).unwrap();
        assert!(matches!(
            alg.verify(&key, b"x", &[0u8; 128]),
            Err(Error::Key(_))
        ));
    }

    #[test]
    fn test_unknown_signature_algorithm() {
        assert!(matches!(
            from_uri("http://www.w3.org/2000/09/xmldsig#hmac-sha1"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
