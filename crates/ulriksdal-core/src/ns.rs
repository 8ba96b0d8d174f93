#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// W3C XML Schema namespace
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";

/// W3C XML Schema instance namespace
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// SOAP 1.1 envelope namespace
pub const SOAP11_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SAML 1.0/1.1 assertion namespace
pub const SAML1_ASSERTION: &str = "urn:oasis:names:tc:SAML:1.0:assertion";

/// SAML 1.0/1.1 protocol namespace
pub const SAML1_PROTOCOL: &str = "urn:oasis:names:tc:SAML:1.0:protocol";

/// SAML 2.0 assertion namespace
pub const SAML2_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// WS-Security extensions namespace
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// WS-Security utility namespace
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// WS-Policy namespace
pub const WSP: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";

/// WS-Addressing (2004/08) namespace
pub const WSA: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";

/// WS-Trust (2005/02) namespace
pub const WST: &str = "http://schemas.xmlsoap.org/ws/2005/02/trust";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const OBJECT: &str = "Object";

    // XPath / Exc C14N
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
}
