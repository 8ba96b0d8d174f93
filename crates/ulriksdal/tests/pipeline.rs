#![forbid(unsafe_code)]

//! End-to-end validation: sign a template, then validate the result.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use roxmltree::{Document, Node};
use ulriksdal::core::{ns, ElementRole, Error, Result};
use ulriksdal::dsig::{SignContext, VerifyContext};
use ulriksdal::keys::{loader, TrustAnchor};
use ulriksdal::schema::{EntityResolver, Resource, SchemaCatalog};
use ulriksdal::xml::{names, IdAttribute, IdBinding};
use ulriksdal::{LocatorPolicy, SchemaSource, ValidationResult, Validator, ValidatorConfig};

const ASSERTION_TEMPLATE: &str = r##"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
    <ds:Reference URI="#_a1">
      <ds:Transforms>
        <ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>
        <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
      </ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue></ds:DigestValue>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue></ds:SignatureValue>
</ds:Signature><saml2:Subject><saml2:NameID>alice</saml2:NameID></saml2:Subject></saml2:Assertion>"##;

fn header_signature(uri: &str) -> String {
    format!(
        r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
    <ds:Reference URI="{uri}">
      <ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue></ds:DigestValue>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue></ds:SignatureValue>
</ds:Signature>"##
    )
}

const REAL_ASSERTION: &str = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_real" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2:Subject><saml2:NameID>alice</saml2:NameID></saml2:Subject></saml2:Assertion>"#;

const COPIED_ASSERTION: &str = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_copy" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2:Subject><saml2:NameID>alice</saml2:NameID></saml2:Subject></saml2:Assertion>"#;

const FORGED_ASSERTION: &str = r#"<saml2:Assertion xmlns:saml2="urn:example:spoofed" ID="_evil" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://evil.example.com</saml2:Issuer><saml2:Subject><saml2:NameID>admin</saml2:NameID></saml2:Subject></saml2:Assertion>"#;

const SOAP_TARGET: &str = "/soape:Envelope/soape:Body/saml2:Assertion";
const SOAP_SIGNATURE: &str = "/soape:Envelope/soape:Header/ds:Signature";

fn soap_template(header: &str, body: &str) -> String {
    format!(
        r#"<soape:Envelope xmlns:soape="http://schemas.xmlsoap.org/soap/envelope/"><soape:Header>{header}</soape:Header><soape:Body>{body}</soape:Body></soape:Envelope>"#
    )
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn fixture(name: &str) -> PathBuf {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-data/keys")
        .join(name);
    assert!(path.exists(), "missing test fixture {}", path.display());
    path
}

fn sign(template: &str, key_file: &str) -> String {
    let key = loader::load_private_key_file(&fixture(key_file))
        .unwrap()
        .to_signing_key()
        .unwrap();
    ulriksdal::dsig::sign::sign(&SignContext::new(key), template).unwrap()
}

fn anchor(cert_file: &str) -> TrustAnchor {
    TrustAnchor::from_file(&fixture(cert_file)).unwrap()
}

fn assertion_validator(anchor: TrustAnchor) -> Validator {
    Validator::new(
        ValidatorConfig::new(
            anchor,
            SchemaSource::Bundled("saml-schema-assertion-2.0.xsd".into()),
            "/saml2:Assertion/ds:Signature",
            "/saml2:Assertion",
        )
        .with_id_attribute(IdAttribute::new("ID")),
    )
}

fn soap_validator(anchor: TrustAnchor) -> Validator {
    Validator::new(
        ValidatorConfig::new(
            anchor,
            SchemaSource::Bundled("soap-envelope.xsd".into()),
            SOAP_SIGNATURE,
            SOAP_TARGET,
        )
        .with_id_attribute(IdAttribute::new("ID")),
    )
}

/// Follow a locator by comparing qualified names, prefixes included.
fn naive_lookup<'a, 'input>(doc: &'a Document<'input>, locator: &str) -> Option<Node<'a, 'input>> {
    let mut current = doc.root();
    for segment in locator.split('/').filter(|s| !s.is_empty()) {
        current = current
            .children()
            .find(|n| n.is_element() && names::qualified_name(*n) == segment)?;
    }
    Some(current)
}

// ── Sign, then validate ──────────────────────────────────────────────

#[test]
fn test_signed_assertion_verifies() {
    init_tracing();
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let result = assertion_validator(anchor).validate(signed.as_bytes()).unwrap();
    assert!(result.verified);
    assert!(result.diagnostics.is_none());

    let element = result.validated_element.unwrap();
    assert_eq!(element.expanded_name(), format!("{{{}}}Assertion", ns::SAML2_ASSERTION));

    let doc = Document::parse(&signed).unwrap();
    let naive = naive_lookup(&doc, "/saml2:Assertion").unwrap();
    assert_eq!(element.range, naive.range());
    assert_eq!(element.source, signed);
    assert!(element.canonical.starts_with(b"<saml2:Assertion"));
}

#[test]
fn test_tampered_assertion_fails() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let tampered = signed.replacen("alice", "alicf", 1);
    assert_ne!(tampered, signed);

    let result = assertion_validator(anchor).validate(tampered.as_bytes()).unwrap();
    assert!(!result.verified);
    assert!(result.validated_element.is_none());
    let diagnostics = result.diagnostics.unwrap();
    assert!(diagnostics.signature_value_valid);
    assert_eq!(diagnostics.references.len(), 1);
    assert_eq!(diagnostics.references[0].index, 0);
    assert!(!diagnostics.references[0].valid);
}

#[test]
fn test_other_signer_fails() {
    let signed = sign(ASSERTION_TEMPLATE, "signer2-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let result = assertion_validator(anchor).validate(signed.as_bytes()).unwrap();
    assert!(!result.verified);
    let diagnostics = result.diagnostics.unwrap();
    assert!(!diagnostics.signature_value_valid);
    assert!(diagnostics.references[0].valid);
}

#[test]
fn test_validate_is_idempotent() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let validator = assertion_validator(anchor);
    let first = validator.validate(signed.as_bytes()).unwrap();
    let second = validator.validate(signed.as_bytes()).unwrap();
    assert_eq!(first, second);

    let tampered = signed.replacen("alice", "alicf", 1);
    let first = validator.validate(tampered.as_bytes()).unwrap();
    let second = validator.validate(tampered.as_bytes()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reader_and_file_inputs() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let validator = assertion_validator(anchor);
    let from_bytes = validator.validate(signed.as_bytes()).unwrap();

    let from_reader = validator
        .validate_reader(std::io::Cursor::new(signed.as_bytes()))
        .unwrap();
    assert_eq!(from_reader, from_bytes);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assertion.xml");
    std::fs::write(&path, &signed).unwrap();
    let from_file = validator.validate_file(&path).unwrap();
    assert_eq!(from_file, from_bytes);
}

#[test]
fn test_shared_across_threads() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let validator = Arc::new(assertion_validator(anchor));
    let signed = Arc::new(signed);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let validator = Arc::clone(&validator);
            let signed = Arc::clone(&signed);
            std::thread::spawn(move || validator.validate(signed.as_bytes()).unwrap().verified)
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

// ── Signature wrapping ───────────────────────────────────────────────

#[test]
fn test_signed_soap_message_verifies() {
    init_tracing();
    let template = soap_template(&header_signature("#_real"), REAL_ASSERTION);
    let signed = sign(&template, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let result = soap_validator(anchor).validate(signed.as_bytes()).unwrap();
    assert!(result.verified);
    assert_eq!(result.validated_element.unwrap().source, REAL_ASSERTION);
}

#[test]
fn test_wrapped_signature_does_not_cover_target() {
    init_tracing();
    let header = format!(
        r#"{}<w:Wrapper xmlns:w="urn:example:wrapper">{COPIED_ASSERTION}</w:Wrapper>"#,
        header_signature("#_evil")
    );
    let template = soap_template(&header, &format!("{FORGED_ASSERTION}{REAL_ASSERTION}"));
    let signed = sign(&template, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");

    // Looking elements up by prefix lands on the forged assertion, which the
    // signature does cover.
    let doc = Document::parse(&signed).unwrap();
    let naive_target = naive_lookup(&doc, SOAP_TARGET).unwrap();
    assert_eq!(naive_target.attribute("ID"), Some("_evil"));
    let naive_signature = naive_lookup(&doc, SOAP_SIGNATURE).unwrap();
    let ctx = VerifyContext::new(anchor.verifying_key())
        .with_id_binding(IdBinding::bind(naive_target, &IdAttribute::new("ID")).unwrap());
    let naive_verdict = ulriksdal::dsig::verify(&ctx, naive_signature)
        .unwrap()
        .is_core_valid();
    assert!(naive_verdict);

    // The hardened locator reaches the real assertion, which it does not.
    let result = soap_validator(anchor).validate(signed.as_bytes()).unwrap();
    assert_ne!(result.verified, naive_verdict);
    assert!(result.validated_element.is_none());
    let diagnostics = result.diagnostics.unwrap();
    assert!(diagnostics.signature_value_valid);
    assert!(!diagnostics.references[0].valid);
}

#[test]
fn test_require_unique_rejects_duplicate_targets() {
    let template = soap_template(
        &header_signature("#_real"),
        &format!("{REAL_ASSERTION}{COPIED_ASSERTION}"),
    );
    let signed = sign(&template, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let first_match = soap_validator(anchor.clone())
        .validate(signed.as_bytes())
        .unwrap();
    assert!(first_match.verified);

    let config = soap_validator(anchor)
        .config()
        .clone()
        .with_locator_policy(LocatorPolicy::RequireUnique);
    let err = Validator::new(config).validate(signed.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::AmbiguousElement(_)));
}

// ── Fatal errors ─────────────────────────────────────────────────────

#[test]
fn test_missing_target_names_role() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let config = ValidatorConfig::new(
        anchor.clone(),
        SchemaSource::Bundled("saml-schema-assertion-2.0.xsd".into()),
        "/saml2:Assertion/ds:Signature",
        "/saml2:Response",
    );
    let err = Validator::new(config).validate(signed.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        Error::ElementNotFound { role: ElementRole::Target, .. }
    ));

    let config = ValidatorConfig::new(
        anchor,
        SchemaSource::Bundled("saml-schema-assertion-2.0.xsd".into()),
        "/saml2:Assertion/saml2:Signature",
        "/saml2:Assertion",
    );
    let err = Validator::new(config).validate(signed.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        Error::ElementNotFound { role: ElementRole::Signature, .. }
    ));
}

#[test]
fn test_relative_locator_is_malformed() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let config = ValidatorConfig::new(
        anchor,
        SchemaSource::Bundled("saml-schema-assertion-2.0.xsd".into()),
        "/saml2:Assertion/ds:Signature",
        "saml2:Assertion",
    );
    let err = Validator::new(config).validate(signed.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::MalformedLocator(_)));
}

#[test]
fn test_target_without_identifier_attribute() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let config = assertion_validator(anchor)
        .config()
        .clone()
        .with_id_attribute(IdAttribute::new("AssertionID"));
    let err = Validator::new(config).validate(signed.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::IdBinding(_)));
}

#[test]
fn test_schema_invalid_document_is_parse_error() {
    let signed = sign(ASSERTION_TEMPLATE, "signer1-key.pem");
    let anchor = anchor("signer1-cert.pem");
    let invalid = signed.replacen(r#" Version="2.0""#, "", 1);
    let err = assertion_validator(anchor)
        .validate(invalid.as_bytes())
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

/// Records every identifier it is asked for, then defers to the catalog.
#[derive(Default)]
struct RecordingResolver {
    catalog: SchemaCatalog,
    requested: Mutex<Vec<String>>,
}

impl EntityResolver for RecordingResolver {
    fn resolve(&self, public_id: Option<&str>, system_id: &str) -> Result<Resource> {
        self.requested.lock().unwrap().push(system_id.to_owned());
        self.catalog.resolve(public_id, system_id)
    }
}

#[test]
fn test_unknown_schema_location_is_unresolvable() {
    let anchor = anchor("signer1-cert.pem");
    let document = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="urn:example:other http://attacker.example/evil.xsd" ID="_a1" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2:Assertion>"#;
    let resolver = Arc::new(RecordingResolver::default());
    let validator = assertion_validator(anchor).with_resolver(resolver.clone());

    let err = validator.validate(document.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::UnresolvableEntity(id) if id.contains("evil.xsd")));
    let requested = resolver.requested.lock().unwrap();
    assert!(requested.iter().any(|id| id == "http://attacker.example/evil.xsd"));
}

#[test]
fn test_unknown_doctype_is_refused() {
    let anchor = anchor("signer1-cert.pem");
    let document = r#"<!DOCTYPE saml2:Assertion SYSTEM "http://attacker.example/evil.dtd">
<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2:Assertion>"#;
    let resolver = Arc::new(RecordingResolver::default());
    let validator = assertion_validator(anchor).with_resolver(resolver.clone());

    assert!(validator.validate(document.as_bytes()).is_err());
    let requested = resolver.requested.lock().unwrap();
    assert!(requested.iter().any(|id| id.ends_with("evil.dtd")));
}

#[test]
fn test_result_is_plain_data() {
    fn assert_send<T: Send + 'static>(_: &T) {}
    let result = ValidationResult {
        verified: false,
        validated_element: None,
        diagnostics: None,
    };
    assert_send(&result);
}
