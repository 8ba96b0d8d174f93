#![forbid(unsafe_code)]

//! XML-DSig signature creation from templates.
//!
//! A template is a document holding a `<ds:Signature>` whose `DigestValue`
//! and `SignatureValue` elements are empty. Signing fills them in place;
//! the rest of the template text is left byte-for-byte as written.

use std::ops::Range;

use roxmltree::{Document, Node};
use ulriksdal_core::{ns, Error, Result};
use ulriksdal_xml::{names, xpath, IdAttribute, NodeSet, ParserLimits};

use crate::context::SignContext;
use crate::signature::XmlSignature;
use crate::verify::digest_reference;
use crate::encode_base64;

const DEFAULT_ID_ATTRIBUTES: [&str; 3] = ["ID", "Id", "id"];

/// Sign an XML template document.
///
/// The first `<ds:Signature>` in document order is filled in. Returns the
/// signed document text.
pub fn sign(ctx: &SignContext, template_xml: &str) -> Result<String> {
    let limits = ParserLimits::default();

    // Digests first: SignedInfo must carry them before it is signed.
    let digested = {
        let doc = ulriksdal_xml::parse(template_xml, &limits)?;
        let signature = XmlSignature::unmarshal(find_signature(&doc)?)?;
        let mut edits = Vec::with_capacity(signature.references.len());
        for reference in &signature.references {
            let node_set = dereference(ctx, &doc, reference.uri)?;
            let digest = digest_reference(&doc, reference, node_set)?;
            tracing::debug!(uri = ?reference.uri, "computed reference digest");
            edits.push(fill(reference.digest_value_node, &encode_base64(&digest)));
        }
        splice(template_xml, edits)
    };

    let doc = ulriksdal_xml::parse(&digested, &limits)?;
    let signature = XmlSignature::unmarshal(find_signature(&doc)?)?;
    let c14n_signed_info = ulriksdal_c14n::canonicalize_subtree(
        signature.signed_info,
        signature.c14n_mode,
        &signature.inclusive_prefixes,
    )?;
    let value = signature
        .signature_method
        .sign(&ctx.key, &c14n_signed_info)?;
    tracing::info!(
        method = signature.signature_method.uri(),
        references = signature.references.len(),
        "signed template"
    );
    Ok(splice(
        &digested,
        vec![fill(signature.signature_value_node, &encode_base64(&value))],
    ))
}

fn find_signature<'a, 'input>(doc: &'a Document<'input>) -> Result<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.has_tag_name((ns::DSIG, ns::node::SIGNATURE)))
        .ok_or_else(|| Error::MissingElement("Signature".into()))
}

/// Replacement text for an element, keeping its qualified name.
fn fill(node: Node<'_, '_>, content: &str) -> (Range<usize>, String) {
    let qname = names::qualified_name(node);
    (node.range(), format!("<{qname}>{content}</{qname}>"))
}

fn splice(text: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
    let mut out = text.to_owned();
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    out
}

fn dereference(ctx: &SignContext, doc: &Document<'_>, uri: Option<&str>) -> Result<NodeSet> {
    let uri = uri.ok_or_else(|| Error::MissingAttribute("URI on Reference".into()))?;
    if uri.is_empty() {
        return Ok(NodeSet::all_without_comments(doc));
    }
    let fragment = xpath::parse_same_document_ref(uri)
        .ok_or_else(|| Error::InvalidUri(format!("external URI not supported: {uri}")))?;
    if xpath::is_xpointer_root(fragment) {
        return Ok(NodeSet::all(doc));
    }
    match xpath::parse_xpointer_id(fragment) {
        Some(id) => Ok(NodeSet::tree_with_comments(find_by_id(
            doc,
            id,
            ctx.id_attribute.as_ref(),
        )?)),
        None => Ok(NodeSet::tree_without_comments(find_by_id(
            doc,
            fragment,
            ctx.id_attribute.as_ref(),
        )?)),
    }
}

/// The single element whose identifier attribute is `id`.
fn find_by_id<'a, 'input>(
    doc: &'a Document<'input>,
    id: &str,
    attribute: Option<&IdAttribute>,
) -> Result<Node<'a, 'input>> {
    let has_id = |node: &Node<'_, '_>| match attribute {
        Some(attr) => attr.value_on(*node) == Some(id),
        None => DEFAULT_ID_ATTRIBUTES
            .iter()
            .any(|name| node.attribute(*name) == Some(id)),
    };
    let mut matches = doc.descendants().filter(|n| n.is_element() && has_id(n));
    let node = matches
        .next()
        .ok_or_else(|| Error::InvalidUri(format!("no element has identifier {id}")))?;
    if matches.next().is_some() {
        return Err(Error::IdBinding(format!(
            "identifier {id} is used by more than one element"
        )));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VerifyContext;
    use crate::verify::verify;
    use ulriksdal_crypto::CryptoKey;
    use ulriksdal_xml::IdBinding;

    const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

    const TEMPLATE: &str = r##"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><soap:Header><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/>
    <ds:Reference URI="#body">
      <ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue/>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue></ds:SignatureValue>
</ds:Signature></soap:Header><soap:Body wsu:Id="body"><m:Ping xmlns:m="urn:m">hello</m:Ping></soap:Body></soap:Envelope>"##;

    fn key() -> CryptoKey {
        CryptoKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
    }

    fn sign_template(key: &CryptoKey) -> String {
        let ctx = SignContext::new(key.clone())
            .with_id_attribute(IdAttribute::namespaced(WSU, "Id"));
        sign(&ctx, TEMPLATE).unwrap()
    }

    fn check(xml: &str, key: &CryptoKey, bind: bool) -> crate::VerifyOutcome {
        let doc = Document::parse(xml).unwrap();
        let sig = find_signature(&doc).unwrap();
        let mut ctx = VerifyContext::new(key.to_public());
        if bind {
            let body = doc
                .descendants()
                .find(|n| n.has_tag_name(("http://schemas.xmlsoap.org/soap/envelope/", "Body")))
                .unwrap();
            ctx = ctx.with_id_binding(
                IdBinding::bind(body, &IdAttribute::namespaced(WSU, "Id")).unwrap(),
            );
        }
        verify(&ctx, sig).unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let key = key();
        let signed = sign_template(&key);
        assert!(!signed.contains("<ds:DigestValue/>"));
        assert!(!signed.contains("<ds:SignatureValue></ds:SignatureValue>"));
        assert!(signed.ends_with("<soap:Body wsu:Id=\"body\"><m:Ping xmlns:m=\"urn:m\">hello</m:Ping></soap:Body></soap:Envelope>"));
        let outcome = check(&signed, &key, true);
        assert!(outcome.is_core_valid(), "{outcome:?}");
        assert_eq!(outcome.references[0].uri.as_deref(), Some("#body"));
    }

    #[test]
    fn test_tampered_content_fails_digest() {
        let key = key();
        let signed = sign_template(&key).replace(">hello<", ">hellO<");
        let outcome = check(&signed, &key, true);
        assert!(outcome.signature_value_valid);
        assert!(!outcome.references[0].valid);
        assert_eq!(
            outcome.references[0].reason.as_deref(),
            Some("digest value does not match")
        );
        assert!(!outcome.is_core_valid());
    }

    #[test]
    fn test_other_key_fails_signature_value() {
        let signed = sign_template(&key());
        let outcome = check(&signed, &key(), true);
        assert!(!outcome.signature_value_valid);
        assert!(outcome.references[0].valid);
    }

    #[test]
    fn test_unbound_reference_is_unresolvable() {
        let key = key();
        let signed = sign_template(&key);
        let outcome = check(&signed, &key, false);
        assert!(!outcome.references[0].valid);
        assert!(outcome.references[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("no identifier attribute is bound"));
    }

    #[test]
    fn test_binding_to_other_value_is_unresolvable() {
        let key = key();
        let signed = sign_template(&key).replace("wsu:Id=\"body\"", "wsu:Id=\"other\"");
        let outcome = check(&signed, &key, true);
        assert!(!outcome.references[0].valid);
        assert!(outcome.references[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("does not name the bound element"));
    }

    #[test]
    fn test_enveloped_whole_document() {
        let template = r##"<r xmlns="urn:r"><v>1</v><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/><ds:Reference URI=""><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue></ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue/></ds:Signature></r>"##;
        let key = key();
        let signed = sign(&SignContext::new(key.clone()), template).unwrap();
        let outcome = check(&signed, &key, false);
        assert!(outcome.is_core_valid(), "{outcome:?}");

        let tampered = signed.replace("<v>1</v>", "<v>2</v>");
        assert!(!check(&tampered, &key, false).is_core_valid());
    }

    #[test]
    fn test_duplicate_identifier_in_template() {
        let template = TEMPLATE.replace(
            "<soap:Header>",
            "<soap:Header><x wsu:Id=\"body\"/>",
        );
        let ctx = SignContext::new(key()).with_id_attribute(IdAttribute::namespaced(WSU, "Id"));
        assert!(matches!(sign(&ctx, &template), Err(Error::IdBinding(_))));
    }

    #[test]
    fn test_template_without_signature() {
        assert!(matches!(
            sign(&SignContext::new(key()), "<a/>"),
            Err(Error::MissingElement(_))
        ));
    }
}
