#![forbid(unsafe_code)]

//! The validation pipeline.
//!
//! ```text
//! Init -> Parsed -> Located -> Bound -> Verified -> Done
//! ```
//!
//! Each state is its own type and each transition consumes or borrows the
//! previous state, so no stage can be skipped. Every error ends the run.
//! A signature that does not verify is not an error: it is a
//! [`ValidationResult`] with `verified` false.

use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use roxmltree::{Document, Node, NodeId};
use ulriksdal_core::{ElementRole, Error, Result};
use ulriksdal_dsig::{ReferenceOutcome, VerifyContext, VerifyOutcome};
use ulriksdal_schema::{EntityResolver, SchemaCatalog};
use ulriksdal_xml::{IdAttribute, IdBinding};

use crate::config::ValidatorConfig;
use crate::locator::{harden, HardenedLocator};
use crate::parser::SecureParser;
use crate::resolver::DocumentNamespaces;

/// The element a successful validation vouches for, copied out of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedElement {
    pub namespace: Option<String>,
    pub local_name: String,
    /// Position of the element in the parsed tree.
    pub node_id: NodeId,
    /// Byte range of the element in the document text.
    pub range: Range<usize>,
    /// The element exactly as it appears in the document.
    pub source: String,
    /// Exclusive canonical form of the element, without comments.
    pub canonical: Vec<u8>,
}

impl ValidatedElement {
    fn capture(node: Node<'_, '_>) -> Result<Self> {
        let name = node.tag_name();
        let range = node.range();
        let source = node
            .document()
            .input_text()
            .get(range.clone())
            .unwrap_or_default()
            .to_owned();
        Ok(Self {
            namespace: name.namespace().map(str::to_owned),
            local_name: name.name().to_owned(),
            node_id: node.id(),
            range,
            source,
            canonical: ulriksdal_dsig::verify::canonical_bytes(node)?,
        })
    }

    /// `{namespace}local`, or the bare local name.
    pub fn expanded_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.local_name),
            None => self.local_name.clone(),
        }
    }
}

/// Why core validation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub signature_value_valid: bool,
    pub signature_value_reason: Option<String>,
    /// One entry per `Reference`, in document order.
    pub references: Vec<ReferenceOutcome>,
}

impl From<VerifyOutcome> for Diagnostics {
    fn from(outcome: VerifyOutcome) -> Self {
        Self {
            signature_value_valid: outcome.signature_value_valid,
            signature_value_reason: outcome.signature_value_reason,
            references: outcome.references,
        }
    }
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub verified: bool,
    /// Present only when `verified`.
    pub validated_element: Option<ValidatedElement>,
    /// Present only when not `verified`.
    pub diagnostics: Option<Diagnostics>,
}

/// Validates documents against one configuration.
///
/// Holds no per-document state; share it freely between threads.
pub struct Validator {
    config: ValidatorConfig,
    resolver: Arc<dyn EntityResolver>,
}

impl Validator {
    /// A validator resolving external references through the schema catalog.
    pub fn new(config: ValidatorConfig) -> Self {
        let resolver = Arc::new(SchemaCatalog::new(config.resource_store.clone()));
        Self { config, resolver }
    }

    /// Replace the entity resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a document held in memory.
    pub fn validate(&self, document: &[u8]) -> Result<ValidationResult> {
        self.run(document, "document")
    }

    /// Validate a document read to its end from `reader`.
    pub fn validate_reader<R: Read>(&self, reader: R) -> Result<ValidationResult> {
        let limit = self.config.limits.max_document_bytes as u64 + 1;
        let mut data = Vec::new();
        reader.take(limit).read_to_end(&mut data)?;
        self.run(&data, "document")
    }

    /// Validate the document in the file at `path`.
    pub fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let data = std::fs::read(path)?;
        self.run(&data, &path.display().to_string())
    }

    fn run(&self, document: &[u8], system_id: &str) -> Result<ValidationResult> {
        tracing::info!(system_id, bytes = document.len(), "validating document");
        let parsed = Init::new(self, document, system_id).parse()?;
        let located = parsed.locate(&self.config)?;
        let bound = located.bind(self.config.id_attribute.as_ref())?;
        let verified = bound.verify(&self.config)?;
        verified.finish()
    }
}

struct Init<'v, 'input> {
    validator: &'v Validator,
    document: &'input [u8],
    system_id: &'v str,
}

impl<'v, 'input> Init<'v, 'input> {
    fn new(validator: &'v Validator, document: &'input [u8], system_id: &'v str) -> Self {
        Self {
            validator,
            document,
            system_id,
        }
    }

    fn parse(self) -> Result<Parsed<'input>> {
        let config = &self.validator.config;
        let parser = SecureParser::new(self.validator.resolver.as_ref(), &config.limits);
        let initial = config.schema.load(&config.resource_store)?;
        let mut schema = parser.compile_schema(initial)?;
        let doc = parser.parse_bytes(self.document, self.system_id, &mut schema)?;
        Ok(Parsed { doc })
    }
}

struct Parsed<'input> {
    doc: Document<'input>,
}

impl<'input> Parsed<'input> {
    fn locate(&self, config: &ValidatorConfig) -> Result<Located<'_, 'input>> {
        let namespaces = DocumentNamespaces::from_document(&self.doc);
        let target_locator = harden(&config.target_locator, &namespaces)?;
        let signature_locator = harden(&config.signature_locator, &namespaces)?;
        let target = self.find(&target_locator, ElementRole::Target, config)?;
        let signature = self.find(&signature_locator, ElementRole::Signature, config)?;
        tracing::info!(
            target = %target_locator,
            signature = %signature_locator,
            "located target and signature"
        );
        Ok(Located { target, signature })
    }

    fn find(
        &self,
        locator: &HardenedLocator,
        role: ElementRole,
        config: &ValidatorConfig,
    ) -> Result<Node<'_, 'input>> {
        locator
            .evaluate(&self.doc, config.locator_policy)?
            .ok_or_else(|| Error::ElementNotFound {
                role,
                locator: locator.source().to_owned(),
            })
    }
}

struct Located<'a, 'input> {
    target: Node<'a, 'input>,
    signature: Node<'a, 'input>,
}

impl<'a, 'input> Located<'a, 'input> {
    fn bind(self, attribute: Option<&IdAttribute>) -> Result<Bound<'a, 'input>> {
        let binding = attribute
            .map(|attribute| IdBinding::bind(self.target, attribute))
            .transpose()?;
        if let Some(binding) = &binding {
            tracing::info!(
                attribute = %binding.attribute(),
                value = binding.value(),
                "bound identifier attribute"
            );
        }
        Ok(Bound {
            target: self.target,
            signature: self.signature,
            binding,
        })
    }
}

struct Bound<'a, 'input> {
    target: Node<'a, 'input>,
    signature: Node<'a, 'input>,
    binding: Option<IdBinding>,
}

impl<'a, 'input> Bound<'a, 'input> {
    fn verify(self, config: &ValidatorConfig) -> Result<Verified<'a, 'input>> {
        let mut ctx = VerifyContext::new(config.trust_anchor.verifying_key());
        if let Some(binding) = self.binding {
            ctx = ctx.with_id_binding(binding);
        }
        let outcome = ulriksdal_dsig::verify(&ctx, self.signature)?;
        if outcome.is_core_valid() {
            tracing::info!("signature verified");
            Ok(Verified::Success {
                target: self.target,
            })
        } else {
            tracing::info!(
                signature_value_valid = outcome.signature_value_valid,
                "signature did not verify"
            );
            Ok(Verified::Failure { outcome })
        }
    }
}

enum Verified<'a, 'input> {
    Success { target: Node<'a, 'input> },
    Failure { outcome: VerifyOutcome },
}

impl Verified<'_, '_> {
    fn finish(self) -> Result<ValidationResult> {
        match self {
            Verified::Success { target } => Ok(ValidationResult {
                verified: true,
                validated_element: Some(ValidatedElement::capture(target)?),
                diagnostics: None,
            }),
            Verified::Failure { outcome } => Ok(ValidationResult {
                verified: false,
                validated_element: None,
                diagnostics: Some(outcome.into()),
            }),
        }
    }
}
