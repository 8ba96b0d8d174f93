#![forbid(unsafe_code)]

//! Schema-validating parser with a fixed, fail-closed configuration.
//!
//! Parsing a document runs three stages, each of which reports through the
//! [`FailClosed`] handler:
//!
//! 1. the prolog is screened: DOCTYPE and parameter-entity references must
//!    resolve through the entity resolver, external general entities are
//!    refused
//! 2. the tree is built under [`ParserLimits`]
//! 3. the tree is validated against the compiled initial schema, loading
//!    further schemas only through the entity resolver

use roxmltree::Document;
use ulriksdal_core::{Error, Result};
use ulriksdal_schema::dtd::DoctypeScreen;
use ulriksdal_schema::features::{self, Features};
use ulriksdal_schema::xsd::Session;
use ulriksdal_schema::{Diagnostic, EntityResolver, ErrorHandler, FailClosed, Resource, SchemaSet};
use ulriksdal_xml::ParserLimits;

/// Parser features, applied in order. Values the engine cannot honour are
/// logged and skipped.
pub const PARSER_FEATURES: &[(&str, bool)] = &[
    (features::LOAD_DTD_GRAMMAR, false),
    (features::HONOUR_ALL_SCHEMA_LOCATIONS, false),
    (features::SCHEMA_VALIDATION, true),
    (features::SCHEMA_FULL_CHECKING, true),
    (features::ID_IDREF_CHECKING, true),
    (features::IDENTITY_CONSTRAINT_CHECKING, true),
    (features::STANDARD_URI_CONFORMANT, true),
    (features::UNICODE_NORMALIZATION_CHECKING, true),
    (features::EXTERNAL_GENERAL_ENTITIES, false),
    (features::DISALLOW_DOCTYPE_DECL, false),
];

/// A parser bound to one entity resolver and one set of limits.
pub struct SecureParser<'a> {
    resolver: &'a dyn EntityResolver,
    limits: &'a ParserLimits,
    features: Features,
}

impl<'a> SecureParser<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, limits: &'a ParserLimits) -> Self {
        let mut features = Features::default();
        for (uri, value) in PARSER_FEATURES {
            if !features.set(uri, *value) {
                tracing::warn!("Unsupported XML parser feature {uri}");
            }
        }
        Self {
            resolver,
            limits,
            features,
        }
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    fn session(&self) -> Session<'_> {
        Session {
            resolver: self.resolver,
            handler: &FailClosed,
            features: &self.features,
            limits: self.limits,
        }
    }

    /// Compile `initial` and every schema it imports or includes.
    pub fn compile_schema(&self, initial: Resource) -> Result<SchemaSet> {
        SchemaSet::compile(initial, &self.session())
    }

    /// Parse `text`, read from `system_id`, and validate it against `schema`.
    pub fn parse<'input>(
        &self,
        text: &'input str,
        system_id: &str,
        schema: &mut SchemaSet,
    ) -> Result<Document<'input>> {
        let session = self.session();
        DoctypeScreen::new(self.resolver, &FailClosed, &self.features, self.limits)
            .screen(text, system_id)?;
        let doc = match ulriksdal_xml::parse(text, self.limits) {
            Ok(doc) => doc,
            Err(Error::Parse(message)) => {
                return Err(fatal(&FailClosed, system_id, message));
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(
            system_id,
            nodes = doc.descendants().count(),
            "document well-formed"
        );
        schema.validate(&doc, system_id, &session)?;
        tracing::info!(system_id, "document is schema-valid");
        Ok(doc)
    }

    /// Decode `data` and run [`SecureParser::parse`] on it.
    pub fn parse_bytes<'input>(
        &self,
        data: &'input [u8],
        system_id: &str,
        schema: &mut SchemaSet,
    ) -> Result<Document<'input>> {
        let text = match ulriksdal_xml::decode_utf8(data) {
            Ok(text) => text,
            Err(Error::Parse(message)) => {
                return Err(fatal(&FailClosed, system_id, message));
            }
            Err(e) => return Err(e),
        };
        self.parse(text, system_id, schema)
    }
}

fn fatal(handler: &dyn ErrorHandler, system_id: &str, message: String) -> Error {
    let diagnostic = Diagnostic::fatal(message).in_resource(system_id);
    let fallback = Error::Parse(diagnostic.to_string());
    handler.report(diagnostic).err().unwrap_or(fallback)
}
