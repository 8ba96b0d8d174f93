#![forbid(unsafe_code)]

//! Validator configuration.

use std::path::PathBuf;

use ulriksdal_core::{Error, Result};
use ulriksdal_keys::TrustAnchor;
use ulriksdal_schema::resource;
use ulriksdal_schema::{Resource, ResourceStore};
use ulriksdal_xml::{IdAttribute, ParserLimits};

use crate::locator::LocatorPolicy;

/// Where the initial schema comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// A schema file on disk.
    File(PathBuf),
    /// Schema bytes held in memory, with the name diagnostics use for them.
    Bytes { name: String, data: Vec<u8> },
    /// A schema bundled with the library, e.g. `saml-schema-assertion-2.0.xsd`.
    Bundled(String),
}

impl SchemaSource {
    /// Interpret a command-line value: a bundled schema name, else a path.
    pub fn from_arg(value: &str) -> Self {
        if resource::bundled(value).is_some() {
            SchemaSource::Bundled(value.to_owned())
        } else {
            SchemaSource::File(PathBuf::from(value))
        }
    }

    /// Read the schema, bundled ones from `store`.
    pub fn load(&self, store: &ResourceStore) -> Result<Resource> {
        match self {
            SchemaSource::File(path) => {
                let data = std::fs::read(path)?;
                let name = path.display().to_string();
                Ok(Resource::new(name.clone(), name, data))
            }
            SchemaSource::Bytes { name, data } => {
                Ok(Resource::new(name.clone(), name.clone(), data.clone()))
            }
            SchemaSource::Bundled(name) => {
                if resource::bundled(name).is_none() {
                    return Err(Error::UnresolvableEntity(format!(
                        "no bundled schema named {name}"
                    )));
                }
                let data = store.load(name)?;
                Ok(Resource::new(name.clone(), name.clone(), data))
            }
        }
    }
}

/// Everything one [`Validator`](crate::Validator) needs besides the document.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub trust_anchor: TrustAnchor,
    pub schema: SchemaSource,
    /// Locator of the `ds:Signature` element.
    pub signature_locator: String,
    /// Locator of the element the signature must cover.
    pub target_locator: String,
    /// Attribute bound as the target's identifier before verification.
    pub id_attribute: Option<IdAttribute>,
    pub limits: ParserLimits,
    pub locator_policy: LocatorPolicy,
    /// Where catalog resources are read from.
    pub resource_store: ResourceStore,
}

impl ValidatorConfig {
    pub fn new(
        trust_anchor: TrustAnchor,
        schema: SchemaSource,
        signature_locator: impl Into<String>,
        target_locator: impl Into<String>,
    ) -> Self {
        Self {
            trust_anchor,
            schema,
            signature_locator: signature_locator.into(),
            target_locator: target_locator.into(),
            id_attribute: None,
            limits: ParserLimits::default(),
            locator_policy: LocatorPolicy::default(),
            resource_store: ResourceStore::default(),
        }
    }

    pub fn with_id_attribute(mut self, attribute: IdAttribute) -> Self {
        self.id_attribute = Some(attribute);
        self
    }

    pub fn with_limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_locator_policy(mut self, policy: LocatorPolicy) -> Self {
        self.locator_policy = policy;
        self
    }

    pub fn with_resource_store(mut self, store: ResourceStore) -> Self {
        self.resource_store = store;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_source_from_arg() {
        assert_eq!(
            SchemaSource::from_arg("saml-schema-assertion-2.0.xsd"),
            SchemaSource::Bundled("saml-schema-assertion-2.0.xsd".into())
        );
        assert_eq!(
            SchemaSource::from_arg("schemas/custom.xsd"),
            SchemaSource::File(PathBuf::from("schemas/custom.xsd"))
        );
    }

    #[test]
    fn test_load_bundled() {
        let resource = SchemaSource::Bundled("soap-envelope.xsd".into())
            .load(&ResourceStore::Bundled)
            .unwrap();
        assert_eq!(resource.location, "soap-envelope.xsd");
        assert!(resource.text().unwrap().contains("Envelope"));
    }

    #[test]
    fn test_load_unknown_bundled() {
        let err = SchemaSource::Bundled("evil.xsd".into())
            .load(&ResourceStore::Bundled)
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xsd");
        std::fs::write(&path, b"<xs:schema/>").unwrap();
        let resource = SchemaSource::File(path).load(&ResourceStore::Bundled).unwrap();
        assert_eq!(&*resource.data, b"<xs:schema/>");
    }
}
