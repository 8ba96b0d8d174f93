#![forbid(unsafe_code)]

//! Locally trusted schema and DTD bytes.

use std::borrow::Cow;
use std::path::PathBuf;

use ulriksdal_core::{Error, Result};

macro_rules! bundled {
    ($($name:literal),+ $(,)?) => {
        &[$(($name, include_bytes!(concat!("../schemas/", $name)) as &[u8])),+]
    };
}

/// Resources compiled into the library.
const BUNDLED: &[(&str, &[u8])] = bundled![
    "oasis-200401-wss-wssecurity-secext-1.0.xsd",
    "oasis-200401-wss-wssecurity-utility-1.0.xsd",
    "xml.xsd",
    "xmldsig-core-schema.xsd",
    "XMLSchema.dtd",
    "datatypes.dtd",
    "ws-policy.xsd",
    "addressing.xsd",
    "saml-schema-protocol-1.1.xsd",
    "saml-schema-assertion-1.0.xsd",
    "saml-schema-assertion-2.0.xsd",
    "soap-envelope.xsd",
    "ws-trust.xsd",
];

/// Bytes of a bundled resource.
pub fn bundled(name: &str) -> Option<&'static [u8]> {
    BUNDLED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, data)| *data)
}

/// Names of every bundled resource.
pub fn bundled_names() -> impl Iterator<Item = &'static str> {
    BUNDLED.iter().map(|(name, _)| *name)
}

/// Where catalog resources are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceStore {
    /// The copies compiled into the library.
    #[default]
    Bundled,
    /// An operator-maintained directory holding files with the bundled names.
    Directory(PathBuf),
}

impl ResourceStore {
    /// Read the resource called `name`.
    pub fn load(&self, name: &str) -> Result<Cow<'static, [u8]>> {
        match self {
            ResourceStore::Bundled => bundled(name)
                .map(Cow::Borrowed)
                .ok_or_else(|| Error::UnresolvableEntity(format!("no bundled resource {name}"))),
            ResourceStore::Directory(dir) => {
                let path = dir.join(name);
                std::fs::read(&path).map(Cow::Owned).map_err(|e| {
                    Error::UnresolvableEntity(format!("{}: {e}", path.display()))
                })
            }
        }
    }
}

/// A schema or DTD handed out by an entity resolver.
#[derive(Debug, Clone)]
pub struct Resource {
    /// The identifier the resource was requested under.
    pub system_id: String,
    /// The local resource the identifier mapped to.
    pub location: String,
    pub data: Cow<'static, [u8]>,
}

impl Resource {
    pub fn new(
        system_id: impl Into<String>,
        location: impl Into<String>,
        data: impl Into<Cow<'static, [u8]>>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            location: location.into(),
            data: data.into(),
        }
    }

    /// Resource text, decoded as UTF-8.
    pub fn text(&self) -> Result<&str> {
        ulriksdal_xml::decode_utf8(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_bundled_resource_is_utf8() {
        for name in bundled_names() {
            let data = bundled(name).unwrap();
            assert!(
                ulriksdal_xml::decode_utf8(data).is_ok(),
                "{name} is not UTF-8"
            );
        }
    }

    #[test]
    fn test_unknown_bundled_name() {
        let err = ResourceStore::Bundled.load("evil.xsd").unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(_)));
    }

    #[test]
    fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xml.xsd"), b"<override/>").unwrap();
        let store = ResourceStore::Directory(dir.path().to_path_buf());
        assert_eq!(&*store.load("xml.xsd").unwrap(), b"<override/>");
        assert!(matches!(
            store.load("datatypes.dtd"),
            Err(Error::UnresolvableEntity(_))
        ));
    }
}
