#![forbid(unsafe_code)]

//! Parser features recognised by the schema engine.
//!
//! Features are keyed by the URIs established XML parsers use for them.
//! [`Features::set`] reports whether a requested value can be honoured;
//! callers log and skip the ones that cannot.

pub const LOAD_DTD_GRAMMAR: &str = "http://apache.org/xml/features/nonvalidating/load-dtd-grammar";
pub const HONOUR_ALL_SCHEMA_LOCATIONS: &str =
    "http://apache.org/xml/features/honour-all-schemaLocations";
pub const SCHEMA_VALIDATION: &str = "http://apache.org/xml/features/validation/schema";
pub const SCHEMA_FULL_CHECKING: &str =
    "http://apache.org/xml/features/validation/schema-full-checking";
pub const ID_IDREF_CHECKING: &str = "http://apache.org/xml/features/validation/id-idref-checking";
pub const IDENTITY_CONSTRAINT_CHECKING: &str =
    "http://apache.org/xml/features/validation/identity-constraint-checking";
pub const STANDARD_URI_CONFORMANT: &str = "http://apache.org/xml/features/standard-uri-conformant";
pub const UNICODE_NORMALIZATION_CHECKING: &str =
    "http://xml.org/sax/features/unicode-normalization-checking";
pub const EXTERNAL_GENERAL_ENTITIES: &str = "http://xml.org/sax/features/external-general-entities";
pub const DISALLOW_DOCTYPE_DECL: &str = "http://apache.org/xml/features/disallow-doctype-decl";

/// Engine switches derived from the parser feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    pub schema_validation: bool,
    pub id_idref_checking: bool,
    pub uri_conformant: bool,
    pub disallow_doctype: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            schema_validation: true,
            id_idref_checking: true,
            uri_conformant: true,
            disallow_doctype: false,
        }
    }
}

impl Features {
    /// Apply one feature. Returns `false` when the engine cannot honour it.
    pub fn set(&mut self, uri: &str, value: bool) -> bool {
        match uri {
            SCHEMA_VALIDATION => {
                self.schema_validation = value;
                true
            }
            ID_IDREF_CHECKING => {
                self.id_idref_checking = value;
                true
            }
            STANDARD_URI_CONFORMANT => {
                self.uri_conformant = value;
                true
            }
            DISALLOW_DOCTYPE_DECL => {
                self.disallow_doctype = value;
                true
            }
            // DTD declarations are screened but never applied.
            LOAD_DTD_GRAMMAR => !value,
            // Only the first schema per namespace is ever loaded.
            HONOUR_ALL_SCHEMA_LOCATIONS => !value,
            // References are always resolved when a schema is compiled.
            SCHEMA_FULL_CHECKING => value,
            EXTERNAL_GENERAL_ENTITIES => !value,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_values() {
        let mut features = Features::default();
        assert!(features.set(LOAD_DTD_GRAMMAR, false));
        assert!(features.set(SCHEMA_FULL_CHECKING, true));
        assert!(features.set(EXTERNAL_GENERAL_ENTITIES, false));
        assert!(features.set(DISALLOW_DOCTYPE_DECL, true));
        assert!(features.disallow_doctype);
    }

    #[test]
    fn test_unsupported_values() {
        let mut features = Features::default();
        assert!(!features.set(IDENTITY_CONSTRAINT_CHECKING, true));
        assert!(!features.set(UNICODE_NORMALIZATION_CHECKING, true));
        assert!(!features.set(EXTERNAL_GENERAL_ENTITIES, true));
        assert!(!features.set(HONOUR_ALL_SCHEMA_LOCATIONS, true));
        assert!(!features.set("http://example.com/unknown", true));
        assert_eq!(features, Features::default());
    }
}
