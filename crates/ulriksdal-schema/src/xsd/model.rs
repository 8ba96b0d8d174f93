#![forbid(unsafe_code)]

//! Schema components.
//!
//! Components live in arenas owned by [`SchemaSet`](super::SchemaSet) and
//! refer to each other by id or, across schema documents, by expanded name.
//! Named references are checked when a document is compiled, so lookups
//! during validation only fail on an engine bug.

use std::fmt;

use super::datatypes::{Builtin, WhiteSpace};

/// An expanded name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_owned),
            local: local.to_owned(),
        }
    }

    pub fn of(node: roxmltree::Node<'_, '_>) -> Self {
        let tag = node.tag_name();
        Self::new(tag.namespace(), tag.name())
    }

    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) u32);

/// A type named in a schema document or defined inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(QName),
    Local(TypeId),
}

/// Derivation methods, as used by `block` and `final`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivationSet {
    pub extension: bool,
    pub restriction: bool,
    pub substitution: bool,
}

impl DerivationSet {
    pub const ALL: DerivationSet = DerivationSet {
        extension: true,
        restriction: true,
        substitution: true,
    };

    /// Parse a `block`/`final` attribute value.
    pub fn parse(value: &str) -> Option<Self> {
        let mut set = DerivationSet::default();
        for token in value.split_whitespace() {
            match token {
                "#all" => return Some(Self::ALL),
                "extension" => set.extension = true,
                "restriction" => set.restriction = true,
                "substitution" => set.substitution = true,
                // list and union only constrain simple types, which never block.
                "list" | "union" => {}
                _ => return None,
            }
        }
        Some(set)
    }

    pub fn union(self, other: DerivationSet) -> Self {
        Self {
            extension: self.extension || other.extension,
            restriction: self.restriction || other.restriction,
            substitution: self.substitution || other.substitution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

/// The namespaces a wildcard admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// `##other`: qualified names outside the given namespace.
    Other(Option<String>),
    /// An explicit list; `None` stands for `##local`.
    Set(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

impl Wildcard {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.namespaces {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(excluded) => {
                namespace.is_some() && namespace != excluded.as_deref()
            }
            NamespaceConstraint::Set(set) => set.iter().any(|ns| ns.as_deref() == namespace),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub min: u32,
    /// `None` is `unbounded`.
    pub max: Option<u32>,
    pub term: Term,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self {
            min: 1,
            max: Some(1),
            term,
        }
    }

    /// Particles that can never match anything are dropped from models.
    pub fn is_prohibited(&self) -> bool {
        self.max == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Element(ElementId),
    ElementRef(QName),
    Wildcard(Wildcard),
    Group(QName),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: QName,
    /// `None` takes the type of the substitution group head, or `anyType`.
    pub type_ref: Option<TypeRef>,
    pub nillable: bool,
    pub is_abstract: bool,
    pub fixed: Option<String>,
    pub default: Option<String>,
    pub substitution_group: Option<QName>,
    pub block: DerivationSet,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: QName,
    /// `None` is `anySimpleType`.
    pub type_ref: Option<TypeRef>,
    pub fixed: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeTarget {
    Local(AttributeDecl),
    Global(QName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUse {
    pub target: AttributeTarget,
    pub required: bool,
    pub prohibited: bool,
    /// Value constraints on the use override those on a global declaration.
    pub fixed: Option<String>,
    pub default: Option<String>,
}

/// Attribute uses, group references and wildcard of one declaration site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    pub uses: Vec<AttributeUse>,
    pub groups: Vec<QName>,
    pub wildcard: Option<Wildcard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Extension,
    Restriction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Empty,
    /// Character content of the given simple type, further restricted by
    /// `facets` when the content was derived by restriction.
    Simple {
        base: TypeRef,
        facets: Option<Facets>,
    },
    Elements(Particle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexType {
    pub name: Option<QName>,
    /// `None` only for `anyType` itself.
    pub base: Option<TypeRef>,
    pub derivation: Derivation,
    pub is_abstract: bool,
    pub mixed: bool,
    pub content: Content,
    pub attributes: AttributeSet,
    pub block: DerivationSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    pub white_space: Option<WhiteSpace>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleVariety {
    Builtin(Builtin),
    Restriction { base: TypeRef, facets: Facets },
    List { item: TypeRef },
    Union { members: Vec<TypeRef> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleType {
    pub name: Option<QName>,
    pub variety: SimpleVariety,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

impl TypeDef {
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(t) => t.name.as_ref(),
            TypeDef::Complex(t) => t.name.as_ref(),
        }
    }

    /// The type this one is derived from, `None` for the root types.
    pub fn base(&self) -> Option<&TypeRef> {
        match self {
            TypeDef::Complex(t) => t.base.as_ref(),
            TypeDef::Simple(t) => match &t.variety {
                SimpleVariety::Restriction { base, .. } => Some(base),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_excludes_target_and_unqualified() {
        let wildcard = Wildcard {
            namespaces: NamespaceConstraint::Other(Some("urn:t".into())),
            process: ProcessContents::Lax,
        };
        assert!(wildcard.allows(Some("urn:x")));
        assert!(!wildcard.allows(Some("urn:t")));
        assert!(!wildcard.allows(None));
    }

    #[test]
    fn test_derivation_set_parse() {
        assert_eq!(DerivationSet::parse("#all"), Some(DerivationSet::ALL));
        let set = DerivationSet::parse("extension substitution").unwrap();
        assert!(set.extension && set.substitution && !set.restriction);
        assert_eq!(DerivationSet::parse("bogus"), None);
    }

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::new(Some("urn:a"), "x").to_string(), "{urn:a}x");
        assert_eq!(QName::new(Some(""), "x"), QName::new(None, "x"));
    }
}
