#![forbid(unsafe_code)]

//! W3C XML Schema validation.
//!
//! A [`SchemaSet`] starts from one initial schema document. Imports,
//! includes and instance `xsi:schemaLocation` hints are resolved only
//! through the session's [`EntityResolver`]. Wildcard content in a
//! namespace that has not been loaded yet triggers a namespace-keyed
//! lookup, so a SOAP envelope schema pulls in the WS-Security and SAML
//! schemas as the document needs them.
//!
//! Every diagnostic goes to the session's [`ErrorHandler`].

pub mod datatypes;
mod loader;
pub mod model;
mod particle;
mod validator;

use std::collections::{HashMap, HashSet};

use roxmltree::Document;
use ulriksdal_core::{ns, Error, Result};
use ulriksdal_xml::ParserLimits;

use crate::catalog::EntityResolver;
use crate::diagnostics::{Diagnostic, ErrorHandler};
use crate::features::Features;
use crate::resource::Resource;

use datatypes::Builtin;
use model::{
    AttributeDecl, AttributeSet, ComplexType, Content, Derivation, DerivationSet, ElementDecl,
    ElementId, NamespaceConstraint, Particle, ProcessContents, QName, SimpleType, SimpleVariety,
    Term, TypeDef, TypeId, TypeRef, Wildcard,
};

use loader::LoadMode;

/// Collaborators shared by schema loading and instance validation.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub resolver: &'a dyn EntityResolver,
    pub handler: &'a dyn ErrorHandler,
    pub features: &'a Features,
    pub limits: &'a ParserLimits,
}

impl Session<'_> {
    pub(crate) fn report(&self, diagnostic: Diagnostic) -> Result<()> {
        self.handler.report(diagnostic)
    }

    /// Report a diagnostic that processing cannot continue past.
    pub(crate) fn fail<T>(&self, diagnostic: Diagnostic) -> Result<T> {
        let message = diagnostic.to_string();
        self.handler.report(diagnostic)?;
        Err(Error::Parse(message))
    }
}

/// Compiled schema components from every loaded schema document.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub(crate) types: Vec<TypeDef>,
    pub(crate) type_names: HashMap<QName, TypeId>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) element_names: HashMap<QName, ElementId>,
    pub(crate) attributes: HashMap<QName, AttributeDecl>,
    pub(crate) groups: HashMap<QName, Particle>,
    pub(crate) attribute_groups: HashMap<QName, AttributeSet>,
    /// Substitution group head to its direct members.
    pub(crate) substitutions: HashMap<QName, Vec<QName>>,
    namespaces: HashSet<Option<String>>,
    documents: HashSet<String>,
    /// Namespaces the resolver had no schema for.
    missing: HashSet<String>,
    any_type: TypeId,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaSet {
    /// A set holding only the built-in types.
    pub fn new() -> Self {
        let xs = |local: &str| QName::new(Some(ns::XSD), local);
        let any = Wildcard {
            namespaces: NamespaceConstraint::Any,
            process: ProcessContents::Lax,
        };
        let any_type = TypeDef::Complex(ComplexType {
            name: Some(xs("anyType")),
            base: None,
            derivation: Derivation::Restriction,
            is_abstract: false,
            mixed: true,
            content: Content::Elements(Particle {
                min: 0,
                max: None,
                term: Term::Wildcard(any.clone()),
            }),
            attributes: AttributeSet {
                wildcard: Some(any),
                ..AttributeSet::default()
            },
            block: DerivationSet::default(),
        });
        let mut set = Self {
            types: vec![any_type],
            type_names: HashMap::new(),
            elements: Vec::new(),
            element_names: HashMap::new(),
            attributes: HashMap::new(),
            groups: HashMap::new(),
            attribute_groups: HashMap::new(),
            substitutions: HashMap::new(),
            namespaces: HashSet::new(),
            documents: HashSet::new(),
            missing: HashSet::new(),
            any_type: TypeId(0),
        };
        set.type_names.insert(xs("anyType"), TypeId(0));
        for builtin in Builtin::ALL {
            let name = xs(builtin.name());
            let id = set.push_type(TypeDef::Simple(SimpleType {
                name: Some(name.clone()),
                variety: SimpleVariety::Builtin(*builtin),
            }));
            set.type_names.insert(name, id);
        }
        set.namespaces.insert(Some(ns::XSD.to_owned()));
        set
    }

    /// Load `initial` and everything it imports or includes.
    pub fn compile(initial: Resource, session: &Session<'_>) -> Result<Self> {
        let mut set = Self::new();
        tracing::info!(schema = %initial.location, "compiling schema");
        set.load_document(initial, LoadMode::Initial, session)?;
        set.check_references(session)?;
        tracing::debug!(
            documents = set.documents.len(),
            types = set.types.len(),
            elements = set.element_names.len(),
            "schema compiled"
        );
        Ok(set)
    }

    /// Validate a parsed instance document read from `system_id`.
    pub fn validate(
        &mut self,
        doc: &Document<'_>,
        system_id: &str,
        session: &Session<'_>,
    ) -> Result<()> {
        if !session.features.schema_validation {
            tracing::debug!("schema validation is switched off");
            return Ok(());
        }
        validator::Validation::new(self, session, system_id).document(doc)
    }

    /// Whether a schema for `namespace` has been loaded.
    pub fn has_namespace(&self, namespace: Option<&str>) -> bool {
        self.namespaces.contains(&namespace.map(str::to_owned))
    }

    /// Resource locations of every loaded schema document.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(String::as_str)
    }

    /// The global element declaration for `name`.
    pub fn element(&self, name: &QName) -> Option<&ElementDecl> {
        self.element_names
            .get(name)
            .and_then(|id| self.elements.get(id.0 as usize))
    }

    /// The named global type.
    pub fn type_definition(&self, name: &QName) -> Option<&TypeDef> {
        self.type_names
            .get(name)
            .and_then(|id| self.types.get(id.0 as usize))
    }

    pub(crate) fn push_type(&mut self, def: TypeDef) -> TypeId {
        self.types.push(def);
        TypeId(self.types.len() as u32 - 1)
    }

    pub(crate) fn push_element(&mut self, decl: ElementDecl) -> ElementId {
        self.elements.push(decl);
        ElementId(self.elements.len() as u32 - 1)
    }

    pub(crate) fn any_type(&self) -> TypeId {
        self.any_type
    }

    pub(crate) fn type_def(&self, id: TypeId) -> Result<&TypeDef> {
        self.types
            .get(id.0 as usize)
            .ok_or_else(|| Error::Parse(format!("unknown type id {}", id.0)))
    }

    pub(crate) fn element_decl(&self, id: ElementId) -> Result<&ElementDecl> {
        self.elements
            .get(id.0 as usize)
            .ok_or_else(|| Error::Parse(format!("unknown element id {}", id.0)))
    }

    pub(crate) fn resolve_type(&self, type_ref: &TypeRef) -> Result<TypeId> {
        match type_ref {
            TypeRef::Local(id) => Ok(*id),
            TypeRef::Named(name) => self
                .type_names
                .get(name)
                .copied()
                .ok_or_else(|| Error::Parse(format!("src-resolve: cannot resolve type '{name}'"))),
        }
    }

    /// The type an element declaration gives its instances.
    pub(crate) fn element_type(&self, decl: &ElementDecl) -> Result<TypeId> {
        let mut current = decl;
        for _ in 0..self.elements.len() + 1 {
            if let Some(type_ref) = &current.type_ref {
                return self.resolve_type(type_ref);
            }
            let Some(head) = &current.substitution_group else {
                return Ok(self.any_type);
            };
            current = self.element(head).ok_or_else(|| {
                Error::Parse(format!("src-resolve: cannot resolve element '{head}'"))
            })?;
        }
        Err(Error::Parse(format!(
            "circular substitution group at element '{}'",
            decl.name
        )))
    }

    /// Base type and derivation method, `None` for `anyType`.
    pub(crate) fn base_of(&self, id: TypeId) -> Result<Option<(TypeId, Derivation)>> {
        let any_simple = || {
            self.type_names
                .get(&QName::new(Some(ns::XSD), Builtin::AnySimpleType.name()))
                .copied()
                .ok_or_else(|| Error::Parse("anySimpleType missing".into()))
        };
        Ok(match self.type_def(id)? {
            TypeDef::Complex(ct) => match &ct.base {
                Some(base) => Some((self.resolve_type(base)?, ct.derivation)),
                None => None,
            },
            TypeDef::Simple(st) => match &st.variety {
                SimpleVariety::Builtin(Builtin::AnySimpleType) => {
                    Some((self.any_type, Derivation::Restriction))
                }
                SimpleVariety::Builtin(b) => {
                    let base = b.base().unwrap_or(Builtin::AnySimpleType);
                    let name = QName::new(Some(ns::XSD), base.name());
                    Some((self.resolve_type(&TypeRef::Named(name))?, Derivation::Restriction))
                }
                SimpleVariety::Restriction { base, .. } => {
                    Some((self.resolve_type(base)?, Derivation::Restriction))
                }
                SimpleVariety::List { .. } | SimpleVariety::Union { .. } => {
                    Some((any_simple()?, Derivation::Restriction))
                }
            },
        })
    }

    /// Whether `derived` is `base` or derives from it without using a
    /// blocked derivation method.
    pub(crate) fn derives_from(
        &self,
        derived: TypeId,
        base: TypeId,
        blocked: DerivationSet,
    ) -> Result<bool> {
        let mut current = derived;
        for _ in 0..=self.types.len() {
            if current == base {
                return Ok(true);
            }
            let Some((parent, method)) = self.base_of(current)? else {
                return Ok(false);
            };
            let is_blocked = match method {
                Derivation::Extension => blocked.extension,
                Derivation::Restriction => blocked.restriction,
            };
            if is_blocked {
                return Ok(false);
            }
            current = parent;
        }
        Ok(false)
    }

    /// The global declaration named `name` if it may stand in for `head`.
    pub(crate) fn substitute(&self, head: ElementId, name: &QName) -> Result<Option<ElementId>> {
        let decl = self.element_decl(head)?;
        if decl.name == *name {
            return Ok(Some(head));
        }
        if !decl.global || decl.block.substitution {
            return Ok(None);
        }
        let mut queue = vec![decl.name.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for member in self.substitutions.get(&current).into_iter().flatten() {
                if member == name {
                    return Ok(self.element_names.get(member).copied());
                }
                queue.push(member.clone());
            }
        }
        Ok(None)
    }

    /// Make sure a schema for `namespace` is loaded, asking the resolver
    /// with the namespace URI as identifier. Returns `false` when the
    /// resolver has none.
    pub(crate) fn load_namespace(
        &mut self,
        namespace: Option<&str>,
        session: &Session<'_>,
    ) -> Result<bool> {
        if self.has_namespace(namespace) {
            return Ok(true);
        }
        let Some(namespace) = namespace else {
            return Ok(false);
        };
        if self.missing.contains(namespace) {
            return Ok(false);
        }
        let resource = match session.resolver.resolve(None, namespace) {
            Ok(resource) => resource,
            Err(Error::UnresolvableEntity(_)) => {
                tracing::debug!(namespace, "no schema available for namespace");
                self.missing.insert(namespace.to_owned());
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.load_document(resource, LoadMode::Import(Some(namespace.to_owned())), session)?;
        self.check_references(session)?;
        Ok(true)
    }

    pub(crate) fn mark_namespace(&mut self, namespace: Option<&str>) {
        self.namespaces.insert(namespace.map(str::to_owned));
    }

    /// Record a document as loaded; `false` if it already was.
    pub(crate) fn mark_document(&mut self, location: &str) -> bool {
        self.documents.insert(location.to_owned())
    }

    pub(crate) fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Check that every named reference resolves and no type derives
    /// from itself.
    pub(crate) fn check_references(&self, session: &Session<'_>) -> Result<()> {
        let unresolved = |kind: &str, name: &QName| {
            session.fail::<()>(Diagnostic::error(format!(
                "src-resolve: cannot resolve the name '{name}' to a(n) '{kind}' component"
            )))
        };
        let check_type = |type_ref: &TypeRef| -> Result<()> {
            match type_ref {
                TypeRef::Named(name) if !self.type_names.contains_key(name) => {
                    unresolved("type definition", name)
                }
                _ => Ok(()),
            }
        };
        let check_attributes = |set: &AttributeSet| -> Result<()> {
            for group in &set.groups {
                if !self.attribute_groups.contains_key(group) {
                    unresolved("attribute group", group)?;
                }
            }
            for attribute_use in &set.uses {
                match &attribute_use.target {
                    model::AttributeTarget::Global(name) => {
                        if !self.attributes.contains_key(name) {
                            unresolved("attribute declaration", name)?;
                        }
                    }
                    model::AttributeTarget::Local(decl) => {
                        if let Some(t) = &decl.type_ref {
                            check_type(t)?;
                        }
                    }
                }
            }
            Ok(())
        };

        for (index, def) in self.types.iter().enumerate() {
            match def {
                TypeDef::Complex(ct) => {
                    if let Some(base) = &ct.base {
                        check_type(base)?;
                    }
                    if let Content::Simple { base, .. } = &ct.content {
                        check_type(base)?;
                    }
                    if let Content::Elements(particle) = &ct.content {
                        self.check_particle(particle, session)?;
                    }
                    check_attributes(&ct.attributes)?;
                }
                TypeDef::Simple(st) => match &st.variety {
                    SimpleVariety::Builtin(_) => {}
                    SimpleVariety::Restriction { base, .. } => check_type(base)?,
                    SimpleVariety::List { item } => check_type(item)?,
                    SimpleVariety::Union { members } => {
                        for member in members {
                            check_type(member)?;
                        }
                    }
                },
            }
            if !self.derives_from(TypeId(index as u32), self.any_type, DerivationSet::default())? {
                let name = def
                    .name()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "(anonymous)".into());
                session.fail::<()>(Diagnostic::error(format!(
                    "ct-props-correct.3: circular definitions detected for type '{name}'"
                )))?;
            }
        }
        for decl in &self.elements {
            if let Some(t) = &decl.type_ref {
                check_type(t)?;
            }
            if let Some(head) = &decl.substitution_group {
                if !self.element_names.contains_key(head) {
                    unresolved("element declaration", head)?;
                }
            }
        }
        for decl in self.attributes.values() {
            if let Some(t) = &decl.type_ref {
                check_type(t)?;
            }
        }
        for particle in self.groups.values() {
            self.check_particle(particle, session)?;
        }
        for set in self.attribute_groups.values() {
            check_attributes(set)?;
        }
        Ok(())
    }

    fn check_particle(&self, particle: &Particle, session: &Session<'_>) -> Result<()> {
        let mut stack = vec![particle];
        while let Some(p) = stack.pop() {
            let missing = match &p.term {
                Term::ElementRef(name) if !self.element_names.contains_key(name) => {
                    Some(("element declaration", name))
                }
                Term::Group(name) if !self.groups.contains_key(name) => Some(("group", name)),
                Term::Sequence(ps) | Term::Choice(ps) | Term::All(ps) => {
                    stack.extend(ps.iter());
                    None
                }
                _ => None,
            };
            if let Some((kind, name)) = missing {
                return session.fail(Diagnostic::error(format!(
                    "src-resolve: cannot resolve the name '{name}' to a(n) '{kind}' component"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::diagnostics::FailClosed;

    pub(crate) fn session_parts() -> (SchemaCatalog, FailClosed, Features, ParserLimits) {
        (
            SchemaCatalog::default(),
            FailClosed,
            Features::default(),
            ParserLimits::default(),
        )
    }

    #[test]
    fn test_builtins_are_seeded() {
        let set = SchemaSet::new();
        let int = QName::new(Some(ns::XSD), "int");
        let decimal = QName::new(Some(ns::XSD), "decimal");
        let int_id = set.type_names[&int];
        let decimal_id = set.type_names[&decimal];
        assert!(set
            .derives_from(int_id, decimal_id, DerivationSet::default())
            .unwrap());
        assert!(set
            .derives_from(int_id, set.any_type(), DerivationSet::default())
            .unwrap());
        assert!(!set
            .derives_from(decimal_id, int_id, DerivationSet::default())
            .unwrap());
        assert!(set.has_namespace(Some(ns::XSD)));
    }

    #[test]
    fn test_compile_bundled_saml2() {
        let (catalog, handler, features, limits) = session_parts();
        let session = Session {
            resolver: &catalog,
            handler: &handler,
            features: &features,
            limits: &limits,
        };
        let initial = catalog
            .resolve(None, ns::SAML2_ASSERTION)
            .unwrap();
        let set = SchemaSet::compile(initial, &session).unwrap();
        assert!(set.has_namespace(Some(ns::SAML2_ASSERTION)));
        assert!(set.has_namespace(Some(ns::DSIG)));
        let assertion = QName::new(Some(ns::SAML2_ASSERTION), "Assertion");
        assert!(set.element(&assertion).is_some());
        let signature = QName::new(Some(ns::DSIG), "Signature");
        assert!(set.element(&signature).is_some());
    }

    #[test]
    fn test_compile_every_bundled_schema() {
        let (catalog, handler, features, limits) = session_parts();
        let session = Session {
            resolver: &catalog,
            handler: &handler,
            features: &features,
            limits: &limits,
        };
        for name in crate::resource::bundled_names().filter(|n| n.ends_with(".xsd")) {
            let data = crate::resource::bundled(name).unwrap();
            let resource = Resource::new(name, name, data);
            if let Err(e) = SchemaSet::compile(resource, &session) {
                panic!("{name}: {e}");
            }
        }
    }
}
