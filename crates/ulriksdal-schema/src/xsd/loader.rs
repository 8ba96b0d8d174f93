#![forbid(unsafe_code)]

//! Schema document parsing.

use roxmltree::Node;
use ulriksdal_core::{ns, Result};

use super::datatypes::WhiteSpace;
use super::model::{
    AttributeDecl, AttributeSet, AttributeTarget, AttributeUse, ComplexType, Content, Derivation,
    DerivationSet, ElementDecl, Facets, NamespaceConstraint, Particle, ProcessContents, QName,
    SimpleType, SimpleVariety, Term, TypeDef, TypeId, TypeRef, Wildcard,
};
use super::{SchemaSet, Session};
use crate::catalog::is_uri_conformant;
use crate::diagnostics::Diagnostic;
use crate::dtd::DoctypeScreen;
use crate::resource::Resource;

/// Why a schema document is being loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadMode {
    Initial,
    /// Imported for the given namespace.
    Import(Option<String>),
    /// Included into a document with the given target namespace.
    Include(Option<String>),
}

impl SchemaSet {
    /// Parse one schema document and everything it imports or includes.
    pub(crate) fn load_document(
        &mut self,
        resource: Resource,
        mode: LoadMode,
        session: &Session<'_>,
    ) -> Result<()> {
        let location = resource.location.clone();
        if !self.mark_document(&location) {
            tracing::debug!(schema = %location, "schema document already loaded");
            return Ok(());
        }
        if self.document_count() > session.limits.max_schema_documents {
            return session.fail(
                Diagnostic::fatal(format!(
                    "more than {} schema documents",
                    session.limits.max_schema_documents
                ))
                .in_resource(&resource.system_id),
            );
        }
        tracing::debug!(system_id = %resource.system_id, schema = %location, "loading schema document");

        let text = resource.text()?;
        DoctypeScreen::new(
            session.resolver,
            session.handler,
            session.features,
            session.limits,
        )
        .screen(text, &resource.system_id)?;
        let doc = match ulriksdal_xml::parse(text, session.limits) {
            Ok(doc) => doc,
            Err(e) => {
                return session
                    .fail(Diagnostic::fatal(e.to_string()).in_resource(&resource.system_id))
            }
        };
        let root = doc.root_element();
        if !root.has_tag_name((ns::XSD, "schema")) {
            return session.fail(
                Diagnostic::fatal(format!(
                    "s4s-elt-character: the root element of a schema document must be \
                     xs:schema, found '{}'",
                    QName::of(root)
                ))
                .in_resource(&resource.system_id),
            );
        }

        let declared = root.attribute("targetNamespace").filter(|t| !t.is_empty());
        let target = match &mode {
            LoadMode::Initial => declared.map(str::to_owned),
            LoadMode::Import(expected) => {
                if declared != expected.as_deref() {
                    return session.fail(
                        Diagnostic::error(format!(
                            "src-import.3.1: imported namespace '{}' does not match the \
                             targetNamespace '{}' of the schema document",
                            expected.as_deref().unwrap_or(""),
                            declared.unwrap_or("")
                        ))
                        .in_resource(&resource.system_id),
                    );
                }
                declared.map(str::to_owned)
            }
            LoadMode::Include(parent) => match declared {
                None => parent.clone(),
                Some(t) if Some(t) == parent.as_deref() => Some(t.to_owned()),
                Some(t) => {
                    return session.fail(
                        Diagnostic::error(format!(
                            "src-include.2.1: included targetNamespace '{t}' differs from '{}'",
                            parent.as_deref().unwrap_or("")
                        ))
                        .in_resource(&resource.system_id),
                    )
                }
            },
        };
        self.mark_namespace(target.as_deref());

        let mut loader = DocumentLoader {
            set: self,
            session,
            system_id: &resource.system_id,
            doc: &doc,
            target,
            elements_qualified: root.attribute("elementFormDefault") == Some("qualified"),
            attributes_qualified: root.attribute("attributeFormDefault") == Some("qualified"),
            block_default: DerivationSet::default(),
        };
        if let Some(block) = root.attribute("blockDefault") {
            loader.block_default = loader.derivation_set(root, block)?;
        }
        loader.schema(root)
    }
}

fn schema_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|c| c.is_element() && !c.has_tag_name((ns::XSD, "annotation")))
}

struct DocumentLoader<'l, 'a, 'd, 'input> {
    set: &'l mut SchemaSet,
    session: &'l Session<'a>,
    system_id: &'l str,
    doc: &'d roxmltree::Document<'input>,
    target: Option<String>,
    elements_qualified: bool,
    attributes_qualified: bool,
    block_default: DerivationSet,
}

impl DocumentLoader<'_, '_, '_, '_> {
    fn fail<T>(&self, node: Node<'_, '_>, message: String) -> Result<T> {
        self.session.fail(
            Diagnostic::error(message)
                .in_resource(self.system_id)
                .at(self.doc.text_pos_at(node.range().start)),
        )
    }

    /// Log a schema construct the engine accepts but does not enforce.
    fn unenforced(&self, node: Node<'_, '_>, message: String) {
        let pos = self.doc.text_pos_at(node.range().start);
        tracing::warn!(
            "{}:{}:{}: {}",
            self.system_id,
            pos.row,
            pos.col,
            message
        );
    }

    fn schema(&mut self, root: Node<'_, '_>) -> Result<()> {
        for child in root.children().filter(Node::is_element) {
            if child.tag_name().namespace() != Some(ns::XSD) {
                return self.fail(
                    child,
                    format!("s4s-elt-invalid: '{}' is not allowed in a schema", QName::of(child)),
                );
            }
            match child.tag_name().name() {
                "annotation" | "notation" => {}
                "import" => self.import(child)?,
                "include" => self.include(child)?,
                "redefine" => {
                    return self.fail(child, "xs:redefine is not supported".into());
                }
                "element" => {
                    let decl = self.element_decl(child, true)?;
                    if let Some(head) = &decl.substitution_group {
                        self.set
                            .substitutions
                            .entry(head.clone())
                            .or_default()
                            .push(decl.name.clone());
                    }
                    let name = decl.name.clone();
                    if self.set.element_names.contains_key(&name) {
                        return self.duplicate(child, "element", &name);
                    }
                    let id = self.set.push_element(decl);
                    self.set.element_names.insert(name, id);
                }
                "complexType" => {
                    let name = self.global_name(child)?;
                    if self.set.type_names.contains_key(&name) {
                        return self.duplicate(child, "type", &name);
                    }
                    let id = self.complex_type(child, Some(name.clone()))?;
                    self.set.type_names.insert(name, id);
                }
                "simpleType" => {
                    let name = self.global_name(child)?;
                    if self.set.type_names.contains_key(&name) {
                        return self.duplicate(child, "type", &name);
                    }
                    let id = self.simple_type(child, Some(name.clone()))?;
                    self.set.type_names.insert(name, id);
                }
                "attribute" => {
                    let name = self.global_name(child)?;
                    if self.set.attributes.contains_key(&name) {
                        return self.duplicate(child, "attribute", &name);
                    }
                    let decl = self.attribute_decl(child, name.clone())?;
                    self.set.attributes.insert(name, decl);
                }
                "attributeGroup" => {
                    let name = self.global_name(child)?;
                    if self.set.attribute_groups.contains_key(&name) {
                        return self.duplicate(child, "attribute group", &name);
                    }
                    let nodes: Vec<_> = schema_children(child).collect();
                    let attributes = self.attribute_set(&nodes)?;
                    self.set.attribute_groups.insert(name, attributes);
                }
                "group" => {
                    let name = self.global_name(child)?;
                    if self.set.groups.contains_key(&name) {
                        return self.duplicate(child, "group", &name);
                    }
                    let mut model = schema_children(child);
                    let particle = match (model.next(), model.next()) {
                        (Some(group), None)
                            if matches!(group.tag_name().name(), "sequence" | "choice" | "all") =>
                        {
                            self.particle(group)?
                        }
                        _ => {
                            return self.fail(
                                child,
                                format!("src-model_group: group '{name}' needs one model group"),
                            )
                        }
                    };
                    let particle =
                        particle.unwrap_or_else(|| Particle::once(Term::Sequence(Vec::new())));
                    self.set.groups.insert(name, particle);
                }
                other => {
                    return self.fail(
                        child,
                        format!("s4s-elt-invalid-content.1: '{other}' is not allowed in a schema"),
                    )
                }
            }
        }
        Ok(())
    }

    fn duplicate<T>(&self, node: Node<'_, '_>, kind: &str, name: &QName) -> Result<T> {
        self.fail(node, format!("sch-props-correct.2: duplicate {kind} '{name}'"))
    }

    fn import(&mut self, node: Node<'_, '_>) -> Result<()> {
        let namespace = node.attribute("namespace").filter(|n| !n.is_empty());
        if namespace.is_some() && namespace == self.target.as_deref() {
            return self.fail(
                node,
                format!(
                    "src-import.1.1: cannot import the target namespace '{}'",
                    namespace.unwrap_or("")
                ),
            );
        }
        if self.set.has_namespace(namespace) {
            tracing::debug!(namespace = namespace.unwrap_or(""), "namespace already loaded");
            return Ok(());
        }
        let Some(identifier) = node.attribute("schemaLocation").or(namespace) else {
            return Ok(());
        };
        self.check_uri(node, identifier)?;
        let resource = self.session.resolver.resolve(None, identifier)?;
        self.set.load_document(
            resource,
            LoadMode::Import(namespace.map(str::to_owned)),
            self.session,
        )
    }

    fn include(&mut self, node: Node<'_, '_>) -> Result<()> {
        let Some(location) = node.attribute("schemaLocation") else {
            return self.fail(node, "s4s-att-must-appear: xs:include needs schemaLocation".into());
        };
        self.check_uri(node, location)?;
        let resource = self.session.resolver.resolve(None, location)?;
        self.set
            .load_document(resource, LoadMode::Include(self.target.clone()), self.session)
    }

    fn check_uri(&self, node: Node<'_, '_>, identifier: &str) -> Result<()> {
        if self.session.features.uri_conformant && !is_uri_conformant(identifier) {
            return self.fail(node, format!("'{identifier}' is not a valid URI reference"));
        }
        Ok(())
    }

    fn global_name(&self, node: Node<'_, '_>) -> Result<QName> {
        match node.attribute("name") {
            Some(name) => Ok(QName::new(self.target.as_deref(), name)),
            None => self.fail(
                node,
                format!(
                    "s4s-att-must-appear: global '{}' needs a name",
                    node.tag_name().name()
                ),
            ),
        }
    }

    fn qname(&self, node: Node<'_, '_>, value: &str) -> Result<QName> {
        let value = value.trim();
        let (prefix, local) = match value.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value),
        };
        let namespace = match prefix {
            Some("xml") => Some(ns::XML),
            Some(p) => match node.lookup_namespace_uri(Some(p)) {
                Some(uri) => Some(uri),
                None => {
                    return self.fail(
                        node,
                        format!("src-resolve.4: prefix '{p}' of '{value}' is not bound"),
                    )
                }
            },
            None => node.lookup_namespace_uri(None),
        };
        Ok(QName::new(namespace, local))
    }

    fn flag(&self, node: Node<'_, '_>, name: &str) -> Result<bool> {
        match node.attribute(name) {
            None | Some("false") | Some("0") => Ok(false),
            Some("true") | Some("1") => Ok(true),
            Some(other) => self.fail(
                node,
                format!("s4s-att-invalid-value: '{other}' is not a boolean for '{name}'"),
            ),
        }
    }

    fn derivation_set(&self, node: Node<'_, '_>, value: &str) -> Result<DerivationSet> {
        match DerivationSet::parse(value) {
            Some(set) => Ok(set),
            None => self.fail(node, format!("s4s-att-invalid-value: invalid block '{value}'")),
        }
    }

    fn block(&self, node: Node<'_, '_>) -> Result<DerivationSet> {
        match node.attribute("block") {
            Some(value) => self.derivation_set(node, value),
            None => Ok(self.block_default),
        }
    }

    fn count(&self, node: Node<'_, '_>, name: &str, value: &str) -> Result<u32> {
        match value.trim().parse() {
            Ok(n) => Ok(n),
            Err(_) => self.fail(
                node,
                format!("s4s-att-invalid-value: '{value}' is not a valid {name}"),
            ),
        }
    }

    fn occurs(&self, node: Node<'_, '_>) -> Result<(u32, Option<u32>)> {
        let min = match node.attribute("minOccurs") {
            Some(v) => self.count(node, "minOccurs", v)?,
            None => 1,
        };
        let max = match node.attribute("maxOccurs") {
            Some("unbounded") => None,
            Some(v) => Some(self.count(node, "maxOccurs", v)?),
            None => Some(1),
        };
        if max.is_some_and(|max| max < min) {
            return self.fail(
                node,
                "p-props-correct.2.1: minOccurs must not be greater than maxOccurs".into(),
            );
        }
        Ok((min, max))
    }

    /// Type given by a `type` attribute or an inline definition.
    fn type_of(&mut self, node: Node<'_, '_>) -> Result<Option<TypeRef>> {
        let inline = schema_children(node)
            .find(|c| matches!(c.tag_name().name(), "complexType" | "simpleType"));
        match (node.attribute("type"), inline) {
            (Some(_), Some(_)) => self.fail(
                node,
                "src-element.3: 'type' and an anonymous type are mutually exclusive".into(),
            ),
            (Some(name), None) => Ok(Some(TypeRef::Named(self.qname(node, name)?))),
            (None, Some(def)) if def.has_tag_name((ns::XSD, "complexType")) => {
                Ok(Some(TypeRef::Local(self.complex_type(def, None)?)))
            }
            (None, Some(def)) => Ok(Some(TypeRef::Local(self.simple_type(def, None)?))),
            (None, None) => Ok(None),
        }
    }

    fn value_constraint(&self, node: Node<'_, '_>) -> Result<(Option<String>, Option<String>)> {
        let fixed = node.attribute("fixed").map(str::to_owned);
        let default = node.attribute("default").map(str::to_owned);
        if fixed.is_some() && default.is_some() {
            return self.fail(
                node,
                "src-element.1: 'default' and 'fixed' must not both be present".into(),
            );
        }
        Ok((fixed, default))
    }

    fn element_decl(&mut self, node: Node<'_, '_>, global: bool) -> Result<ElementDecl> {
        let Some(local) = node.attribute("name") else {
            return self.fail(node, "s4s-att-must-appear: element needs a name".into());
        };
        let qualified = match node.attribute("form") {
            Some("qualified") => true,
            Some("unqualified") => false,
            Some(other) => {
                return self.fail(node, format!("s4s-att-invalid-value: form '{other}'"));
            }
            None => global || self.elements_qualified,
        };
        let namespace = if qualified { self.target.as_deref() } else { None };
        let name = QName::new(namespace, local);
        let type_ref = self.type_of(node)?;
        let (fixed, default) = self.value_constraint(node)?;
        let substitution_group = match node.attribute("substitutionGroup") {
            Some(head) if global => Some(self.qname(node, head)?),
            Some(_) => {
                return self.fail(
                    node,
                    "s4s-att-not-allowed: local elements cannot join a substitution group".into(),
                )
            }
            None => None,
        };
        for constraint in schema_children(node)
            .filter(|c| matches!(c.tag_name().name(), "unique" | "key" | "keyref"))
        {
            self.unenforced(
                constraint,
                format!(
                    "identity constraint '{}' on element '{name}' is not enforced",
                    constraint.tag_name().name()
                ),
            );
        }
        Ok(ElementDecl {
            name,
            type_ref,
            nillable: self.flag(node, "nillable")?,
            is_abstract: self.flag(node, "abstract")?,
            fixed,
            default,
            substitution_group,
            block: self.block(node)?,
            global,
        })
    }

    fn attribute_decl(&mut self, node: Node<'_, '_>, name: QName) -> Result<AttributeDecl> {
        let type_ref = self.type_of(node)?;
        let (fixed, default) = self.value_constraint(node)?;
        Ok(AttributeDecl {
            name,
            type_ref,
            fixed,
            default,
        })
    }

    fn attribute_use(&mut self, node: Node<'_, '_>) -> Result<AttributeUse> {
        let (required, prohibited) = match node.attribute("use") {
            None | Some("optional") => (false, false),
            Some("required") => (true, false),
            Some("prohibited") => (false, true),
            Some(other) => {
                return self.fail(node, format!("s4s-att-invalid-value: use '{other}'"));
            }
        };
        let (fixed, default) = self.value_constraint(node)?;
        if default.is_some() && required {
            return self.fail(
                node,
                "src-attribute.2: 'use' must be 'optional' when 'default' is present".into(),
            );
        }
        let target = match (node.attribute("ref"), node.attribute("name")) {
            (Some(reference), None) => AttributeTarget::Global(self.qname(node, reference)?),
            (None, Some(local)) => {
                let qualified = match node.attribute("form") {
                    Some("qualified") => true,
                    Some("unqualified") => false,
                    Some(other) => {
                        return self.fail(node, format!("s4s-att-invalid-value: form '{other}'"));
                    }
                    None => self.attributes_qualified,
                };
                let namespace = if qualified { self.target.as_deref() } else { None };
                let name = QName::new(namespace, local);
                let type_ref = self.type_of(node)?;
                return Ok(AttributeUse {
                    target: AttributeTarget::Local(AttributeDecl {
                        name,
                        type_ref,
                        fixed: None,
                        default: None,
                    }),
                    required,
                    prohibited,
                    fixed,
                    default,
                });
            }
            _ => {
                return self.fail(
                    node,
                    "src-attribute.3.1: exactly one of 'ref' and 'name' must be present".into(),
                )
            }
        };
        Ok(AttributeUse {
            target,
            required,
            prohibited,
            fixed,
            default,
        })
    }

    /// Collect attribute declarations, group references and the wildcard.
    fn attribute_set(&mut self, nodes: &[Node<'_, '_>]) -> Result<AttributeSet> {
        let mut set = AttributeSet::default();
        for &node in nodes {
            match node.tag_name().name() {
                "attribute" => {
                    let attribute_use = self.attribute_use(node)?;
                    set.uses.push(attribute_use);
                }
                "attributeGroup" => match node.attribute("ref") {
                    Some(reference) => set.groups.push(self.qname(node, reference)?),
                    None => {
                        return self.fail(
                            node,
                            "s4s-att-must-appear: attributeGroup reference needs 'ref'".into(),
                        )
                    }
                },
                "anyAttribute" if set.wildcard.is_none() => {
                    set.wildcard = Some(self.wildcard(node)?);
                }
                other => {
                    return self.fail(
                        node,
                        format!("s4s-elt-invalid-content.1: unexpected '{other}'"),
                    )
                }
            }
        }
        Ok(set)
    }

    fn wildcard(&self, node: Node<'_, '_>) -> Result<Wildcard> {
        let namespaces = match node.attribute("namespace").unwrap_or("##any").trim() {
            "##any" => NamespaceConstraint::Any,
            "##other" => NamespaceConstraint::Other(self.target.clone()),
            list => NamespaceConstraint::Set(
                list.split_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => self.target.clone(),
                        "##local" => None,
                        uri => Some(uri.to_owned()),
                    })
                    .collect(),
            ),
        };
        let process = match node.attribute("processContents") {
            None | Some("strict") => ProcessContents::Strict,
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            Some(other) => {
                return self.fail(node, format!("s4s-att-invalid-value: processContents '{other}'"));
            }
        };
        Ok(Wildcard {
            namespaces,
            process,
        })
    }

    /// A particle, or `None` when `maxOccurs` is zero.
    fn particle(&mut self, node: Node<'_, '_>) -> Result<Option<Particle>> {
        let (min, max) = self.occurs(node)?;
        let term = match node.tag_name().name() {
            "element" => match node.attribute("ref") {
                Some(reference) => {
                    if node.attribute("name").is_some() {
                        return self.fail(
                            node,
                            "src-element.2.1: 'ref' and 'name' are mutually exclusive".into(),
                        );
                    }
                    Term::ElementRef(self.qname(node, reference)?)
                }
                None => {
                    let decl = self.element_decl(node, false)?;
                    Term::Element(self.set.push_element(decl))
                }
            },
            "group" => match node.attribute("ref") {
                Some(reference) => Term::Group(self.qname(node, reference)?),
                None => {
                    return self.fail(node, "s4s-att-must-appear: group reference needs 'ref'".into())
                }
            },
            "any" => Term::Wildcard(self.wildcard(node)?),
            compositor @ ("sequence" | "choice" | "all") => {
                let mut particles = Vec::new();
                for child in schema_children(node) {
                    let allowed = match compositor {
                        "all" => child.has_tag_name((ns::XSD, "element")),
                        _ => matches!(
                            child.tag_name().name(),
                            "element" | "group" | "choice" | "sequence" | "any"
                        ),
                    };
                    if !allowed {
                        return self.fail(
                            child,
                            format!(
                                "s4s-elt-invalid-content.1: '{}' is not allowed in '{compositor}'",
                                child.tag_name().name()
                            ),
                        );
                    }
                    if let Some(p) = self.particle(child)? {
                        particles.push(p);
                    }
                }
                match compositor {
                    "sequence" => Term::Sequence(particles),
                    "choice" => Term::Choice(particles),
                    _ => {
                        if max != Some(1) || min > 1 {
                            return self.fail(
                                node,
                                "cos-all-limited.2: an all group must occur at most once".into(),
                            );
                        }
                        if particles.iter().any(|p| p.max != Some(1)) {
                            return self.fail(
                                node,
                                "cos-all-limited.2: all group members must occur at most once"
                                    .into(),
                            );
                        }
                        Term::All(particles)
                    }
                }
            }
            other => {
                return self.fail(node, format!("s4s-elt-invalid-content.1: unexpected '{other}'"))
            }
        };
        let particle = Particle { min, max, term };
        Ok((!particle.is_prohibited()).then_some(particle))
    }

    /// Split a body into an optional model group and attribute declarations.
    fn model_and_attributes(
        &mut self,
        nodes: &[Node<'_, '_>],
    ) -> Result<(Option<Particle>, AttributeSet)> {
        let (model, attributes) = match nodes.first() {
            Some(first)
                if matches!(
                    first.tag_name().name(),
                    "sequence" | "choice" | "all" | "group"
                ) =>
            {
                (self.particle(*first)?, &nodes[1..])
            }
            _ => (None, nodes),
        };
        Ok((model, self.attribute_set(attributes)?))
    }

    fn complex_type(&mut self, node: Node<'_, '_>, name: Option<QName>) -> Result<TypeId> {
        let mut mixed = self.flag(node, "mixed")?;
        let block = match node.attribute("block") {
            Some(value) => self.derivation_set(node, value)?,
            None => self.block_default,
        };
        let body: Vec<_> = schema_children(node).collect();
        let any_type = TypeRef::Named(QName::new(Some(ns::XSD), "anyType"));

        let (base, derivation, content, attributes) = match body.first() {
            Some(first) if first.has_tag_name((ns::XSD, "simpleContent")) => {
                let (derivation_node, base, derivation) = self.derivation(*first)?;
                let nodes: Vec<_> = schema_children(derivation_node).collect();
                match derivation {
                    Derivation::Extension => {
                        let attributes = self.attribute_set(&nodes)?;
                        let content = Content::Simple {
                            base: base.clone(),
                            facets: None,
                        };
                        (base, derivation, content, attributes)
                    }
                    Derivation::Restriction => {
                        let mut content_base = base.clone();
                        let mut rest = &nodes[..];
                        if let Some(inline) = nodes
                            .first()
                            .filter(|n| n.has_tag_name((ns::XSD, "simpleType")))
                        {
                            content_base = TypeRef::Local(self.simple_type(*inline, None)?);
                            rest = &nodes[1..];
                        }
                        let split = rest
                            .iter()
                            .position(|n| {
                                matches!(
                                    n.tag_name().name(),
                                    "attribute" | "attributeGroup" | "anyAttribute"
                                )
                            })
                            .unwrap_or(rest.len());
                        let facets = self.facets(&rest[..split])?;
                        let attributes = self.attribute_set(&rest[split..])?;
                        let content = Content::Simple {
                            base: content_base,
                            facets: Some(facets),
                        };
                        (base, derivation, content, attributes)
                    }
                }
            }
            Some(first) if first.has_tag_name((ns::XSD, "complexContent")) => {
                if first.attribute("mixed").is_some() {
                    mixed = self.flag(*first, "mixed")?;
                }
                let (derivation_node, base, derivation) = self.derivation(*first)?;
                let nodes: Vec<_> = schema_children(derivation_node).collect();
                let (model, attributes) = self.model_and_attributes(&nodes)?;
                let content = model.map_or(Content::Empty, Content::Elements);
                (base, derivation, content, attributes)
            }
            _ => {
                let (model, attributes) = self.model_and_attributes(&body)?;
                let content = model.map_or(Content::Empty, Content::Elements);
                (any_type, Derivation::Restriction, content, attributes)
            }
        };

        Ok(self.set.push_type(TypeDef::Complex(ComplexType {
            name,
            base: Some(base),
            derivation,
            is_abstract: self.flag(node, "abstract")?,
            mixed,
            content,
            attributes,
            block,
        })))
    }

    /// The `restriction` or `extension` child of a content element.
    fn derivation<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
    ) -> Result<(Node<'n, 'i>, TypeRef, Derivation)> {
        let mut children = schema_children(node);
        let (Some(child), None) = (children.next(), children.next()) else {
            return self.fail(
                node,
                format!(
                    "s4s-elt-invalid-content.2: '{}' needs one restriction or extension",
                    node.tag_name().name()
                ),
            );
        };
        let derivation = match child.tag_name().name() {
            "extension" => Derivation::Extension,
            "restriction" => Derivation::Restriction,
            other => {
                return self.fail(child, format!("s4s-elt-invalid-content.1: unexpected '{other}'"))
            }
        };
        let Some(base) = child.attribute("base") else {
            return self.fail(child, "s4s-att-must-appear: derivation needs a 'base'".into());
        };
        Ok((child, TypeRef::Named(self.qname(child, base)?), derivation))
    }

    fn simple_type(&mut self, node: Node<'_, '_>, name: Option<QName>) -> Result<TypeId> {
        let mut children = schema_children(node);
        let (Some(child), None) = (children.next(), children.next()) else {
            return self.fail(
                node,
                "s4s-elt-invalid-content.2: simpleType needs one restriction, list or union".into(),
            );
        };
        let variety = match child.tag_name().name() {
            "restriction" => {
                let nodes: Vec<_> = schema_children(child).collect();
                let (base, facet_nodes) = match (child.attribute("base"), nodes.first()) {
                    (Some(base), _) => (TypeRef::Named(self.qname(child, base)?), &nodes[..]),
                    (None, Some(inline)) if inline.has_tag_name((ns::XSD, "simpleType")) => {
                        (TypeRef::Local(self.simple_type(*inline, None)?), &nodes[1..])
                    }
                    _ => {
                        return self.fail(
                            child,
                            "src-simple-type.2: restriction needs a base type".into(),
                        )
                    }
                };
                SimpleVariety::Restriction {
                    base,
                    facets: self.facets(facet_nodes)?,
                }
            }
            "list" => {
                let inline = schema_children(child).next();
                let item = match (child.attribute("itemType"), inline) {
                    (Some(item), None) => TypeRef::Named(self.qname(child, item)?),
                    (None, Some(inline)) if inline.has_tag_name((ns::XSD, "simpleType")) => {
                        TypeRef::Local(self.simple_type(inline, None)?)
                    }
                    _ => {
                        return self.fail(
                            child,
                            "src-simple-type.3: list needs exactly one item type".into(),
                        )
                    }
                };
                SimpleVariety::List { item }
            }
            "union" => {
                let mut members = Vec::new();
                if let Some(list) = child.attribute("memberTypes") {
                    for member in list.split_whitespace() {
                        members.push(TypeRef::Named(self.qname(child, member)?));
                    }
                }
                for inline in schema_children(child) {
                    if !inline.has_tag_name((ns::XSD, "simpleType")) {
                        return self.fail(
                            inline,
                            "s4s-elt-invalid-content.1: union members must be simple types".into(),
                        );
                    }
                    members.push(TypeRef::Local(self.simple_type(inline, None)?));
                }
                if members.is_empty() {
                    return self.fail(child, "src-union-memberTypes-or-simpleTypes".into());
                }
                SimpleVariety::Union { members }
            }
            other => {
                return self.fail(child, format!("s4s-elt-invalid-content.1: unexpected '{other}'"))
            }
        };
        Ok(self
            .set
            .push_type(TypeDef::Simple(SimpleType { name, variety })))
    }

    fn facets(&self, nodes: &[Node<'_, '_>]) -> Result<Facets> {
        let mut facets = Facets::default();
        for &node in nodes {
            let facet = node.tag_name().name();
            let Some(value) = node.attribute("value") else {
                return self.fail(node, format!("s4s-att-must-appear: '{facet}' needs a value"));
            };
            let size = |v: &str| -> Result<usize> {
                match v.trim().parse() {
                    Ok(n) => Ok(n),
                    Err(_) => self.fail(node, format!("'{v}' is not a valid {facet}")),
                }
            };
            match facet {
                "enumeration" => facets.enumeration.push(value.to_owned()),
                "length" => facets.length = Some(size(value)?),
                "minLength" => facets.min_length = Some(size(value)?),
                "maxLength" => facets.max_length = Some(size(value)?),
                "minInclusive" => facets.min_inclusive = Some(value.trim().to_owned()),
                "maxInclusive" => facets.max_inclusive = Some(value.trim().to_owned()),
                "minExclusive" => facets.min_exclusive = Some(value.trim().to_owned()),
                "maxExclusive" => facets.max_exclusive = Some(value.trim().to_owned()),
                "totalDigits" => facets.total_digits = Some(size(value)? as u32),
                "fractionDigits" => facets.fraction_digits = Some(size(value)? as u32),
                "whiteSpace" => match WhiteSpace::parse(value.trim()) {
                    Some(ws) => facets.white_space = Some(ws),
                    None => return self.fail(node, format!("invalid whiteSpace '{value}'")),
                },
                "pattern" => {
                    self.unenforced(node, format!("pattern facet '{value}' is not enforced"));
                }
                other => {
                    return self.fail(node, format!("s4s-elt-invalid-content.1: unknown facet '{other}'"))
                }
            }
        }
        Ok(facets)
    }
}
