#![forbid(unsafe_code)]

//! Instance validation.

use std::borrow::Cow;
use std::collections::HashSet;

use roxmltree::{Document, Node, TextPos};
use ulriksdal_core::{ns, Error, Result};

use super::datatypes::{check_facets, Builtin, ValueKind, WhiteSpace};
use super::loader::LoadMode;
use super::model::{
    AttributeSet, AttributeTarget, Content, Derivation, DerivationSet, ElementDecl, ElementId,
    NamespaceConstraint, ProcessContents, QName, SimpleVariety, TypeDef, TypeId, TypeRef,
    Wildcard,
};
use super::particle::{Automaton, Leaf, Outcome};
use super::{SchemaSet, Session};
use crate::catalog::is_uri_conformant;
use crate::diagnostics::Diagnostic;

const MAX_TYPE_DEPTH: usize = 64;

type Validity = std::result::Result<String, String>;

/// An attribute use with its declaration resolved.
#[derive(Debug, Clone)]
struct ResolvedUse {
    name: QName,
    type_ref: Option<TypeRef>,
    required: bool,
    prohibited: bool,
    fixed: Option<String>,
}

/// What a type allows between an element's tags.
enum Shape {
    /// A simple type: character data only, no attributes.
    Simple,
    Empty,
    SimpleContent,
    Elements(Automaton),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    Id,
    IdRef,
    IdRefs,
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|c| c.text())
        .collect()
}

fn has_character_data(node: Node<'_, '_>) -> bool {
    node.children()
        .filter(Node::is_text)
        .filter_map(|c| c.text())
        .any(|t| !t.chars().all(is_xml_space))
}

fn position(node: Node<'_, '_>) -> TextPos {
    node.document().text_pos_at(node.range().start)
}

impl SchemaSet {
    fn shape(&self, id: TypeId) -> Result<Shape> {
        let mut chain = Vec::new();
        let mut current = id;
        for _ in 0..MAX_TYPE_DEPTH {
            let TypeDef::Complex(ct) = self.type_def(current)? else {
                return Ok(if current == id {
                    Shape::Simple
                } else {
                    Shape::SimpleContent
                });
            };
            match (&ct.content, ct.derivation) {
                (Content::Simple { .. }, _) if chain.is_empty() => return Ok(Shape::SimpleContent),
                (Content::Simple { .. }, _) => {
                    return Err(Error::Parse(format!(
                        "cos-ct-extends.1.4: element content cannot extend simple content of '{}'",
                        ct.name.as_ref().map(ToString::to_string).unwrap_or_default()
                    )))
                }
                (Content::Elements(particle), Derivation::Restriction) => {
                    chain.push(particle);
                    break;
                }
                (Content::Empty, Derivation::Restriction) => break,
                (content, Derivation::Extension) => {
                    if let Content::Elements(particle) = content {
                        chain.push(particle);
                    }
                    match &ct.base {
                        Some(base) => current = self.resolve_type(base)?,
                        None => break,
                    }
                }
            }
        }
        if chain.is_empty() {
            return Ok(Shape::Empty);
        }
        chain.reverse();
        Ok(Shape::Elements(Automaton::compile(self, &chain)?))
    }

    fn attribute_uses(
        &self,
        id: TypeId,
        depth: usize,
    ) -> Result<(Vec<ResolvedUse>, Option<Wildcard>)> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Parse("type derivation nests too deeply".into()));
        }
        let TypeDef::Complex(ct) = self.type_def(id)? else {
            return Ok((Vec::new(), None));
        };
        let (mut uses, base_wildcard) = match &ct.base {
            Some(base) => self.attribute_uses(self.resolve_type(base)?, depth + 1)?,
            None => (Vec::new(), None),
        };
        let mut own = Vec::new();
        let mut wildcard = None;
        self.expand_attributes(&ct.attributes, &mut own, &mut wildcard, 0)?;
        for attribute in own {
            uses.retain(|u| u.name != attribute.name);
            if !attribute.prohibited {
                uses.push(attribute);
            }
        }
        let wildcard = match (ct.derivation, wildcard, base_wildcard) {
            (Derivation::Restriction, own, _) => own,
            (Derivation::Extension, Some(own), Some(base)) => {
                if base.namespaces == NamespaceConstraint::Any {
                    Some(Wildcard {
                        namespaces: NamespaceConstraint::Any,
                        process: own.process,
                    })
                } else {
                    Some(own)
                }
            }
            (Derivation::Extension, own, base) => own.or(base),
        };
        Ok((uses, wildcard))
    }

    fn expand_attributes(
        &self,
        set: &AttributeSet,
        out: &mut Vec<ResolvedUse>,
        wildcard: &mut Option<Wildcard>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Parse("attribute groups nest too deeply".into()));
        }
        for attribute in &set.uses {
            let resolved = match &attribute.target {
                AttributeTarget::Local(decl) => ResolvedUse {
                    name: decl.name.clone(),
                    type_ref: decl.type_ref.clone(),
                    required: attribute.required,
                    prohibited: attribute.prohibited,
                    fixed: attribute.fixed.clone(),
                },
                AttributeTarget::Global(name) => {
                    let decl = self.attributes.get(name).ok_or_else(|| {
                        Error::Parse(format!("src-resolve: cannot resolve attribute '{name}'"))
                    })?;
                    ResolvedUse {
                        name: name.clone(),
                        type_ref: decl.type_ref.clone(),
                        required: attribute.required,
                        prohibited: attribute.prohibited,
                        fixed: attribute.fixed.clone().or_else(|| decl.fixed.clone()),
                    }
                }
            };
            out.push(resolved);
        }
        for group in &set.groups {
            let group = self.attribute_groups.get(group).ok_or_else(|| {
                Error::Parse(format!("src-resolve: cannot resolve attribute group '{group}'"))
            })?;
            self.expand_attributes(group, out, wildcard, depth + 1)?;
        }
        if set.wildcard.is_some() {
            *wildcard = set.wildcard.clone();
        }
        Ok(())
    }

    fn any_simple_type(&self) -> Result<TypeId> {
        self.resolve_type(&TypeRef::Named(QName::new(
            Some(ns::XSD),
            Builtin::AnySimpleType.name(),
        )))
    }

    fn value_kind(&self, id: TypeId, depth: usize) -> Result<ValueKind> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Parse("type derivation nests too deeply".into()));
        }
        match self.type_def(id)? {
            TypeDef::Simple(st) => match &st.variety {
                SimpleVariety::Builtin(b) => Ok(ValueKind::Atomic(*b)),
                SimpleVariety::Restriction { base, .. } => {
                    self.value_kind(self.resolve_type(base)?, depth + 1)
                }
                SimpleVariety::List { .. } => Ok(ValueKind::List),
                SimpleVariety::Union { .. } => Ok(ValueKind::Union),
            },
            TypeDef::Complex(ct) => match &ct.content {
                Content::Simple { base, .. } => self.value_kind(self.resolve_type(base)?, depth + 1),
                _ => match &ct.base {
                    Some(base) => self.value_kind(self.resolve_type(base)?, depth + 1),
                    None => Ok(ValueKind::Atomic(Builtin::AnySimpleType)),
                },
            },
        }
    }

    fn id_kind(&self, id: TypeId, depth: usize) -> Result<Option<IdKind>> {
        if depth > MAX_TYPE_DEPTH {
            return Ok(None);
        }
        Ok(match self.type_def(id)? {
            TypeDef::Simple(st) => match &st.variety {
                SimpleVariety::Builtin(b) if b.derives_from(Builtin::Id) => Some(IdKind::Id),
                SimpleVariety::Builtin(b) if b.derives_from(Builtin::IdRef) => Some(IdKind::IdRef),
                SimpleVariety::Builtin(b) if b.derives_from(Builtin::IdRefs) => {
                    Some(IdKind::IdRefs)
                }
                SimpleVariety::Builtin(_) | SimpleVariety::Union { .. } => None,
                SimpleVariety::Restriction { base, .. } => {
                    self.id_kind(self.resolve_type(base)?, depth + 1)?
                }
                SimpleVariety::List { item } => {
                    match self.id_kind(self.resolve_type(item)?, depth + 1)? {
                        Some(IdKind::IdRef) => Some(IdKind::IdRefs),
                        _ => None,
                    }
                }
            },
            TypeDef::Complex(ct) => match &ct.content {
                Content::Simple { base, .. } => self.id_kind(self.resolve_type(base)?, depth + 1)?,
                _ => None,
            },
        })
    }

    /// Normalize and check a value against a simple type. The outer error
    /// is an engine failure, the inner one a validity failure.
    fn check_simple(
        &self,
        id: TypeId,
        raw: &str,
        prefix_bound: &dyn Fn(&str) -> bool,
        depth: usize,
    ) -> Result<Validity> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Parse("simple type derivation nests too deeply".into()));
        }
        let TypeDef::Simple(st) = self.type_def(id)? else {
            return self.check_content(id, raw, prefix_bound, depth);
        };
        match &st.variety {
            SimpleVariety::Builtin(b) => {
                let value = b.white_space().apply(raw);
                Ok(b.validate(&value, prefix_bound).map(|()| value.into_owned()))
            }
            SimpleVariety::Restriction { base, facets } => {
                let base = self.resolve_type(base)?;
                let normalized = match facets.white_space {
                    Some(ws) => ws.apply(raw),
                    None => Cow::Borrowed(raw),
                };
                let value = match self.check_simple(base, &normalized, prefix_bound, depth + 1)? {
                    Ok(value) => value,
                    Err(message) => return Ok(Err(message)),
                };
                let kind = self.value_kind(base, 0)?;
                Ok(check_facets(facets, kind, &value).map(|()| value))
            }
            SimpleVariety::List { item } => {
                let item = self.resolve_type(item)?;
                let value = WhiteSpace::Collapse.apply(raw).into_owned();
                for token in value.split(' ').filter(|t| !t.is_empty()) {
                    if let Err(message) = self.check_simple(item, token, prefix_bound, depth + 1)? {
                        return Ok(Err(message));
                    }
                }
                Ok(Ok(value))
            }
            SimpleVariety::Union { members } => {
                for member in members {
                    let member = self.resolve_type(member)?;
                    if let Ok(value) = self.check_simple(member, raw, prefix_bound, depth + 1)? {
                        return Ok(Ok(value));
                    }
                }
                Ok(Err(format!(
                    "'{raw}' is not valid with respect to any member type of the union"
                )))
            }
        }
    }

    /// Check the character content of a complex type with simple content.
    fn check_content(
        &self,
        id: TypeId,
        raw: &str,
        prefix_bound: &dyn Fn(&str) -> bool,
        depth: usize,
    ) -> Result<Validity> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Parse("type derivation nests too deeply".into()));
        }
        let TypeDef::Complex(ct) = self.type_def(id)? else {
            return self.check_simple(id, raw, prefix_bound, depth);
        };
        match (&ct.content, &ct.base) {
            (Content::Simple { base, facets }, _) => {
                let base = self.resolve_type(base)?;
                let value = match self.check_simple(base, raw, prefix_bound, depth + 1)? {
                    Ok(value) => value,
                    Err(message) => return Ok(Err(message)),
                };
                let Some(facets) = facets else {
                    return Ok(Ok(value));
                };
                let value = match facets.white_space {
                    Some(ws) => ws.apply(&value).into_owned(),
                    None => value,
                };
                let kind = self.value_kind(base, 0)?;
                Ok(check_facets(facets, kind, &value).map(|()| value))
            }
            (_, Some(base)) if ct.derivation == Derivation::Extension => {
                self.check_content(self.resolve_type(base)?, raw, prefix_bound, depth + 1)
            }
            _ => Ok(Ok(raw.to_owned())),
        }
    }
}

/// One validation run over one instance document.
pub(super) struct Validation<'v, 'a> {
    set: &'v mut SchemaSet,
    session: &'v Session<'a>,
    system_id: &'v str,
    ids: HashSet<String>,
    idrefs: Vec<(String, TextPos)>,
}

impl<'v, 'a> Validation<'v, 'a> {
    pub(super) fn new(set: &'v mut SchemaSet, session: &'v Session<'a>, system_id: &'v str) -> Self {
        Self {
            set,
            session,
            system_id,
            ids: HashSet::new(),
            idrefs: Vec::new(),
        }
    }

    fn diagnostic(&self, node: Node<'_, '_>, message: String) -> Diagnostic {
        Diagnostic::error(message)
            .in_resource(self.system_id)
            .at(position(node))
    }

    /// Report a validity error; processing goes on if the handler allows.
    fn error(&self, node: Node<'_, '_>, message: String) -> Result<()> {
        self.session.report(self.diagnostic(node, message))
    }

    fn fail<T>(&self, node: Node<'_, '_>, message: String) -> Result<T> {
        self.session.fail(self.diagnostic(node, message))
    }

    pub(super) fn document(mut self, doc: &Document<'_>) -> Result<()> {
        let root = doc.root_element();
        self.hints(root)?;
        let name = QName::of(root);
        self.set
            .load_namespace(name.namespace.as_deref(), self.session)?;
        let Some(&id) = self.set.element_names.get(&name) else {
            return self.fail(
                root,
                format!(
                    "cvc-elt.1.a: Cannot find the declaration of element '{}'.",
                    root.tag_name().name()
                ),
            );
        };
        self.element(root, id)?;
        if self.session.features.id_idref_checking {
            for (value, pos) in std::mem::take(&mut self.idrefs) {
                if !self.ids.contains(&value) {
                    self.session.report(
                        Diagnostic::error(format!(
                            "cvc-id.1: There is no ID/IDREF binding for IDREF '{value}'."
                        ))
                        .in_resource(self.system_id)
                        .at(pos),
                    )?;
                }
            }
        }
        tracing::debug!(system_id = self.system_id, ids = self.ids.len(), "document is schema valid");
        Ok(())
    }

    /// Load schemas named by `xsi:schemaLocation` hints, via the resolver only.
    fn hints(&mut self, node: Node<'_, '_>) -> Result<()> {
        if let Some(value) = node.attribute((ns::XSI, "schemaLocation")) {
            let tokens: Vec<&str> = value.split_whitespace().collect();
            if tokens.len() % 2 != 0 {
                self.error(
                    node,
                    format!(
                        "SchemaLocation: schemaLocation value = '{value}' must have even number \
                         of URI's."
                    ),
                )?;
            }
            for pair in tokens.chunks_exact(2) {
                self.hint(node, Some(pair[0]), pair[1])?;
            }
        }
        if let Some(location) = node.attribute((ns::XSI, "noNamespaceSchemaLocation")) {
            self.hint(node, None, location.trim())?;
        }
        Ok(())
    }

    fn hint(&mut self, node: Node<'_, '_>, namespace: Option<&str>, location: &str) -> Result<()> {
        if self.set.has_namespace(namespace) {
            tracing::debug!(location, "schema location hint for a loaded namespace ignored");
            return Ok(());
        }
        if self.session.features.uri_conformant && !is_uri_conformant(location) {
            return self.fail(node, format!("'{location}' is not a valid URI reference"));
        }
        let resource = self.session.resolver.resolve(None, location)?;
        self.set.load_document(
            resource,
            LoadMode::Import(namespace.map(str::to_owned)),
            self.session,
        )?;
        self.set.check_references(self.session)
    }

    fn element(&mut self, node: Node<'_, '_>, id: ElementId) -> Result<()> {
        self.hints(node)?;
        let decl = self.set.element_decl(id)?.clone();
        if decl.is_abstract {
            return self.error(
                node,
                format!(
                    "cvc-elt.2: The value of {{abstract}} in the element declaration for '{}' \
                     must be false.",
                    decl.name.local
                ),
            );
        }
        let declared = self.set.element_type(&decl)?;
        let actual = match node.attribute((ns::XSI, "type")) {
            Some(value) => match self.xsi_type(node, value, declared, decl.block)? {
                Some(actual) => actual,
                None => return Ok(()),
            },
            None => declared,
        };
        if let Some(nil) = node.attribute((ns::XSI, "nil")) {
            match nil.trim() {
                "true" | "1" => return self.nilled(node, actual, &decl),
                "false" | "0" => {}
                other => {
                    self.error(
                        node,
                        format!("cvc-datatype-valid.1.2.1: '{other}' is not a valid value for 'boolean'."),
                    )?;
                }
            }
        }
        self.typed(node, actual, Some(&decl))
    }

    fn nilled(&mut self, node: Node<'_, '_>, actual: TypeId, decl: &ElementDecl) -> Result<()> {
        if !decl.nillable {
            return self.error(
                node,
                format!(
                    "cvc-elt.3.1: Attribute 'xsi:nil' must not appear on element '{}', because \
                     the {{nillable}} property of '{}' is false.",
                    decl.name.local, decl.name.local
                ),
            );
        }
        if has_character_data(node) || node.children().any(|c| c.is_element()) {
            self.error(
                node,
                format!(
                    "cvc-elt.3.2.1: Element '{}' cannot have character or element information \
                     [children], because 'xsi:nil' is specified.",
                    decl.name.local
                ),
            )?;
        }
        if decl.fixed.is_some() {
            self.error(
                node,
                format!(
                    "cvc-elt.3.2.2: There must be no fixed {{value constraint}} for element '{}', \
                     because 'xsi:nil' is specified.",
                    decl.name.local
                ),
            )?;
        }
        if matches!(self.set.type_def(actual)?, TypeDef::Complex(_)) {
            self.attributes(node, actual)?;
        }
        Ok(())
    }

    /// Resolve an `xsi:type` override and check it may replace `declared`.
    fn xsi_type(
        &mut self,
        node: Node<'_, '_>,
        value: &str,
        declared: TypeId,
        block: DerivationSet,
    ) -> Result<Option<TypeId>> {
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
                    self.error(
                        node,
                        format!("cvc-elt.4.1: The value '{value}' of attribute 'xsi:type' is not a valid QName."),
                    )?;
                    return Ok(None);
                }
            },
            None => node.lookup_namespace_uri(None),
        };
        let name = QName::new(namespace, local);
        self.set
            .load_namespace(name.namespace.as_deref(), self.session)?;
        let Some(&actual) = self.set.type_names.get(&name) else {
            self.error(
                node,
                format!(
                    "cvc-elt.4.2: Cannot resolve '{value}' to a type definition for element '{}'.",
                    node.tag_name().name()
                ),
            )?;
            return Ok(None);
        };
        let type_block = match self.set.type_def(declared)? {
            TypeDef::Complex(ct) => ct.block,
            TypeDef::Simple(_) => DerivationSet::default(),
        };
        if !self
            .set
            .derives_from(actual, declared, block.union(type_block))?
        {
            self.error(
                node,
                format!(
                    "cvc-elt.4.3: Type '{name}' is not validly derived from the type definition \
                     of element '{}'.",
                    node.tag_name().name()
                ),
            )?;
            return Ok(None);
        }
        Ok(Some(actual))
    }

    fn typed(
        &mut self,
        node: Node<'_, '_>,
        id: TypeId,
        decl: Option<&ElementDecl>,
    ) -> Result<()> {
        let local = node.tag_name().name();
        let (is_abstract, mixed) = match self.set.type_def(id)? {
            TypeDef::Complex(ct) => (ct.is_abstract, ct.mixed),
            TypeDef::Simple(_) => (false, false),
        };
        if is_abstract {
            return self.error(
                node,
                format!("cvc-type.2: The type definition cannot be abstract for element {local}."),
            );
        }
        let shape = match self.set.shape(id) {
            Ok(shape) => shape,
            Err(e) => return self.fail(node, e.to_string()),
        };
        match shape {
            Shape::Simple => {
                for attribute in node.attributes() {
                    let allowed = attribute.namespace() == Some(ns::XSI)
                        && matches!(
                            attribute.name(),
                            "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
                        );
                    if !allowed {
                        self.error(
                            node,
                            format!(
                                "cvc-type.3.1.1: Element '{local}' is a simple type, so it cannot \
                                 have attributes. However, the attribute '{}' was found.",
                                attribute.name()
                            ),
                        )?;
                    }
                }
                if node.children().any(|c| c.is_element()) {
                    return self.error(
                        node,
                        format!(
                            "cvc-type.3.1.2: Element '{local}' is a simple type, so it must have \
                             no element information item [children]."
                        ),
                    );
                }
                self.text_value(node, id, decl)
            }
            Shape::Empty => {
                self.attributes(node, id)?;
                let stray_text = !mixed && has_character_data(node);
                if stray_text || node.children().any(|c| c.is_element()) {
                    self.error(
                        node,
                        format!(
                            "cvc-complex-type.2.1: Element '{local}' must have no character or \
                             element information item [children], because the type's content \
                             type is empty."
                        ),
                    )?;
                }
                Ok(())
            }
            Shape::SimpleContent => {
                self.attributes(node, id)?;
                if node.children().any(|c| c.is_element()) {
                    return self.error(
                        node,
                        format!(
                            "cvc-complex-type.2.2: Element '{local}' must have no element \
                             [children], and the value must be valid."
                        ),
                    );
                }
                self.text_value(node, id, decl)
            }
            Shape::Elements(automaton) => {
                self.attributes(node, id)?;
                if !mixed && has_character_data(node) {
                    self.error(
                        node,
                        format!(
                            "cvc-complex-type.2.3: Element '{local}' cannot have character \
                             [children], because the type's content type is element-only."
                        ),
                    )?;
                }
                self.element_content(node, &automaton)
            }
        }
    }

    fn element_content(&mut self, node: Node<'_, '_>, automaton: &Automaton) -> Result<()> {
        let local = node.tag_name().name();
        let children: Vec<Node<'_, '_>> = node.children().filter(Node::is_element).collect();
        let names: Vec<QName> = children.iter().map(|c| QName::of(*c)).collect();
        let set = &*self.set;
        let outcome = automaton.run(
            &names,
            self.session.limits.max_content_model_steps,
            |leaf, name| match leaf {
                Leaf::Element(head) => Ok(set.substitute(*head, name)?.is_some()),
                Leaf::Wildcard(w) => Ok(w.allows(name.namespace.as_deref())),
            },
        );
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(node, e.to_string()),
        };
        match outcome {
            Outcome::Matched(leaves) => {
                for (child, leaf) in children.into_iter().zip(leaves) {
                    self.child(child, leaf)?;
                }
                Ok(())
            }
            Outcome::Unexpected { index, expected } => {
                let child = children[index];
                let message = if expected.is_empty() {
                    format!(
                        "cvc-complex-type.2.4.d: Invalid content was found starting with element \
                         '{}'. No child element is expected at this point.",
                        names[index]
                    )
                } else {
                    format!(
                        "cvc-complex-type.2.4.a: Invalid content was found starting with element \
                         '{}'. One of '{}' is expected.",
                        names[index],
                        expected.join(", ")
                    )
                };
                self.error(child, message)
            }
            Outcome::Incomplete { expected } => self.error(
                node,
                format!(
                    "cvc-complex-type.2.4.b: The content of element '{local}' is not complete. \
                     One of '{}' is expected.",
                    expected.join(", ")
                ),
            ),
        }
    }

    fn child(&mut self, node: Node<'_, '_>, leaf: Leaf) -> Result<()> {
        match leaf {
            Leaf::Element(head) => match self.set.substitute(head, &QName::of(node))? {
                Some(id) => self.element(node, id),
                None => self.fail(
                    node,
                    format!("no declaration matched element '{}'", QName::of(node)),
                ),
            },
            Leaf::Wildcard(wildcard) => self.wildcard_element(node, wildcard.process),
        }
    }

    fn wildcard_element(&mut self, node: Node<'_, '_>, process: ProcessContents) -> Result<()> {
        if process == ProcessContents::Skip {
            return Ok(());
        }
        self.hints(node)?;
        let name = QName::of(node);
        self.set
            .load_namespace(name.namespace.as_deref(), self.session)?;
        if let Some(&id) = self.set.element_names.get(&name) {
            return self.element(node, id);
        }
        if process == ProcessContents::Strict {
            return self.error(
                node,
                format!(
                    "cvc-complex-type.2.4.c: The matching wildcard is strict, but no declaration \
                     can be found for element '{}'.",
                    node.tag_name().name()
                ),
            );
        }
        if let Some(value) = node.attribute((ns::XSI, "type")) {
            let any_type = self.set.any_type();
            return match self.xsi_type(node, value, any_type, DerivationSet::default())? {
                Some(actual) => self.typed(node, actual, None),
                None => Ok(()),
            };
        }
        for attribute in node.attributes() {
            let name = QName::new(attribute.namespace(), attribute.name());
            if name.namespace.as_deref() == Some(ns::XSI) {
                continue;
            }
            self.set
                .load_namespace(name.namespace.as_deref(), self.session)?;
            if let Some(decl) = self.set.attributes.get(&name).cloned() {
                self.attribute_value(
                    node,
                    &name,
                    decl.type_ref.as_ref(),
                    attribute.value(),
                    decl.fixed.as_deref(),
                )?;
            }
        }
        for child in node.children().filter(Node::is_element) {
            self.wildcard_element(child, ProcessContents::Lax)?;
        }
        Ok(())
    }

    fn attributes(&mut self, node: Node<'_, '_>, id: TypeId) -> Result<()> {
        let local = node.tag_name().name();
        let (uses, wildcard) = match self.set.attribute_uses(id, 0) {
            Ok(found) => found,
            Err(e) => return self.fail(node, e.to_string()),
        };
        let mut seen = vec![false; uses.len()];
        for attribute in node.attributes() {
            let name = QName::new(attribute.namespace(), attribute.name());
            if name.namespace.as_deref() == Some(ns::XSI) {
                if !matches!(
                    attribute.name(),
                    "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
                ) {
                    self.error(
                        node,
                        format!(
                            "cvc-complex-type.3.2.2: Attribute 'xsi:{}' is not allowed to appear \
                             in element '{local}'.",
                            attribute.name()
                        ),
                    )?;
                }
                continue;
            }
            if let Some(index) = uses.iter().position(|u| u.name == name) {
                seen[index] = true;
                let attribute_use = &uses[index];
                self.attribute_value(
                    node,
                    &name,
                    attribute_use.type_ref.as_ref(),
                    attribute.value(),
                    attribute_use.fixed.as_deref(),
                )?;
                continue;
            }
            let allowed = wildcard
                .as_ref()
                .filter(|w| w.allows(name.namespace.as_deref()));
            let Some(wildcard) = allowed else {
                self.error(
                    node,
                    format!(
                        "cvc-complex-type.3.2.2: Attribute '{}' is not allowed to appear in \
                         element '{local}'.",
                        attribute.name()
                    ),
                )?;
                continue;
            };
            if wildcard.process == ProcessContents::Skip {
                continue;
            }
            self.set
                .load_namespace(name.namespace.as_deref(), self.session)?;
            match self.set.attributes.get(&name).cloned() {
                Some(decl) => self.attribute_value(
                    node,
                    &name,
                    decl.type_ref.as_ref(),
                    attribute.value(),
                    decl.fixed.as_deref(),
                )?,
                None if wildcard.process == ProcessContents::Strict => self.error(
                    node,
                    format!(
                        "cvc-complex-type.3.2.2: Attribute '{}' is not allowed to appear in \
                         element '{local}'.",
                        attribute.name()
                    ),
                )?,
                None => {}
            }
        }
        for (attribute_use, seen) in uses.iter().zip(seen) {
            if attribute_use.required && !seen {
                self.error(
                    node,
                    format!(
                        "cvc-complex-type.4: Attribute '{}' must appear on element '{local}'.",
                        attribute_use.name.local
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn attribute_value(
        &mut self,
        node: Node<'_, '_>,
        name: &QName,
        type_ref: Option<&TypeRef>,
        raw: &str,
        fixed: Option<&str>,
    ) -> Result<()> {
        let id = match type_ref {
            Some(type_ref) => self.set.resolve_type(type_ref)?,
            None => self.set.any_simple_type()?,
        };
        let prefix_bound = |p: &str| p == "xml" || node.lookup_namespace_uri(Some(p)).is_some();
        match self.set.check_simple(id, raw, &prefix_bound, 0)? {
            Ok(value) => {
                if let Some(fixed) = fixed {
                    let expected = self
                        .set
                        .check_simple(id, fixed, &prefix_bound, 0)?
                        .unwrap_or_else(|_| fixed.to_owned());
                    if value != expected {
                        self.error(
                            node,
                            format!(
                                "cvc-attribute.4: The value '{raw}' of attribute '{}' on element \
                                 '{}' is not valid with respect to its fixed {{value constraint}}. \
                                 The attribute must have a value of '{fixed}'.",
                                name.local,
                                node.tag_name().name()
                            ),
                        )?;
                    }
                }
                self.record_id(node, id, &value)
            }
            Err(message) => self.error(
                node,
                format!(
                    "cvc-attribute.3: The value '{raw}' of attribute '{}' on element '{}' is not \
                     valid with respect to its type. {message}",
                    name.local,
                    node.tag_name().name()
                ),
            ),
        }
    }

    fn text_value(
        &mut self,
        node: Node<'_, '_>,
        id: TypeId,
        decl: Option<&ElementDecl>,
    ) -> Result<()> {
        let mut raw = text_of(node);
        if raw.is_empty() {
            if let Some(constraint) = decl.and_then(|d| d.default.as_ref().or(d.fixed.as_ref())) {
                raw = constraint.clone();
            }
        }
        let prefix_bound = |p: &str| p == "xml" || node.lookup_namespace_uri(Some(p)).is_some();
        match self.set.check_content(id, &raw, &prefix_bound, 0)? {
            Ok(value) => {
                if let Some(fixed) = decl.and_then(|d| d.fixed.as_deref()) {
                    let expected = self
                        .set
                        .check_content(id, fixed, &prefix_bound, 0)?
                        .unwrap_or_else(|_| fixed.to_owned());
                    if value != expected {
                        self.error(
                            node,
                            format!(
                                "cvc-elt.5.2.2.2.2: The value '{raw}' of element '{}' does not \
                                 match the {{value constraint}} value '{fixed}'.",
                                node.tag_name().name()
                            ),
                        )?;
                    }
                }
                self.record_id(node, id, &value)
            }
            Err(message) => self.error(
                node,
                format!(
                    "cvc-type.3.1.3: The value '{raw}' of element '{}' is not valid. {message}",
                    node.tag_name().name()
                ),
            ),
        }
    }

    fn record_id(&mut self, node: Node<'_, '_>, id: TypeId, value: &str) -> Result<()> {
        if !self.session.features.id_idref_checking {
            return Ok(());
        }
        match self.set.id_kind(id, 0)? {
            Some(IdKind::Id) => {
                if !self.ids.insert(value.to_owned()) {
                    self.error(
                        node,
                        format!("cvc-id.2: There are multiple occurrences of ID value '{value}'."),
                    )?;
                }
            }
            Some(IdKind::IdRef) => self.idrefs.push((value.to_owned(), position(node))),
            Some(IdKind::IdRefs) => {
                let pos = position(node);
                self.idrefs
                    .extend(value.split(' ').filter(|t| !t.is_empty()).map(|t| (t.to_owned(), pos)));
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ulriksdal_core::Result;
    use ulriksdal_xml::ParserLimits;

    use super::*;
    use crate::catalog::{EntityResolver, SchemaCatalog};
    use crate::diagnostics::{ErrorHandler, FailClosed};
    use crate::features::Features;
    use crate::resource::Resource;

    const ORDER_XSD: &str = r###"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:o="urn:example:order"
           targetNamespace="urn:example:order"
           elementFormDefault="qualified">
  <xs:simpleType name="Quantity">
    <xs:restriction base="xs:int">
      <xs:minInclusive value="1"/>
      <xs:maxInclusive value="99"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="Line">
    <xs:simpleContent>
      <xs:extension base="xs:string">
        <xs:attribute name="qty" type="o:Quantity" use="required"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:complexType name="Order">
    <xs:sequence>
      <xs:element name="Line" type="o:Line" maxOccurs="unbounded"/>
      <xs:element name="Note" type="xs:string" minOccurs="0"/>
      <xs:element name="Ref" type="xs:IDREF" minOccurs="0"/>
      <xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:ID" use="required"/>
    <xs:attribute name="currency" type="xs:string" fixed="EUR"/>
  </xs:complexType>
  <xs:complexType name="RushOrder">
    <xs:complexContent>
      <xs:extension base="o:Order">
        <xs:sequence>
          <xs:element name="Deadline" type="xs:date"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="Order" type="o:Order"/>
</xs:schema>"###;

    /// Collects diagnostics instead of stopping.
    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl ErrorHandler for Collect {
        fn report(&self, diagnostic: Diagnostic) -> Result<()> {
            self.0.lock().unwrap().push(diagnostic.to_string());
            Ok(())
        }
    }

    /// Serves the order schema and defers everything else to the catalog.
    struct OrderResolver(SchemaCatalog);

    impl EntityResolver for OrderResolver {
        fn resolve(&self, public_id: Option<&str>, system_id: &str) -> Result<Resource> {
            if system_id == "urn:example:order" || system_id == "order.xsd" {
                return Ok(Resource::new(system_id, "order.xsd", ORDER_XSD.as_bytes()));
            }
            self.0.resolve(public_id, system_id)
        }
    }

    fn check(xml: &str) -> Result<()> {
        let resolver = OrderResolver(SchemaCatalog::default());
        let features = Features::default();
        let limits = ParserLimits::default();
        let session = Session {
            resolver: &resolver,
            handler: &FailClosed,
            features: &features,
            limits: &limits,
        };
        let initial = Resource::new("order.xsd", "order.xsd", ORDER_XSD.as_bytes());
        let mut set = SchemaSet::compile(initial, &session)?;
        let doc = roxmltree::Document::parse(xml).unwrap();
        set.validate(&doc, "test.xml", &session)
    }

    fn errors(xml: &str) -> Vec<String> {
        let resolver = OrderResolver(SchemaCatalog::default());
        let features = Features::default();
        let limits = ParserLimits::default();
        let handler = Collect::default();
        let session = Session {
            resolver: &resolver,
            handler: &handler,
            features: &features,
            limits: &limits,
        };
        let initial = Resource::new("order.xsd", "order.xsd", ORDER_XSD.as_bytes());
        let mut set = SchemaSet::compile(initial, &session).unwrap();
        let doc = roxmltree::Document::parse(xml).unwrap();
        set.validate(&doc, "test.xml", &session).unwrap();
        let collected = handler.0.lock().unwrap().clone();
        collected
    }

    #[test]
    fn test_valid_order() {
        check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1" currency="EUR">
                 <o:Line qty="2">widget</o:Line>
                 <o:Line qty="99">gadget</o:Line>
                 <o:Note>leave at door</o:Note>
                 <o:Ref>o1</o:Ref>
                 <x:Extra xmlns:x="urn:example:unknown"><x:Deep/></x:Extra>
               </o:Order>"#,
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_root_is_rejected() {
        let err = check(r#"<o:Invoice xmlns:o="urn:example:order"/>"#).unwrap_err();
        assert!(err.to_string().contains("cvc-elt.1.a"), "{err}");
    }

    #[test]
    fn test_content_model_violations() {
        let found = errors(
            r#"<o:Order xmlns:o="urn:example:order" id="o1">
                 <o:Note>first</o:Note>
               </o:Order>"#,
        );
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].contains("cvc-complex-type.2.4.a"), "{found:?}");
        assert!(found[0].contains("{urn:example:order}Line"), "{found:?}");

        let found = errors(r#"<o:Order xmlns:o="urn:example:order" id="o1"/>"#);
        assert!(found[0].contains("cvc-complex-type.2.4.b"), "{found:?}");
    }

    #[test]
    fn test_attribute_checks() {
        let found = errors(
            r#"<o:Order xmlns:o="urn:example:order" currency="USD" color="red">
                 <o:Line qty="0">widget</o:Line>
               </o:Order>"#,
        );
        let joined = found.join("\n");
        assert!(joined.contains("cvc-attribute.4"), "{joined}");
        assert!(joined.contains("cvc-complex-type.3.2.2: Attribute 'color'"), "{joined}");
        assert!(joined.contains("cvc-complex-type.4: Attribute 'id'"), "{joined}");
        assert!(joined.contains("cvc-attribute.3: The value '0' of attribute 'qty'"), "{joined}");
    }

    #[test]
    fn test_other_namespace_wildcard() {
        check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1">
                 <o:Line qty="1">a</o:Line>
                 <x:A xmlns:x="urn:example:x"/>
                 <y:B xmlns:y="urn:example:y"/>
               </o:Order>"#,
        )
        .unwrap();

        // ##other excludes the target namespace
        let found = errors(
            r#"<o:Order xmlns:o="urn:example:order" id="o1">
                 <o:Line qty="1">a</o:Line>
                 <x:A xmlns:x="urn:example:x"/>
                 <o:Bogus/>
               </o:Order>"#,
        );
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].contains("cvc-complex-type.2.4"), "{found:?}");
        assert!(found[0].contains("Bogus"), "{found:?}");
    }

    #[test]
    fn test_text_in_element_only_content() {
        let found = errors(
            r#"<o:Order xmlns:o="urn:example:order" id="o1">stray<o:Line qty="1">a</o:Line></o:Order>"#,
        );
        assert!(found.iter().any(|e| e.contains("cvc-complex-type.2.3")), "{found:?}");
    }

    #[test]
    fn test_dangling_idref() {
        let err = check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1">
                 <o:Line qty="1">a</o:Line>
                 <o:Ref>missing</o:Ref>
               </o:Order>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cvc-id.1"), "{err}");
    }

    #[test]
    fn test_xsi_type_extension() {
        check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1"
                        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                        xsi:type="o:RushOrder">
                 <o:Line qty="1">a</o:Line>
                 <o:Deadline>2024-05-01</o:Deadline>
               </o:Order>"#,
        )
        .unwrap();
        let err = check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1"
                        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                        xsi:type="o:Line">
                 <o:Line qty="1">a</o:Line>
               </o:Order>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cvc-elt.4.3"), "{err}");
    }

    #[test]
    fn test_unknown_schema_location_hint_is_refused() {
        let err = check(
            r#"<o:Order xmlns:o="urn:example:order" id="o1"
                        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                        xsi:schemaLocation="urn:evil http://attacker.example/evil.xsd">
                 <o:Line qty="1">a</o:Line>
               </o:Order>"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(_)), "{err}");
    }

    #[test]
    fn test_soap_header_loads_utility_schema_lazily() {
        let catalog = SchemaCatalog::default();
        let features = Features::default();
        let limits = ParserLimits::default();
        let session = Session {
            resolver: &catalog,
            handler: &FailClosed,
            features: &features,
            limits: &limits,
        };
        let initial = Resource::new(
            "soap-envelope.xsd",
            "soap-envelope.xsd",
            crate::resource::bundled("soap-envelope.xsd").unwrap(),
        );
        let mut set = SchemaSet::compile(initial, &session).unwrap();
        let wsu = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
        assert!(!set.has_namespace(Some(wsu)));

        let xml = format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
                              xmlns:wsu="{wsu}">
                 <soap:Header>
                   <wsu:Timestamp wsu:Id="ts">
                     <wsu:Created>2024-01-01T00:00:00Z</wsu:Created>
                   </wsu:Timestamp>
                 </soap:Header>
                 <soap:Body><app:Ping xmlns:app="urn:example:app"/></soap:Body>
               </soap:Envelope>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        set.validate(&doc, "soap.xml", &session).unwrap();
        assert!(set.has_namespace(Some(wsu)));

        let bad = xml.replace("<wsu:Created>", "<wsu:Bogus/><wsu:Created>");
        let doc = roxmltree::Document::parse(&bad).unwrap();
        assert!(set.validate(&doc, "soap.xml", &session).is_err());
    }

    #[test]
    fn test_schema_validation_feature_off() {
        let resolver = OrderResolver(SchemaCatalog::default());
        let features = Features {
            schema_validation: false,
            ..Features::default()
        };
        let limits = ParserLimits::default();
        let session = Session {
            resolver: &resolver,
            handler: &FailClosed,
            features: &features,
            limits: &limits,
        };
        let initial = Resource::new("order.xsd", "order.xsd", ORDER_XSD.as_bytes());
        let mut set = SchemaSet::compile(initial, &session).unwrap();
        let doc = roxmltree::Document::parse("<nothing/>").unwrap();
        set.validate(&doc, "test.xml", &session).unwrap();
    }
}
