//! XSD declaration parsing.
//!
//! The walk collects `element` declarations wherever they appear: at the
//! schema top level and inside `complexType` containers, descending
//! through `sequence`, `choice` and `all`. No structural validation of
//! the schema itself is performed; anything unrecognized is skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xmlforge_core::Kind;

use crate::errors::ResolutionError;
use crate::{ExtDecl, ExternalSchema, Occurs};

/// Parse a schema description body fetched from `url`.
pub fn parse_xsd(body: &str, url: &str) -> Result<ExternalSchema, ResolutionError> {
    let mut reader = Reader::from_reader(body.as_bytes());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if local(&e) == "schema" => {
                let target_namespace = attr(&e, "targetNamespace")?;
                let decls = parse_scope(&mut reader)?;
                return Ok(ExternalSchema {
                    source_url: url.to_string(),
                    elements: dedupe(decls),
                    target_namespace,
                });
            }
            Ok(Event::Empty(e)) if local(&e) == "schema" => {
                return Ok(ExternalSchema {
                    source_url: url.to_string(),
                    elements: Vec::new(),
                    target_namespace: attr(&e, "targetNamespace")?,
                });
            }
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => {
                return Err(ResolutionError::Parse {
                    details: "root element is not a schema".into(),
                });
            }
            Ok(Event::Eof) => {
                return Err(ResolutionError::Parse {
                    details: "schema body has no root element".into(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ResolutionError::Parse { details: e.to_string() })
            }
        }
    }
}

/// Collect element declarations inside the current container until its end
/// tag, recursing through nested containers.
fn parse_scope(
    reader: &mut Reader<&[u8]>,
) -> Result<Vec<ExtDecl>, ResolutionError> {
    let mut decls = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local(&e).as_str() {
                "element" => {
                    let head = DeclHead::from_start(&e)?;
                    decls.push(parse_element(reader, head)?);
                }
                "complexType" | "sequence" | "choice" | "all" => {
                    decls.extend(parse_scope(reader)?);
                }
                _ => skip_subtree(reader)?,
            },
            Ok(Event::Empty(e)) => {
                if local(&e) == "element" {
                    let head = DeclHead::from_start(&e)?;
                    decls.push(head.into_decl(None));
                }
            }
            Ok(Event::End(_)) => return Ok(decls),
            Ok(Event::Eof) => {
                return Err(ResolutionError::Parse {
                    details: "unexpected end of schema body".into(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ResolutionError::Parse { details: e.to_string() })
            }
        }
    }
}

/// Parse the body of an `element` declaration whose start tag has been
/// consumed. An inline `complexType` turns the declared type into a
/// `Struct` built from the recursively parsed child declarations.
fn parse_element(
    reader: &mut Reader<&[u8]>,
    head: DeclHead,
) -> Result<ExtDecl, ResolutionError> {
    let mut inline: Option<Vec<ExtDecl>> = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local(&e).as_str() {
                "complexType" | "sequence" | "choice" | "all" => {
                    let children = parse_scope(reader)?;
                    inline.get_or_insert_with(Vec::new).extend(children);
                }
                _ => skip_subtree(reader)?,
            },
            Ok(Event::End(_)) => return Ok(head.into_decl(inline)),
            Ok(Event::Eof) => {
                return Err(ResolutionError::Parse {
                    details: "unexpected end of schema body".into(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ResolutionError::Parse { details: e.to_string() })
            }
        }
    }
}

/// The attributes of an `element` declaration, before its body is read.
struct DeclHead {
    name: String,
    type_ref: Option<String>,
    min_occurs: u32,
    max_occurs: Occurs,
    nillable: bool,
}

impl DeclHead {
    fn from_start(e: &BytesStart) -> Result<DeclHead, ResolutionError> {
        let min_occurs = match attr(e, "minOccurs")? {
            Some(raw) => raw.parse::<u32>().unwrap_or(1),
            None => 1,
        };
        let max_occurs = match attr(e, "maxOccurs")?.as_deref() {
            Some("unbounded") => Occurs::Unbounded,
            Some(raw) => Occurs::Bounded(raw.parse::<u32>().unwrap_or(1)),
            None => Occurs::Bounded(1),
        };
        Ok(DeclHead {
            name: attr(e, "name")?.unwrap_or_default(),
            type_ref: attr(e, "type")?,
            min_occurs,
            max_occurs,
            nillable: attr(e, "nillable")?.as_deref() == Some("true"),
        })
    }

    fn into_decl(self, inline: Option<Vec<ExtDecl>>) -> ExtDecl {
        let kind = match inline {
            Some(children) if !children.is_empty() => {
                Kind::Struct(children.iter().map(ExtDecl::to_field).collect())
            }
            _ => match &self.type_ref {
                Some(type_ref) => Kind::from_type_name(strip_ns(type_ref)),
                None => Kind::Str,
            },
        };
        ExtDecl {
            name: self.name,
            kind,
            min_occurs: self.min_occurs,
            max_occurs: self.max_occurs,
            nillable: self.nillable,
        }
    }
}

/// First declaration of a name wins; later duplicates are dropped.
fn dedupe(decls: Vec<ExtDecl>) -> Vec<ExtDecl> {
    let mut out: Vec<ExtDecl> = Vec::with_capacity(decls.len());
    for decl in decls {
        if decl.name.is_empty() {
            continue;
        }
        if !out.iter().any(|d| d.name == decl.name) {
            out.push(decl);
        }
    }
    out
}

fn skip_subtree(reader: &mut Reader<&[u8]>) -> Result<(), ResolutionError> {
    let mut depth = 1usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Ok(Event::Eof) => {
                return Err(ResolutionError::Parse {
                    details: "unexpected end of schema body".into(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ResolutionError::Parse { details: e.to_string() })
            }
        }
    }
}

fn local(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>, ResolutionError> {
    for a in e.attributes() {
        let a = a.map_err(|err| ResolutionError::Parse {
            details: err.to_string(),
        })?;
        if a.key.local_name().as_ref() == name.as_bytes() {
            let value = a.unescape_value().map_err(|err| {
                ResolutionError::Parse { details: err.to_string() }
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `xs:string` → `string`.
fn strip_ns(type_ref: &str) -> &str {
    type_ref.rsplit(':').next().unwrap_or(type_ref)
}
