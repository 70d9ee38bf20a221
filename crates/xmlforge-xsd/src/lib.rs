//! External schema resolution.
//!
//! Documents may reference a schema description through a
//! schema-location attribute on their root element. This crate probes for
//! that URL, downloads it, parses the element declarations into the type
//! lattice, and caches the parsed result for the lifetime of the process.
//!
//! Resolution is always best-effort from the caller's point of view: any
//! failure (no location, download error, parse error, resolver disabled)
//! surfaces as `None`, and the inference engine decides whether that is
//! fatal for its mode.

mod errors;
mod parser;
mod resolver;

pub use errors::ResolutionError;
pub use parser::parse_xsd;
pub use resolver::{HttpFetcher, SchemaFetcher, XsdResolver};

use xmlforge_core::{Field, Kind};

/// Maximum occurrence count of an element declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Bounded(u32),
    Unbounded,
}

/// One parsed `element` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtDecl {
    pub name: String,
    pub kind: Kind,
    /// Defaults to 1 when the declaration is silent.
    pub min_occurs: u32,
    /// Defaults to 1 when the declaration is silent.
    pub max_occurs: Occurs,
    /// Defaults to false.
    pub nillable: bool,
}

impl ExtDecl {
    pub fn is_array(&self) -> bool {
        match self.max_occurs {
            Occurs::Unbounded => true,
            Occurs::Bounded(n) => n > 1,
        }
    }

    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }

    /// The lattice field this declaration contributes to a schema.
    pub fn to_field(&self) -> Field {
        Field {
            name: self.name.clone(),
            kind: self.kind.clone(),
            nullable: !self.is_required() || self.nillable,
            repeating: self.is_array(),
        }
    }
}

/// A parsed external schema: the element declarations found at the top
/// level and inside complex-type containers, keyed by local name
/// (first declaration wins).
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSchema {
    pub source_url: String,
    pub elements: Vec<ExtDecl>,
    pub target_namespace: Option<String>,
}

impl ExternalSchema {
    pub fn element(&self, name: &str) -> Option<&ExtDecl> {
        self.elements.iter().find(|d| d.name == name)
    }
}
