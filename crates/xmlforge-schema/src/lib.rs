//! Schema inference and unification.
//!
//! One entry point, [`infer_schema`], merges up to three sources into a
//! single typed tree:
//!
//! 1. the externally referenced schema description (optional),
//! 2. a sample of the document's own records,
//! 3. user overrides.
//!
//! The configured mode picks which sources participate; the merge always
//! widens, never fails, so a schema comes out of any well-formed document
//! that has a root.

mod errors;
mod infer;
mod merge;
mod overrides;
mod probe;

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use xmlforge_config::{InferenceCfg, InferenceMode, InputCfg};
use xmlforge_core::{Field, Schema};
use xmlforge_source::{root_name, RecordReader};
use xmlforge_xsd::{ExternalSchema, SchemaFetcher, XsdResolver};

pub use errors::SchemaError;
pub use infer::{field_for_items, infer_fields};
pub use merge::{merge_field, merge_fields, merge_kind};
pub use overrides::apply_overrides;
pub use probe::probe_leaf;

/// Capability seam for external schema lookup, so inference tests never
/// touch the network.
pub trait ExternalSchemaSource {
    fn resolve(&self, doc: &Path) -> Option<Arc<ExternalSchema>>;
}

impl<F: SchemaFetcher> ExternalSchemaSource for XsdResolver<F> {
    fn resolve(&self, doc: &Path) -> Option<Arc<ExternalSchema>> {
        self.resolve_document(doc)
    }
}

/// An external source that never resolves anything.
pub struct NoExternal;

impl ExternalSchemaSource for NoExternal {
    fn resolve(&self, _doc: &Path) -> Option<Arc<ExternalSchema>> {
        None
    }
}

/// Produce the unified schema for a document.
pub fn infer_schema(
    input: &InputCfg,
    cfg: &InferenceCfg,
    external: &dyn ExternalSchemaSource,
) -> Result<Schema, SchemaError> {
    let path = Path::new(&input.path);
    let root = root_name(path)?.ok_or(SchemaError::NoRoot)?;

    let fields = match cfg.mode {
        InferenceMode::Auto => sample(input, cfg)?,
        InferenceMode::External => external
            .resolve(path)
            .map(external_fields)
            .ok_or(SchemaError::ExternalUnavailable)?,
        InferenceMode::Manual => Vec::new(),
        InferenceMode::Hybrid => {
            let ext = external
                .resolve(path)
                .map(external_fields)
                .unwrap_or_default();
            let sampled = sample(input, cfg)?;
            merge_external_sampled(ext, sampled)
        }
    };

    let fields = apply_overrides(fields, cfg);
    info!(
        root = %root,
        fields = fields.len(),
        mode = ?cfg.mode,
        "schema unified"
    );
    Ok(Schema::new(root, fields))
}

/// Multi-line outline of a schema, for operator-facing dry runs.
pub fn schema_outline(schema: &Schema) -> String {
    let mut out = format!("root: {}\n", schema.root);
    for field in &schema.fields {
        outline_field(field, 1, &mut out);
    }
    out
}

fn outline_field(field: &Field, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let mut flags = Vec::new();
    if field.nullable {
        flags.push("nullable");
    }
    if field.repeating {
        flags.push("repeating");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    match &field.kind {
        xmlforge_core::Kind::Struct(children) => {
            out.push_str(&format!("{indent}{}: struct{flags}\n", field.name));
            for child in children {
                outline_field(child, depth + 1, out);
            }
        }
        other => {
            out.push_str(&format!("{indent}{}: {other}{flags}\n", field.name));
        }
    }
}

/// Sample up to `sample_size` records from the document.
fn sample(input: &InputCfg, cfg: &InferenceCfg) -> Result<Vec<Field>, SchemaError> {
    let reader = RecordReader::open(Path::new(&input.path))?
        .with_filter(input.record_element.clone())
        .with_window(input.window.map(|w| (w.start, w.end)));
    Ok(infer_fields(reader, cfg.sample_size)?)
}

fn external_fields(schema: Arc<ExternalSchema>) -> Vec<Field> {
    schema.elements.iter().map(|d| d.to_field()).collect()
}

/// Hybrid merge: the external schema contributes first; sampled fields are
/// added only when no external field of the same top-level name exists.
fn merge_external_sampled(ext: Vec<Field>, sampled: Vec<Field>) -> Vec<Field> {
    let mut out = ext;
    for field in sampled {
        if !out.iter().any(|f| f.name == field.name) {
            out.push(field);
        }
    }
    out
}
