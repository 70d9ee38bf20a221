//! Streaming record extraction from XML documents.
//!
//! The extractor walks a document in pull mode and yields one value tree
//! per depth-2 element (a child of the root), in document order. It never
//! holds more than the record under construction plus a bounded scratch
//! buffer, so documents larger than memory stream through.
//!
//! Two independent probes inspect a document without consuming a reader:
//! the root element's local name, and the first schema-location-like
//! attribute on the root.

mod errors;
mod probe;
mod reader;

pub use errors::InputError;
pub use probe::{root_name, schema_location};
pub use reader::RecordReader;
