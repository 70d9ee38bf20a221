//! Core types shared by every xmlforge component.
//!
//! This crate carries the pieces the rest of the workspace is built on:
//!
//! - **Value tree**: the recursive in-memory form of one parsed record
//! - **Type lattice**: `Kind`, `Field` and `Schema`
//! - **Sanitizer**: per-target identifier rules with collision-aware naming
//! - **Sink contract**: the `RecordSink` trait, write modes and shapes
//! - **Errors**: `SinkError` and `CoercionError`, shared by all sinks
//!
//! Everything here is deliberately free of IO; parsing, resolution and
//! writing live in the downstream crates.

pub mod errors;
pub mod redact;
pub mod sanitize;
pub mod sink;
pub mod types;
pub mod value;

pub use errors::{CoercionError, SinkError, SinkResult};
pub use sanitize::{sanitize, ColumnNamer, SanitizeRules};
pub use sink::{BoxDynSink, RecordSink, SinkReport, SinkShape, WriteMode, DEFAULT_BATCH_SIZE};
pub use types::{Field, Kind, Schema};
pub use value::{Value, ATTR_PREFIX, TEXT_KEY};
