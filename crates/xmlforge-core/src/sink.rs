//! The sink contract.
//!
//! Sinks are constructed from a schema and a sink configuration, consume
//! the record stream one value tree at a time, and report totals on
//! `finish`. The coupling is pull-then-push: the extractor only advances
//! once the sink has accepted the previous record, so there is no internal
//! queue and back-pressure is inherent.

use serde::{Deserialize, Serialize};

use crate::errors::SinkResult;
use crate::value::Value;

/// Rows buffered per batch insert unless a sink config overrides it.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Behavior when the target table/file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Add to the existing target; create it if missing.
    #[default]
    Append,
    /// Remove all existing data first, then append.
    Overwrite,
    /// Fail with a conflict if the target exists.
    FailIfExists,
}

/// Table layout a sink writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkShape {
    /// One column per top-level schema field.
    #[default]
    Columnar,
    /// A single repeated `{name, value}` column; robust to unbounded field
    /// counts and heterogeneous record shapes.
    Flattened,
}

/// Totals a sink accumulates over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub rows_written: u64,
    /// Cells dropped (columnar) or stringified (flattened) after a failed
    /// typed parse.
    pub cells_dropped: u64,
    pub batches: u64,
}

/// A destination for parsed records.
///
/// `write` receives the record's element name and its value tree; the tree
/// must not be retained past the call. `finish` flushes any buffered tail
/// batch and returns the totals.
pub trait RecordSink {
    fn id(&self) -> &str;
    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()>;
    fn finish(&mut self) -> SinkResult<SinkReport>;
}

pub type BoxDynSink = Box<dyn RecordSink>;
