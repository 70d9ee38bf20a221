use std::borrow::Cow;

use thiserror::Error;

/// Errors raised by sink writers. Connection, authentication and batch
/// failures are fatal to the run; per-cell conversion problems are
/// [`CoercionError`]s and are counted, not raised.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection error: {details}")]
    Connect { details: Cow<'static, str> },

    #[error("authentication error: {details}")]
    Auth { details: Cow<'static, str> },

    /// The target exists and the write mode is `fail_if_exists`.
    #[error("target already exists: {target}")]
    Conflict { target: String },

    #[error("batch {batch} failed at row {row}: {details}")]
    Batch { batch: usize, row: usize, details: Cow<'static, str> },

    #[error("target is missing and table creation is disabled: {target}")]
    MissingTarget { target: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// A single cell could not be converted to its declared type. Non-fatal:
/// columnar sinks drop the cell, flattened sinks keep the string form;
/// either way the occurrence is counted and reported at end of run.
#[derive(Debug, Error)]
#[error("cannot coerce {raw:?} at {path} to {expected}")]
pub struct CoercionError {
    pub path: String,
    pub expected: &'static str,
    pub raw: String,
}
