//! Job configuration model for xmlforge.
//!
//! A job is described by a YAML document: one input XML file, how to infer
//! its schema, and one or more sinks to load it into. Environment
//! references (`${VAR}`) are expanded before parsing so credentials can
//! stay out of the file.
//!
//! ```yaml
//! metadata:
//!   name: catalog-load
//! spec:
//!   input:
//!     path: ./catalog.xml
//!   inference:
//!     mode: hybrid
//!     sample_size: 500
//!   sinks:
//!     - type: jsonl
//!       config:
//!         id: jsonl-out
//!         path: ./out/catalog.jsonl
//! ```

use std::fs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod infer_cfg;
mod sinks_cfg;

pub use infer_cfg::{InferenceCfg, InferenceMode, ResolverCfg};
pub use sinks_cfg::{
    JsonSinkCfg, JsonlSinkCfg, ParquetSinkCfg, PostgresSinkCfg, SinkCfg,
    WarehouseSinkCfg,
};

/// Configuration is internally inconsistent, unreadable, or unparseable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("job has no sinks")]
    NoSinks,

    #[error("sink {id}: batch size must be greater than zero")]
    ZeroBatchSize { id: String },

    #[error("sink {id}: target table name is empty")]
    EmptyTable { id: String },

    #[error("inference sample size must be greater than zero")]
    ZeroSampleSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub metadata: Metadata,
    pub spec: Spec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Job name (unique per deployment); used in log context.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    /// The XML document to ingest.
    pub input: InputCfg,

    /// Schema discovery configuration.
    #[serde(default)]
    pub inference: InferenceCfg,

    /// Destinations; every sink receives every record.
    pub sinks: Vec<SinkCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputCfg {
    /// Path to the XML document on the local filesystem.
    pub path: String,

    /// When set, only depth-2 elements with this local name are emitted;
    /// siblings with other names are skipped.
    #[serde(default)]
    pub record_element: Option<String>,

    /// Optional byte window. A hint, not a guarantee: the stream ends at
    /// the first record boundary at or past `end`.
    #[serde(default)]
    pub window: Option<ByteWindow>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ByteWindow {
    pub start: u64,
    pub end: u64,
}

impl JobSpec {
    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spec.sinks.is_empty() {
            return Err(ConfigError::NoSinks);
        }
        if self.spec.inference.sample_size == 0 {
            return Err(ConfigError::ZeroSampleSize);
        }
        for sink in &self.spec.sinks {
            if sink.batch_size() == Some(0) {
                return Err(ConfigError::ZeroBatchSize { id: sink.id().to_string() });
            }
            if sink.table_name() == Some("") {
                return Err(ConfigError::EmptyTable { id: sink.id().to_string() });
            }
        }
        Ok(())
    }
}

/// Load a job spec from a YAML file, expanding `${ENV}` references first.
pub fn load_from_path(path: &str) -> Result<JobSpec, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
    let with_env = shellexpand::env(&raw)
        .map(|cow| cow.to_string())
        .unwrap_or_else(|_| raw.clone());
    let spec: JobSpec = serde_yaml::from_str(&with_env)?;
    Ok(spec)
}
