use serde::{Deserialize, Serialize};
use xmlforge_core::{SinkShape, WriteMode, DEFAULT_BATCH_SIZE};

// ============================================================================
// Sink configurations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum SinkCfg {
    Json(JsonSinkCfg),
    Jsonl(JsonlSinkCfg),
    Parquet(ParquetSinkCfg),
    Warehouse(WarehouseSinkCfg),
    Postgres(PostgresSinkCfg),
}

impl SinkCfg {
    pub fn id(&self) -> &str {
        match self {
            SinkCfg::Json(c) => &c.id,
            SinkCfg::Jsonl(c) => &c.id,
            SinkCfg::Parquet(c) => &c.id,
            SinkCfg::Warehouse(c) => &c.id,
            SinkCfg::Postgres(c) => &c.id,
        }
    }

    /// Batch size for sinks that speak a batch protocol.
    pub fn batch_size(&self) -> Option<usize> {
        match self {
            SinkCfg::Warehouse(c) => Some(c.batch_size),
            SinkCfg::Postgres(c) => Some(c.batch_size),
            _ => None,
        }
    }

    /// Target table name for table-shaped sinks.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            SinkCfg::Warehouse(c) => Some(&c.table),
            SinkCfg::Postgres(c) => Some(&c.table),
            _ => None,
        }
    }
}

/// JSON document sink: one top-level array whose elements are the records.
///
/// # Example
///
/// ```yaml
/// sinks:
///   - type: json
///     config:
///       id: json-out
///       path: ./out/catalog.json
///       pretty: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSinkCfg {
    /// Unique identifier for this sink instance.
    pub id: String,

    /// Output file path.
    pub path: String,

    /// Pretty-print instead of compact output.
    #[serde(default)]
    pub pretty: bool,

    /// Table layout: columnar (default) or flattened.
    #[serde(default)]
    pub shape: SinkShape,

    /// Behavior when the file already exists.
    #[serde(default)]
    pub mode: WriteMode,
}

/// Line-delimited JSON sink: one compact record per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlSinkCfg {
    /// Unique identifier for this sink instance.
    pub id: String,

    /// Output file path.
    pub path: String,

    /// Table layout: columnar (default) or flattened.
    #[serde(default)]
    pub shape: SinkShape,

    /// Behavior when the file already exists. `append` adds lines to an
    /// existing file.
    #[serde(default)]
    pub mode: WriteMode,
}

/// Columnar file sink (Parquet, snappy-compressed by default).
///
/// # Example
///
/// ```yaml
/// sinks:
///   - type: parquet
///     config:
///       id: parquet-out
///       path: ./out/catalog.parquet
///       shape: columnar
///       mode: overwrite
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetSinkCfg {
    /// Unique identifier for this sink instance.
    pub id: String,

    /// Output file path.
    pub path: String,

    /// Table layout: columnar (default) or flattened.
    #[serde(default)]
    pub shape: SinkShape,

    /// Behavior when the file already exists.
    #[serde(default)]
    pub mode: WriteMode,

    /// Rows per written row group.
    #[serde(default = "default_batch")]
    pub batch_size: usize,
}

/// Warehouse sink: HTTP batch inserts against a BigQuery-style REST
/// surface.
///
/// # Example
///
/// ```yaml
/// sinks:
///   - type: warehouse
///     config:
///       id: bq-out
///       endpoint: https://bigquery.googleapis.com/bigquery/v2
///       project: media-ingest
///       dataset: music_metadata
///       table: release_notifications
///       token: ${WAREHOUSE_TOKEN}
///       shape: flattened
///       mode: append
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSinkCfg {
    /// Unique identifier for this sink instance.
    pub id: String,

    /// Base URL of the warehouse REST API.
    pub endpoint: String,

    /// Project identifier.
    pub project: String,

    /// Dataset holding the target table.
    pub dataset: String,

    /// Target table name.
    pub table: String,

    /// Bearer token; omit for unauthenticated emulators.
    #[serde(default)]
    pub token: Option<String>,

    /// Table layout: columnar (default) or flattened.
    #[serde(default)]
    pub shape: SinkShape,

    /// Behavior when the table already exists.
    #[serde(default)]
    pub mode: WriteMode,

    /// Create the table when missing. When false the table must already
    /// exist.
    #[serde(default = "default_true")]
    pub create_table: bool,

    /// Rows per insert batch.
    #[serde(default = "default_batch")]
    pub batch_size: usize,

    /// HTTP timeout per request, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Relational sink (PostgreSQL, parameterized batch inserts).
///
/// # Example
///
/// ```yaml
/// sinks:
///   - type: postgres
///     config:
///       id: pg-out
///       host: localhost
///       port: 5432
///       database: metadata
///       user: loader
///       password: ${PG_PASSWORD}
///       table: release_notifications
///       shape: columnar
///       mode: overwrite
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSinkCfg {
    /// Unique identifier for this sink instance.
    pub id: String,

    /// Server host.
    pub host: String,

    /// Server port.
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Role to authenticate as.
    pub user: String,

    /// Password; omit for trust/peer authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Target table name.
    pub table: String,

    /// Table layout: columnar (default) or flattened. Flattened writes the
    /// whole record as one JSON document under a single `data` column.
    #[serde(default)]
    pub shape: SinkShape,

    /// Behavior when the table already exists. `overwrite` issues TRUNCATE.
    #[serde(default)]
    pub mode: WriteMode,

    /// Create the table when missing. When false the table must already
    /// exist.
    #[serde(default = "default_true")]
    pub create_table: bool,

    /// Add `id bigserial primary key` and `loaded_at timestamptz` system
    /// columns on create.
    #[serde(default = "default_true")]
    pub system_columns: bool,

    /// Rows per insert batch.
    #[serde(default = "default_batch")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_batch() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout() -> u64 {
    30
}

fn default_pg_port() -> u16 {
    5432
}
