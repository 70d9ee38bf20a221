//! Sink implementations for xmlforge.
//!
//! Every sink is constructed from the unified schema plus its own
//! configuration, consumes the record stream through the `RecordSink`
//! trait, and reports totals on finish.
//!
//! # Available sinks
//!
//! - **Json**: one document, a single top-level array of records
//! - **Jsonl**: line-delimited records, append-capable
//! - **Parquet**: snappy-compressed columnar file
//! - **Warehouse**: HTTP batch inserts (BigQuery-style REST)
//! - **Postgres**: parameterized batch inserts
//!
//! # Design principles
//!
//! - **Write modes**: append / overwrite / fail_if_exists on every sink
//! - **Two shapes**: columnar (one column per top-level field) and
//!   flattened (one repeated `{name, value}` column)
//! - **Batching**: batch-protocol sinks buffer 500 rows and flush the tail
//! - **Error isolation**: bad cells are counted and dropped, never fatal
//! - **Capability seams**: network and SQL surfaces sit behind traits so
//!   tests run against in-memory fakes

pub mod coerce;
mod json;
mod jsonl;
mod parquet;
mod postgres;
mod warehouse;

use xmlforge_config::SinkCfg;
use xmlforge_core::{BoxDynSink, Field, Kind, Schema, SinkResult};

pub use crate::parquet::ParquetSink;
pub use crate::postgres::{PgConn, PostgresSink, SqlConn, SqlParam};
pub use json::JsonSink;
pub use jsonl::JsonlSink;
pub use warehouse::{HttpWarehouseApi, TableRef, WarehouseApi, WarehouseSink};

/// The fixed field of the flattened shape: a repeated struct of
/// `{name, value}` string pairs.
pub fn flattened_field() -> Field {
    Field {
        name: "fields".to_string(),
        kind: Kind::Struct(vec![
            Field::new("name", Kind::Str),
            Field::new("value", Kind::Str),
        ]),
        nullable: true,
        repeating: true,
    }
}

/// Build a sink from its configuration.
pub fn build_sink(schema: &Schema, cfg: &SinkCfg) -> SinkResult<BoxDynSink> {
    let sink: BoxDynSink = match cfg {
        SinkCfg::Json(c) => Box::new(JsonSink::new(schema, c)?),
        SinkCfg::Jsonl(c) => Box::new(JsonlSink::new(schema, c)?),
        SinkCfg::Parquet(c) => Box::new(ParquetSink::new(schema, c)?),
        SinkCfg::Warehouse(c) => {
            let api = HttpWarehouseApi::new(c)?;
            Box::new(WarehouseSink::new(schema, c, api)?)
        }
        SinkCfg::Postgres(c) => {
            let conn = PgConn::connect(c)?;
            Box::new(PostgresSink::new(schema, c, conn)?)
        }
    };
    Ok(sink)
}
