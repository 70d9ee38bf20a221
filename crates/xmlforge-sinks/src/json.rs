//! JSON document sink.
//!
//! Writes a single top-level array whose elements are the records, one
//! flush per record so the file stays current while a large document
//! streams through. UTF-8, no BOM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::json;
use tracing::{debug, warn};
use xmlforge_config::JsonSinkCfg;
use xmlforge_core::{
    Field, RecordSink, Schema, SinkError, SinkReport, SinkResult, SinkShape,
    Value, WriteMode,
};

use crate::coerce::{flatten_pairs, tree_json};

pub struct JsonSink {
    id: String,
    writer: BufWriter<File>,
    pretty: bool,
    shape: SinkShape,
    fields: Vec<Field>,
    first: bool,
    report: SinkReport,
    dropped: u64,
}

impl JsonSink {
    pub fn new(schema: &Schema, cfg: &JsonSinkCfg) -> SinkResult<JsonSink> {
        let path = Path::new(&cfg.path);
        if path.exists() {
            match cfg.mode {
                WriteMode::FailIfExists => {
                    return Err(SinkError::Conflict { target: cfg.path.clone() });
                }
                WriteMode::Append => {
                    warn!(
                        path = %cfg.path,
                        "json documents cannot be appended to; replacing"
                    );
                }
                WriteMode::Overwrite => {}
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(b"[")?;
        Ok(JsonSink {
            id: cfg.id.clone(),
            writer,
            pretty: cfg.pretty,
            shape: cfg.shape,
            fields: schema.fields.clone(),
            first: true,
            report: SinkReport::default(),
            dropped: 0,
        })
    }
}

impl RecordSink for JsonSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()> {
        let rendered =
            record_json(name, record, &self.fields, self.shape, &mut self.dropped);
        if !self.first {
            self.writer.write_all(b",")?;
        }
        if self.pretty {
            self.writer.write_all(b"\n")?;
            serde_json::to_writer_pretty(&mut self.writer, &rendered)?;
        } else {
            serde_json::to_writer(&mut self.writer, &rendered)?;
        }
        self.first = false;
        self.report.rows_written += 1;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<SinkReport> {
        if self.pretty && !self.first {
            self.writer.write_all(b"\n")?;
        }
        self.writer.write_all(b"]\n")?;
        self.writer.flush()?;
        self.report.cells_dropped = self.dropped;
        debug!(sink_id = %self.id, rows = self.report.rows_written, "json document closed");
        Ok(self.report)
    }
}

/// Shared record rendering for the text sinks: a one-key object in
/// columnar shape (the value-tree structure, typed through the schema),
/// or the fixed `{"fields": [{name, value}]}` form when flattened.
pub(crate) fn record_json(
    name: &str,
    record: &Value,
    fields: &[Field],
    shape: SinkShape,
    dropped: &mut u64,
) -> serde_json::Value {
    match shape {
        SinkShape::Columnar => {
            let elem_kind = fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.element_kind());
            let mut map = serde_json::Map::new();
            map.insert(
                name.to_string(),
                serde_json::Value::Array(vec![tree_json(
                    record, elem_kind, dropped,
                )]),
            );
            serde_json::Value::Object(map)
        }
        SinkShape::Flattened => {
            let pairs: Vec<serde_json::Value> = flatten_pairs(name, record)
                .into_iter()
                .map(|(n, v)| json!({"name": n, "value": v}))
                .collect();
            json!({ "fields": pairs })
        }
    }
}
