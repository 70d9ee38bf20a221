//! Line-delimited JSON sink: one compact record per line, trailing
//! newline after the last line. The only file sink with a true append
//! mode.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;
use xmlforge_config::JsonlSinkCfg;
use xmlforge_core::{
    Field, RecordSink, Schema, SinkError, SinkReport, SinkResult, SinkShape,
    Value, WriteMode,
};

use crate::json::record_json;

#[derive(Debug)]
pub struct JsonlSink {
    id: String,
    writer: BufWriter<File>,
    shape: SinkShape,
    fields: Vec<Field>,
    report: SinkReport,
    dropped: u64,
}

impl JsonlSink {
    pub fn new(schema: &Schema, cfg: &JsonlSinkCfg) -> SinkResult<JsonlSink> {
        let path = Path::new(&cfg.path);
        let file = match cfg.mode {
            WriteMode::Append => {
                OpenOptions::new().create(true).append(true).open(path)?
            }
            WriteMode::Overwrite => File::create(path)?,
            WriteMode::FailIfExists => {
                if path.exists() {
                    return Err(SinkError::Conflict { target: cfg.path.clone() });
                }
                File::create(path)?
            }
        };
        Ok(JsonlSink {
            id: cfg.id.clone(),
            writer: BufWriter::new(file),
            shape: cfg.shape,
            fields: schema.fields.clone(),
            report: SinkReport::default(),
            dropped: 0,
        })
    }
}

impl RecordSink for JsonlSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()> {
        let rendered =
            record_json(name, record, &self.fields, self.shape, &mut self.dropped);
        serde_json::to_writer(&mut self.writer, &rendered)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.report.rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<SinkReport> {
        self.writer.flush()?;
        self.report.cells_dropped = self.dropped;
        debug!(sink_id = %self.id, rows = self.report.rows_written, "jsonl stream closed");
        Ok(self.report)
    }
}
