//! Columnar file sink (Parquet).
//!
//! The type lattice maps onto Arrow logical types: timestamps become
//! 64-bit milliseconds with a UTC zone, dates 32-bit day offsets, times
//! millisecond-of-day, decimals 128-bit fixed point. Repeated fields
//! become list groups and structs become group fields; rows buffer into
//! row groups of `batch_size` and the file is snappy-compressed.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float64Array,
    Int32Array, Int64Array, ListArray, StringArray, StructArray,
    Time32MillisecondArray, TimestampMillisecondArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{
    DataType, Field as ArrowField, FieldRef, Fields, Schema as ArrowSchema,
    SchemaRef, TimeUnit,
};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, Timelike};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};
use xmlforge_config::ParquetSinkCfg;
use xmlforge_core::{
    sanitize, ColumnNamer, Field, Kind, RecordSink, SanitizeRules, Schema,
    SinkError, SinkReport, SinkResult, SinkShape, Value, WriteMode,
};

use crate::coerce::{flatten_pairs, record_cells, Cell};
use crate::flattened_field;

#[derive(Debug)]
pub struct ParquetSink {
    id: String,
    shape: SinkShape,
    /// Schema fields paired with their assigned column names.
    columns: Vec<(Field, String)>,
    arrow_schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    rows: Vec<Vec<Cell>>,
    batch_size: usize,
    report: SinkReport,
    dropped: u64,
}

impl ParquetSink {
    pub fn new(schema: &Schema, cfg: &ParquetSinkCfg) -> SinkResult<ParquetSink> {
        let path = Path::new(&cfg.path);
        if path.exists() {
            match cfg.mode {
                WriteMode::FailIfExists => {
                    return Err(SinkError::Conflict { target: cfg.path.clone() });
                }
                WriteMode::Append => {
                    warn!(
                        path = %cfg.path,
                        "parquet files cannot be appended to; replacing"
                    );
                }
                WriteMode::Overwrite => {}
            }
        }

        let columns = match cfg.shape {
            // A parquet file needs at least one column; a zero-field schema
            // (empty document) falls back to the flattened column so the
            // target still gets created.
            SinkShape::Columnar if !schema.fields.is_empty() => {
                let mut namer = ColumnNamer::new(SanitizeRules::file());
                schema
                    .fields
                    .iter()
                    .map(|f| (f.clone(), namer.assign(&f.name)))
                    .collect()
            }
            _ => {
                let field = flattened_field();
                let name = field.name.clone();
                vec![(field, name)]
            }
        };

        let arrow_fields: Vec<ArrowField> = columns
            .iter()
            .map(|(field, col)| arrow_column(field, col))
            .collect();
        let arrow_schema: SchemaRef = Arc::new(ArrowSchema::new(arrow_fields));

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let file = File::create(path)?;
        let writer = ArrowWriter::try_new(file, Arc::clone(&arrow_schema), Some(props))
            .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;

        Ok(ParquetSink {
            id: cfg.id.clone(),
            shape: cfg.shape,
            columns,
            arrow_schema,
            writer: Some(writer),
            rows: Vec::new(),
            batch_size: cfg.batch_size,
            report: SinkReport::default(),
            dropped: 0,
        })
    }

    fn flush_rows(&mut self) -> SinkResult<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let row_count = self.rows.len();
        let mut per_column: Vec<Vec<Cell>> = self
            .columns
            .iter()
            .map(|_| Vec::with_capacity(row_count))
            .collect();
        for row in self.rows.drain(..) {
            for (j, cell) in row.into_iter().enumerate() {
                per_column[j].push(cell);
            }
        }

        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .zip(per_column)
            .map(|((field, _), cells)| build_column(field, cells))
            .collect::<SinkResult<_>>()?;

        let batch = RecordBatch::try_new(Arc::clone(&self.arrow_schema), arrays)
            .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write(&batch)
                .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;
        }
        self.report.batches += 1;
        self.report.rows_written += row_count as u64;
        debug!(sink_id = %self.id, rows = row_count, "row group written");
        Ok(())
    }
}

impl RecordSink for ParquetSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()> {
        let row = match self.shape {
            SinkShape::Columnar => {
                let fields: Vec<Field> =
                    self.columns.iter().map(|(f, _)| f.clone()).collect();
                record_cells(name, record, &fields, &mut self.dropped)
            }
            SinkShape::Flattened => {
                let pairs = flatten_pairs(name, record)
                    .into_iter()
                    .map(|(n, v)| {
                        Cell::Struct(vec![Cell::Str(n), Cell::Str(v)])
                    })
                    .collect::<Vec<Cell>>();
                vec![if pairs.is_empty() {
                    Cell::Null
                } else {
                    Cell::List(pairs)
                }]
            }
        };
        self.rows.push(row);
        if self.rows.len() >= self.batch_size {
            self.flush_rows()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<SinkReport> {
        self.flush_rows()?;
        if let Some(writer) = self.writer.take() {
            writer
                .close()
                .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;
        }
        self.report.cells_dropped = self.dropped;
        Ok(self.report)
    }
}

// ============================================================================
// Lattice → Arrow mapping
// ============================================================================

fn arrow_column(field: &Field, col: &str) -> ArrowField {
    if field.is_repeated() {
        ArrowField::new(
            col,
            DataType::List(item_field(field.element_kind())),
            true,
        )
    } else {
        ArrowField::new(col, arrow_type(&field.kind), true)
    }
}

fn item_field(kind: &Kind) -> FieldRef {
    Arc::new(ArrowField::new("item", arrow_type(kind), true))
}

fn arrow_type(kind: &Kind) -> DataType {
    match kind {
        Kind::Str => DataType::Utf8,
        Kind::I32 => DataType::Int32,
        Kind::I64 => DataType::Int64,
        Kind::F64 => DataType::Float64,
        Kind::Bool => DataType::Boolean,
        Kind::Date => DataType::Date32,
        Kind::Time => DataType::Time32(TimeUnit::Millisecond),
        Kind::Timestamp => {
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
        }
        Kind::Decimal { precision, scale } => {
            DataType::Decimal128(*precision, *scale as i8)
        }
        Kind::Array(elem) => DataType::List(item_field(elem)),
        Kind::Struct(fields) => DataType::Struct(struct_fields(fields)),
    }
}

fn struct_fields(fields: &[Field]) -> Fields {
    fields
        .iter()
        .map(|f| {
            Arc::new(arrow_column(f, &sanitize(&f.name, &SanitizeRules::file())))
        })
        .collect()
}

// ============================================================================
// Cell → Arrow arrays
// ============================================================================

fn build_column(field: &Field, cells: Vec<Cell>) -> SinkResult<ArrayRef> {
    if field.is_repeated() {
        build_list(field.element_kind(), cells)
    } else {
        build_values(&field.kind, cells)
    }
}

fn build_list(elem: &Kind, cells: Vec<Cell>) -> SinkResult<ArrayRef> {
    let mut lengths = Vec::with_capacity(cells.len());
    let mut validity = Vec::with_capacity(cells.len());
    let mut flat: Vec<Cell> = Vec::new();
    for cell in cells {
        match cell {
            Cell::List(items) => {
                validity.push(true);
                lengths.push(items.len());
                flat.extend(items);
            }
            Cell::Null => {
                validity.push(false);
                lengths.push(0);
            }
            other => {
                validity.push(true);
                lengths.push(1);
                flat.push(other);
            }
        }
    }
    let values = build_values(elem, flat)?;
    Ok(Arc::new(ListArray::new(
        item_field(elem),
        OffsetBuffer::from_lengths(lengths),
        values,
        Some(NullBuffer::from(validity)),
    )))
}

fn build_values(kind: &Kind, cells: Vec<Cell>) -> SinkResult<ArrayRef> {
    let array: ArrayRef = match kind {
        Kind::Str => Arc::new(StringArray::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Str(s) => Some(s),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::I32 => Arc::new(Int32Array::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::I32(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::I64 => Arc::new(Int64Array::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::I64(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::F64 => Arc::new(Float64Array::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::F64(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Bool => Arc::new(BooleanArray::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Bool(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Date => Arc::new(Date32Array::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Date(d) => Some(days_since_epoch(d)),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Time => Arc::new(Time32MillisecondArray::from(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Time(t) => Some(millis_of_day(t)),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Timestamp => Arc::new(
            TimestampMillisecondArray::from(
                cells
                    .into_iter()
                    .map(|c| match c {
                        Cell::Timestamp(ts) => Some(ts.timestamp_millis()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        Kind::Decimal { precision, scale } => Arc::new(
            Decimal128Array::from(
                cells
                    .into_iter()
                    .map(|c| match c {
                        Cell::Decimal { unscaled, .. } => Some(unscaled),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_precision_and_scale(*precision, *scale as i8)
            .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?,
        ),
        Kind::Array(elem) => return build_list(elem, cells),
        Kind::Struct(fields) => {
            let mut validity = Vec::with_capacity(cells.len());
            let mut per_child: Vec<Vec<Cell>> =
                fields.iter().map(|_| Vec::with_capacity(cells.len())).collect();
            for cell in cells {
                match cell {
                    Cell::Struct(children) => {
                        validity.push(true);
                        for (j, child) in children.into_iter().enumerate() {
                            if j < per_child.len() {
                                per_child[j].push(child);
                            }
                        }
                    }
                    _ => {
                        validity.push(false);
                        for child in per_child.iter_mut() {
                            child.push(Cell::Null);
                        }
                    }
                }
            }
            let arrays: Vec<ArrayRef> = fields
                .iter()
                .zip(per_child)
                .map(|(f, child_cells)| build_column(f, child_cells))
                .collect::<SinkResult<_>>()?;
            Arc::new(StructArray::new(
                struct_fields(fields),
                arrays,
                Some(NullBuffer::from(validity)),
            ))
        }
    };
    Ok(array)
}

fn days_since_epoch(d: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(d);
    (d - epoch).num_days() as i32
}

fn millis_of_day(t: chrono::NaiveTime) -> i32 {
    (t.num_seconds_from_midnight() * 1000 + t.nanosecond() / 1_000_000) as i32
}
