//! Warehouse sink: HTTP batch inserts against a BigQuery-style REST
//! surface.
//!
//! The write protocol lives behind the narrow [`WarehouseApi`] capability
//! so tests drive the sink with an in-memory fake. Leaf scalars widen to
//! their largest native type — `I32` inserts as 64-bit and `Decimal` as
//! float — a documented simplification of this sink.

use serde_json::{json, Map};
use tracing::{debug, info};
use xmlforge_config::WarehouseSinkCfg;
use xmlforge_core::{
    redact::redact_token, sanitize, ColumnNamer, Field, Kind, RecordSink,
    SanitizeRules, Schema, SinkError, SinkReport, SinkResult, SinkShape, Value,
    WriteMode,
};

use crate::coerce::{cell_json, flatten_pairs, record_cells};

/// Fully qualified table address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// The warehouse write protocol. Implementations must create tables
/// idempotently: a create that races an existing table is a success.
pub trait WarehouseApi {
    fn table_exists(&mut self, table: &TableRef) -> SinkResult<bool>;
    fn create_table(
        &mut self,
        table: &TableRef,
        schema_fields: &serde_json::Value,
    ) -> SinkResult<()>;
    fn truncate(&mut self, table: &TableRef) -> SinkResult<()>;
    /// Insert one batch. A failed row surfaces as `SinkError::Batch` with
    /// the row index; the batch index is filled in by the sink.
    fn insert_rows(
        &mut self,
        table: &TableRef,
        rows: &[serde_json::Value],
    ) -> SinkResult<()>;
}

/// Blocking HTTP implementation of the warehouse protocol.
pub struct HttpWarehouseApi {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpWarehouseApi {
    pub fn new(cfg: &WarehouseSinkCfg) -> SinkResult<HttpWarehouseApi> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| SinkError::Connect { details: e.to_string().into() })?;
        if let Some(token) = &cfg.token {
            debug!(token = %redact_token(token), "warehouse credential configured");
        }
        Ok(HttpWarehouseApi {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> SinkResult<reqwest::blocking::Response> {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req
            .send()
            .map_err(|e| SinkError::Connect { details: e.to_string().into() })?;
        match response.status().as_u16() {
            401 | 403 => Err(SinkError::Auth {
                details: format!("warehouse returned {}", response.status()).into(),
            }),
            _ => Ok(response),
        }
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.endpoint, table.project, table.dataset, table.table
        )
    }
}

impl WarehouseApi for HttpWarehouseApi {
    fn table_exists(&mut self, table: &TableRef) -> SinkResult<bool> {
        let response =
            self.request(reqwest::Method::GET, &self.table_url(table), None)?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SinkError::Connect {
                details: format!("table lookup returned {status}").into(),
            }),
        }
    }

    fn create_table(
        &mut self,
        table: &TableRef,
        schema_fields: &serde_json::Value,
    ) -> SinkResult<()> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables",
            self.endpoint, table.project, table.dataset
        );
        let body = json!({
            "tableReference": {
                "projectId": table.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "schema": { "fields": schema_fields },
        });
        let response = self.request(reqwest::Method::POST, &url, Some(&body))?;
        match response.status().as_u16() {
            // 409: someone else created it first; idempotent by contract
            200 | 409 => Ok(()),
            status => Err(SinkError::Connect {
                details: format!("table create returned {status}").into(),
            }),
        }
    }

    fn truncate(&mut self, table: &TableRef) -> SinkResult<()> {
        let url =
            format!("{}/projects/{}/queries", self.endpoint, table.project);
        let body = json!({
            "query": format!(
                "TRUNCATE TABLE `{}.{}`", table.dataset, table.table
            ),
            "useLegacySql": false,
        });
        let response = self.request(reqwest::Method::POST, &url, Some(&body))?;
        if !response.status().is_success() {
            return Err(SinkError::Connect {
                details: format!("truncate returned {}", response.status()).into(),
            });
        }
        Ok(())
    }

    fn insert_rows(
        &mut self,
        table: &TableRef,
        rows: &[serde_json::Value],
    ) -> SinkResult<()> {
        let url = format!("{}/insertAll", self.table_url(table));
        let body = json!({
            "rows": rows.iter().map(|r| json!({"json": r})).collect::<Vec<_>>(),
        });
        let response = self.request(reqwest::Method::POST, &url, Some(&body))?;
        if !response.status().is_success() {
            return Err(SinkError::Batch {
                batch: 0,
                row: 0,
                details: format!("insert returned {}", response.status()).into(),
            });
        }
        let parsed: serde_json::Value = response.json().unwrap_or(json!({}));
        if let Some(errors) = parsed.get("insertErrors").and_then(|e| e.as_array())
        {
            if let Some(first) = errors.first() {
                let row = first
                    .get("index")
                    .and_then(|i| i.as_u64())
                    .unwrap_or_default() as usize;
                let details = first
                    .get("errors")
                    .and_then(|e| e.as_array())
                    .and_then(|e| e.first())
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("row rejected")
                    .to_string();
                return Err(SinkError::Batch { batch: 0, row, details: details.into() });
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WarehouseSink<A: WarehouseApi> {
    id: String,
    api: A,
    table: TableRef,
    shape: SinkShape,
    columns: Vec<(Field, String)>,
    batch: Vec<serde_json::Value>,
    batch_size: usize,
    report: SinkReport,
    dropped: u64,
}

impl<A: WarehouseApi> WarehouseSink<A> {
    pub fn new(
        schema: &Schema,
        cfg: &WarehouseSinkCfg,
        mut api: A,
    ) -> SinkResult<WarehouseSink<A>> {
        let table = TableRef {
            project: cfg.project.clone(),
            dataset: cfg.dataset.clone(),
            table: cfg.table.clone(),
        };
        let rules = SanitizeRules::warehouse();
        let columns: Vec<(Field, String)> = match cfg.shape {
            SinkShape::Columnar => {
                let mut namer = ColumnNamer::new(rules);
                schema
                    .fields
                    .iter()
                    .map(|f| (f.clone(), namer.assign(&f.name)))
                    .collect()
            }
            SinkShape::Flattened => {
                let field = crate::flattened_field();
                let name = field.name.clone();
                vec![(field, name)]
            }
        };

        let exists = api.table_exists(&table)?;
        match (exists, cfg.mode) {
            (true, WriteMode::FailIfExists) => {
                return Err(SinkError::Conflict { target: table.to_string() });
            }
            (true, WriteMode::Overwrite) => {
                info!(table = %table, "overwrite: truncating existing table");
                api.truncate(&table)?;
            }
            (true, WriteMode::Append) => {}
            (false, _) => {
                if !cfg.create_table {
                    return Err(SinkError::MissingTarget {
                        target: table.to_string(),
                    });
                }
                let fields = table_schema_json(&columns);
                api.create_table(&table, &fields)?;
                info!(table = %table, "table created");
            }
        }

        Ok(WarehouseSink {
            id: cfg.id.clone(),
            api,
            table,
            shape: cfg.shape,
            columns,
            batch: Vec::new(),
            batch_size: cfg.batch_size,
            report: SinkReport::default(),
            dropped: 0,
        })
    }

    /// The api handle, for inspection in tests.
    pub fn api(&self) -> &A {
        &self.api
    }

    fn flush(&mut self) -> SinkResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch_index = self.report.batches as usize;
        self.api
            .insert_rows(&self.table, &self.batch)
            .map_err(|e| match e {
                SinkError::Batch { row, details, .. } => {
                    SinkError::Batch { batch: batch_index, row, details }
                }
                other => other,
            })?;
        self.report.batches += 1;
        self.report.rows_written += self.batch.len() as u64;
        self.batch.clear();
        Ok(())
    }
}

impl<A: WarehouseApi> RecordSink for WarehouseSink<A> {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()> {
        let row = match self.shape {
            SinkShape::Columnar => {
                let fields: Vec<Field> =
                    self.columns.iter().map(|(f, _)| f.clone()).collect();
                let cells =
                    record_cells(name, record, &fields, &mut self.dropped);
                let rules = SanitizeRules::warehouse();
                let mut map = Map::new();
                for ((field, col), cell) in self.columns.iter().zip(cells) {
                    let value = cell_json(&cell, field_render_kind(field), &rules, true);
                    map.insert(col.clone(), value);
                }
                serde_json::Value::Object(map)
            }
            SinkShape::Flattened => {
                let pairs: Vec<serde_json::Value> = flatten_pairs(name, record)
                    .into_iter()
                    .map(|(n, v)| json!({"name": n, "value": v}))
                    .collect();
                json!({ "fields": pairs })
            }
        };
        self.batch.push(row);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<SinkReport> {
        self.flush()?;
        self.report.cells_dropped = self.dropped;
        info!(
            sink_id = %self.id,
            table = %self.table,
            rows = self.report.rows_written,
            "warehouse load complete"
        );
        Ok(self.report)
    }
}

/// The kind to render a cell against: repeated fields render their
/// element kind per item.
fn field_render_kind(field: &Field) -> &Kind {
    if field.is_repeated() {
        field.element_kind()
    } else {
        &field.kind
    }
}

/// Table schema JSON in the REST shape: `[{name, type, mode, fields?}]`.
fn table_schema_json(columns: &[(Field, String)]) -> serde_json::Value {
    serde_json::Value::Array(
        columns
            .iter()
            .map(|(field, col)| column_schema_json(field, col))
            .collect(),
    )
}

fn column_schema_json(field: &Field, col: &str) -> serde_json::Value {
    let mode = if field.is_repeated() {
        "REPEATED"
    } else if field.nullable {
        "NULLABLE"
    } else {
        "REQUIRED"
    };
    let kind = field.element_kind();
    match kind {
        Kind::Struct(children) => {
            let rules = SanitizeRules::warehouse();
            let inner: Vec<serde_json::Value> = children
                .iter()
                .map(|c| column_schema_json(c, &sanitize(&c.name, &rules)))
                .collect();
            json!({"name": col, "type": "RECORD", "mode": mode, "fields": inner})
        }
        leaf => json!({"name": col, "type": bq_type(leaf), "mode": mode}),
    }
}

/// Every leaf widens to its largest native type.
fn bq_type(kind: &Kind) -> &'static str {
    match kind {
        Kind::Str => "STRING",
        Kind::I32 | Kind::I64 => "INT64",
        Kind::F64 | Kind::Decimal { .. } => "FLOAT64",
        Kind::Bool => "BOOL",
        Kind::Date => "DATE",
        Kind::Time => "TIME",
        Kind::Timestamp => "TIMESTAMP",
        Kind::Array(_) | Kind::Struct(_) => "STRING",
    }
}
