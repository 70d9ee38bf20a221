//! Relational sink (PostgreSQL).
//!
//! Columnar shape creates one typed column per top-level field, with
//! nested and repeated types landing in `jsonb`; flattened shape
//! serializes the whole record as one JSON document under a single
//! `data` column. An auto-increment primary key and an insertion
//! timestamp are added on create. `overwrite` issues `TRUNCATE`.
//!
//! The SQL surface sits behind the [`SqlConn`] capability so tests run
//! against a recording fake instead of a server.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use postgres::types::ToSql;
use postgres::NoTls;
use tracing::{debug, info};
use xmlforge_config::PostgresSinkCfg;
use xmlforge_core::{
    redact::redact_url_password, ColumnNamer, Field, Kind, RecordSink,
    SanitizeRules, Schema, SinkError, SinkReport, SinkResult, SinkShape, Value,
    WriteMode,
};

use crate::coerce::{cell_json, record_cells, tree_json, Cell};

/// Maximum bound parameters per statement, kept under the wire limit.
const MAX_PARAMS: usize = 60_000;

/// A typed SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlParam {
    fn as_dyn(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Text(v) => v,
            SqlParam::I32(v) => v,
            SqlParam::I64(v) => v,
            SqlParam::F64(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::Date(v) => v,
            SqlParam::Time(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::Json(v) => v,
        }
    }
}

/// Narrow SQL capability the sink drives.
pub trait SqlConn {
    fn table_exists(&mut self, table: &str) -> SinkResult<bool>;
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> SinkResult<u64>;
}

/// Live connection over the `postgres` crate.
pub struct PgConn {
    client: postgres::Client,
}

impl PgConn {
    pub fn connect(cfg: &PostgresSinkCfg) -> SinkResult<PgConn> {
        let dsn = format!(
            "postgres://{}:{}@{}:{}/{}",
            cfg.user,
            cfg.password.as_deref().unwrap_or_default(),
            cfg.host,
            cfg.port,
            cfg.database
        );
        debug!(dsn = %redact_url_password(&dsn), "connecting");
        let mut pg = postgres::Config::new();
        pg.host(&cfg.host)
            .port(cfg.port)
            .dbname(&cfg.database)
            .user(&cfg.user);
        if let Some(password) = &cfg.password {
            pg.password(password);
        }
        let client = pg.connect(NoTls).map_err(|e| SinkError::Connect {
            details: format!(
                "postgres {}:{}/{}: {e}",
                cfg.host, cfg.port, cfg.database
            )
            .into(),
        })?;
        Ok(PgConn { client })
    }
}

impl SqlConn for PgConn {
    fn table_exists(&mut self, table: &str) -> SinkResult<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&table],
            )
            .map_err(|e| SinkError::Connect { details: e.to_string().into() })?;
        Ok(row.get(0))
    }

    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> SinkResult<u64> {
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(SqlParam::as_dyn).collect();
        self.client
            .execute(sql, &bound)
            .map_err(|e| SinkError::Other(anyhow::anyhow!("{e}")))
    }
}

#[derive(Debug)]
pub struct PostgresSink<C: SqlConn> {
    id: String,
    conn: C,
    table: String,
    shape: SinkShape,
    columns: Vec<(Field, String)>,
    batch: Vec<Vec<Option<SqlParam>>>,
    batch_size: usize,
    report: SinkReport,
    dropped: u64,
}

impl<C: SqlConn> PostgresSink<C> {
    pub fn new(
        schema: &Schema,
        cfg: &PostgresSinkCfg,
        mut conn: C,
    ) -> SinkResult<PostgresSink<C>> {
        let columns: Vec<(Field, String)> = match cfg.shape {
            SinkShape::Columnar => {
                let mut namer = ColumnNamer::new(SanitizeRules::relational());
                schema
                    .fields
                    .iter()
                    .map(|f| (f.clone(), namer.assign(&f.name)))
                    .collect()
            }
            SinkShape::Flattened => {
                let field = Field::new("data", Kind::Str);
                vec![(field, "data".to_string())]
            }
        };

        let exists = conn.table_exists(&cfg.table)?;
        match (exists, cfg.mode) {
            (true, WriteMode::FailIfExists) => {
                return Err(SinkError::Conflict { target: cfg.table.clone() });
            }
            (true, WriteMode::Overwrite) => {
                info!(table = %cfg.table, "overwrite: truncating existing table");
                conn.execute(
                    &format!("TRUNCATE TABLE {}", quote_ident(&cfg.table)),
                    &[],
                )?;
            }
            (true, WriteMode::Append) => {}
            (false, _) => {
                if !cfg.create_table {
                    return Err(SinkError::MissingTarget {
                        target: cfg.table.clone(),
                    });
                }
                let ddl = create_table_sql(
                    &cfg.table,
                    &columns,
                    cfg.shape,
                    cfg.system_columns,
                );
                debug!(table = %cfg.table, %ddl, "creating table");
                conn.execute(&ddl, &[])?;
            }
        }

        Ok(PostgresSink {
            id: cfg.id.clone(),
            conn,
            table: cfg.table.clone(),
            shape: cfg.shape,
            columns,
            batch: Vec::new(),
            batch_size: cfg.batch_size,
            report: SinkReport::default(),
            dropped: 0,
        })
    }

    /// The connection handle, for inspection in tests.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    fn flush(&mut self) -> SinkResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch_index = self.report.batches as usize;
        let batch_start_rows = self.report.rows_written;

        let ncols = self.columns.len().max(1);
        let rows_per_stmt = (MAX_PARAMS / ncols).max(1);
        let rows: Vec<Vec<Option<SqlParam>>> = self.batch.drain(..).collect();

        for chunk in rows.chunks(rows_per_stmt) {
            let (sql, params) = insert_sql(&self.table, &self.columns, chunk);
            self.conn.execute(&sql, &params).map_err(|e| {
                SinkError::Batch {
                    batch: batch_index,
                    row: batch_start_rows as usize,
                    details: e.to_string().into(),
                }
            })?;
            self.report.rows_written += chunk.len() as u64;
        }
        self.report.batches += 1;
        Ok(())
    }
}

impl<C: SqlConn> RecordSink for PostgresSink<C> {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, name: &str, record: &Value) -> SinkResult<()> {
        let row: Vec<Option<SqlParam>> = match self.shape {
            SinkShape::Columnar => {
                let fields: Vec<Field> =
                    self.columns.iter().map(|(f, _)| f.clone()).collect();
                let cells =
                    record_cells(name, record, &fields, &mut self.dropped);
                fields
                    .iter()
                    .zip(cells)
                    .map(|(field, cell)| cell_param(field, cell))
                    .collect()
            }
            SinkShape::Flattened => {
                let doc = tree_json(record, None, &mut self.dropped);
                vec![Some(SqlParam::Json(doc))]
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
            "relational load complete"
        );
        Ok(self.report)
    }
}

/// Convert a coerced cell into a bound parameter; `None` renders as a
/// literal NULL so parameter types stay unambiguous.
fn cell_param(field: &Field, cell: Cell) -> Option<SqlParam> {
    match cell {
        Cell::Null => None,
        Cell::Str(v) => Some(SqlParam::Text(v)),
        Cell::I32(v) => Some(SqlParam::I32(v)),
        Cell::I64(v) => Some(SqlParam::I64(v)),
        Cell::F64(v) => Some(SqlParam::F64(v)),
        Cell::Bool(v) => Some(SqlParam::Bool(v)),
        Cell::Date(v) => Some(SqlParam::Date(v)),
        Cell::Time(v) => Some(SqlParam::Time(v)),
        Cell::Timestamp(v) => Some(SqlParam::Timestamp(v)),
        Cell::Decimal { unscaled, scale, .. } => {
            // bound as float8; the assignment cast to numeric is implicit
            Some(SqlParam::F64(unscaled as f64 / 10f64.powi(scale as i32)))
        }
        list @ Cell::List(_) | list @ Cell::Struct(_) => {
            let kind = if field.is_repeated() {
                field.element_kind()
            } else {
                &field.kind
            };
            Some(SqlParam::Json(cell_json(
                &list,
                kind,
                &SanitizeRules::relational(),
                false,
            )))
        }
    }
}

fn create_table_sql(
    table: &str,
    columns: &[(Field, String)],
    shape: SinkShape,
    system_columns: bool,
) -> String {
    let mut defs: Vec<String> = Vec::new();
    if system_columns {
        defs.push("id bigserial primary key".to_string());
        defs.push("loaded_at timestamptz not null default now()".to_string());
    }
    match shape {
        SinkShape::Columnar => {
            for (field, col) in columns {
                defs.push(format!("{} {}", quote_ident(col), pg_type(field)));
            }
        }
        SinkShape::Flattened => defs.push("data jsonb".to_string()),
    }
    format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", "))
}

fn insert_sql(
    table: &str,
    columns: &[(Field, String)],
    rows: &[Vec<Option<SqlParam>>],
) -> (String, Vec<SqlParam>) {
    let col_list: Vec<String> =
        columns.iter().map(|(_, c)| quote_ident(c)).collect();
    let mut params: Vec<SqlParam> = Vec::new();
    let mut groups: Vec<String> = Vec::with_capacity(rows.len());
    for row in rows {
        let mut placeholders: Vec<String> = Vec::with_capacity(row.len());
        for slot in row {
            match slot {
                Some(param) => {
                    let cast = cast_suffix(param);
                    params.push(param.clone());
                    placeholders.push(format!("${}{}", params.len(), cast));
                }
                None => placeholders.push("NULL".to_string()),
            }
        }
        groups.push(format!("({})", placeholders.join(", ")));
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        col_list.join(", "),
        groups.join(", ")
    );
    (sql, params)
}

/// SQL type for a column. Nested and repeated fields land in `jsonb`.
fn pg_type(field: &Field) -> String {
    if field.is_repeated() || matches!(field.kind, Kind::Struct(_)) {
        return "jsonb".to_string();
    }
    match &field.kind {
        Kind::Str => "text".to_string(),
        Kind::I32 => "integer".to_string(),
        Kind::I64 => "bigint".to_string(),
        Kind::F64 => "double precision".to_string(),
        Kind::Bool => "boolean".to_string(),
        Kind::Date => "date".to_string(),
        Kind::Time => "time".to_string(),
        Kind::Timestamp => "timestamptz".to_string(),
        Kind::Decimal { precision, scale } => {
            format!("numeric({precision},{scale})")
        }
        Kind::Array(_) | Kind::Struct(_) => "jsonb".to_string(),
    }
}

/// Placeholder cast for parameter types the server would otherwise infer
/// from the column. Floats carry an explicit `float8` so a numeric target
/// column takes the implicit assignment cast instead of rebinding the
/// parameter type.
fn cast_suffix(param: &SqlParam) -> &'static str {
    match param {
        SqlParam::F64(_) => "::float8",
        _ => "",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sql_types_and_system_columns() {
        let columns = vec![
            (Field::new("age", Kind::I32), "age".to_string()),
            (
                Field::new("price", Kind::Decimal { precision: 10, scale: 2 }),
                "price".to_string(),
            ),
            (
                Field {
                    name: "book".into(),
                    kind: Kind::Struct(vec![Field::new("t", Kind::Str)]),
                    nullable: false,
                    repeating: true,
                },
                "book".to_string(),
            ),
        ];
        let sql =
            create_table_sql("books", &columns, SinkShape::Columnar, true);
        assert!(sql.starts_with("CREATE TABLE \"books\""));
        assert!(sql.contains("id bigserial primary key"));
        assert!(sql.contains("loaded_at timestamptz not null default now()"));
        assert!(sql.contains("\"age\" integer"));
        assert!(sql.contains("\"price\" numeric(10,2)"));
        assert!(sql.contains("\"book\" jsonb"));
    }

    #[test]
    fn flattened_create_is_a_single_data_column() {
        let sql = create_table_sql("t", &[], SinkShape::Flattened, false);
        assert_eq!(sql, "CREATE TABLE \"t\" (data jsonb)");
    }

    #[test]
    fn insert_sql_numbers_params_and_inlines_nulls() {
        let columns = vec![
            (Field::new("a", Kind::I32), "a".to_string()),
            (Field::new("b", Kind::Str), "b".to_string()),
        ];
        let rows = vec![
            vec![Some(SqlParam::I32(1)), None],
            vec![Some(SqlParam::I32(2)), Some(SqlParam::Text("x".into()))],
        ];
        let (sql, params) = insert_sql("t", &columns, &rows);
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, NULL), ($2, $3)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
