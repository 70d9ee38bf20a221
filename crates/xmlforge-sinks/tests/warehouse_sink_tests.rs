use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use xmlforge_config::WarehouseSinkCfg;
use xmlforge_core::{
    Field, Kind, RecordSink, Schema, SinkError, SinkResult, SinkShape, Value,
    WriteMode,
};
use xmlforge_sinks::{TableRef, WarehouseApi, WarehouseSink};

#[derive(Debug, Default)]
struct ApiState {
    exists: bool,
    created_schema: Option<serde_json::Value>,
    truncates: usize,
    batches: Vec<Vec<serde_json::Value>>,
    reject_row: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct FakeApi(Rc<RefCell<ApiState>>);

impl WarehouseApi for FakeApi {
    fn table_exists(&mut self, _table: &TableRef) -> SinkResult<bool> {
        Ok(self.0.borrow().exists)
    }

    fn create_table(
        &mut self,
        _table: &TableRef,
        schema_fields: &serde_json::Value,
    ) -> SinkResult<()> {
        let mut state = self.0.borrow_mut();
        state.exists = true;
        state.created_schema = Some(schema_fields.clone());
        Ok(())
    }

    fn truncate(&mut self, _table: &TableRef) -> SinkResult<()> {
        self.0.borrow_mut().truncates += 1;
        Ok(())
    }

    fn insert_rows(
        &mut self,
        _table: &TableRef,
        rows: &[serde_json::Value],
    ) -> SinkResult<()> {
        let mut state = self.0.borrow_mut();
        if let Some(row) = state.reject_row {
            return Err(SinkError::Batch {
                batch: 0,
                row,
                details: "no such field: phone".into(),
            });
        }
        state.batches.push(rows.to_vec());
        Ok(())
    }
}

fn cfg(shape: SinkShape, mode: WriteMode) -> WarehouseSinkCfg {
    WarehouseSinkCfg {
        id: "wh-out".into(),
        endpoint: "http://localhost:9050/bigquery/v2".into(),
        project: "test-project".into(),
        dataset: "music_metadata".into(),
        table: "release_notifications".into(),
        token: None,
        shape,
        mode,
        create_table: true,
        batch_size: 500,
        timeout_secs: 30,
    }
}

fn age_schema() -> Schema {
    Schema::new("root", vec![Field::new("age", Kind::I32)])
}

#[test]
fn creates_missing_table_with_widened_types() {
    let api = FakeApi::default();
    let schema = Schema::new(
        "root",
        vec![
            Field::new("age", Kind::I32),
            Field::new("price", Kind::Decimal { precision: 10, scale: 2 }),
        ],
    );
    let sink =
        WarehouseSink::new(&schema, &cfg(SinkShape::Columnar, WriteMode::Append), api.clone())
            .unwrap();
    drop(sink);

    let state = api.0.borrow();
    let fields = state.created_schema.as_ref().unwrap();
    assert_eq!(fields[0]["type"], "INT64", "I32 widens to INT64");
    assert_eq!(fields[1]["type"], "FLOAT64", "decimal widens to FLOAT64");
}

#[test]
fn overwrite_truncates_existing_table() {
    let api = FakeApi::default();
    api.0.borrow_mut().exists = true;
    let mut sink = WarehouseSink::new(
        &age_schema(),
        &cfg(SinkShape::Columnar, WriteMode::Overwrite),
        api.clone(),
    )
    .unwrap();
    for age in ["1", "2", "3"] {
        sink.write("age", &Value::Text(age.into())).unwrap();
    }
    let report = sink.finish().unwrap();
    assert_eq!(report.rows_written, 3);
    let state = api.0.borrow();
    assert_eq!(state.truncates, 1);
    assert!(state.created_schema.is_none(), "existing table is not recreated");
}

#[test]
fn append_does_not_truncate() {
    let api = FakeApi::default();
    api.0.borrow_mut().exists = true;
    let mut sink = WarehouseSink::new(
        &age_schema(),
        &cfg(SinkShape::Columnar, WriteMode::Append),
        api.clone(),
    )
    .unwrap();
    sink.write("age", &Value::Text("1".into())).unwrap();
    sink.finish().unwrap();
    assert_eq!(api.0.borrow().truncates, 0);
}

#[test]
fn fail_if_exists_conflicts() {
    let api = FakeApi::default();
    api.0.borrow_mut().exists = true;
    let err = WarehouseSink::new(
        &age_schema(),
        &cfg(SinkShape::Columnar, WriteMode::FailIfExists),
        api,
    )
    .unwrap_err();
    assert!(matches!(err, SinkError::Conflict { .. }));
}

#[test]
fn missing_table_without_create_is_an_error() {
    let api = FakeApi::default();
    let config = WarehouseSinkCfg {
        create_table: false,
        ..cfg(SinkShape::Columnar, WriteMode::Append)
    };
    let err =
        WarehouseSink::new(&age_schema(), &config, api).unwrap_err();
    assert!(matches!(err, SinkError::MissingTarget { .. }));
}

#[test]
fn batches_flush_at_the_limit_and_on_finish() {
    let api = FakeApi::default();
    let config = WarehouseSinkCfg {
        batch_size: 2,
        ..cfg(SinkShape::Columnar, WriteMode::Append)
    };
    let mut sink =
        WarehouseSink::new(&age_schema(), &config, api.clone()).unwrap();
    for i in 0..5 {
        sink.write("age", &Value::Text(i.to_string())).unwrap();
    }
    let report = sink.finish().unwrap();
    assert_eq!(report.rows_written, 5);
    assert_eq!(report.batches, 3);
    let state = api.0.borrow();
    assert_eq!(state.batches.len(), 3);
    assert_eq!(state.batches[0].len(), 2);
    assert_eq!(state.batches[2].len(), 1, "tail batch flushes on finish");
}

#[test]
fn batch_errors_carry_the_batch_index() {
    let api = FakeApi::default();
    api.0.borrow_mut().reject_row = Some(1);
    let mut sink = WarehouseSink::new(
        &age_schema(),
        &cfg(SinkShape::Columnar, WriteMode::Append),
        api,
    )
    .unwrap();
    sink.write("age", &Value::Text("1".into())).unwrap();
    let err = sink.finish().unwrap_err();
    match err {
        SinkError::Batch { batch, row, details } => {
            assert_eq!(batch, 0);
            assert_eq!(row, 1);
            assert!(details.contains("phone"));
        }
        other => panic!("expected batch error, got {other}"),
    }
}

#[test]
fn columnar_rows_key_by_sanitized_column() {
    let api = FakeApi::default();
    let mut sink = WarehouseSink::new(
        &age_schema(),
        &cfg(SinkShape::Columnar, WriteMode::Append),
        api.clone(),
    )
    .unwrap();
    sink.write("age", &Value::Text("30".into())).unwrap();
    sink.finish().unwrap();
    let state = api.0.borrow();
    assert_eq!(state.batches[0][0], json!({"age": 30}));
}

#[test]
fn flattened_rows_are_name_value_pairs() {
    let api = FakeApi::default();
    let mut sink = WarehouseSink::new(
        &Schema::new("root", vec![]),
        &cfg(SinkShape::Flattened, WriteMode::Append),
        api.clone(),
    )
    .unwrap();
    let mut rec = Value::record();
    rec.push_child("MessageId", Value::Text("MSG-1".into()));
    rec.push_child("ISRC", Value::Text("USX9P2400001".into()));
    sink.write("release", &rec).unwrap();
    sink.finish().unwrap();

    let state = api.0.borrow();
    assert_eq!(
        state.batches[0][0],
        json!({"fields": [
            {"name": "MessageId", "value": "MSG-1"},
            {"name": "ISRC", "value": "USX9P2400001"},
        ]})
    );
    let created = state.created_schema.as_ref().unwrap();
    assert_eq!(created[0]["name"], "fields");
    assert_eq!(created[0]["mode"], "REPEATED");
    assert_eq!(created[0]["type"], "RECORD");
}
