use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;
use xmlforge_config::{ConfigError, InferenceMode, JobSpec};
use xmlforge_core::{BoxDynSink, Schema, SinkError, SinkResult};
use xmlforge_schema::{infer_schema, schema_outline, NoExternal, SchemaError};
use xmlforge_sinks::build_sink;
use xmlforge_source::{InputError, RecordReader};
use xmlforge_xsd::{HttpFetcher, ResolutionError, XsdResolver};

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Totals reported at end of run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records_read: u64,
    pub rows_written: u64,
    /// Aggregated per-cell coercion failures across all sinks.
    pub cells_dropped: u64,
    pub elapsed: Duration,
}

/// Execute a job: infer the schema, build the sinks, stream every record
/// into every sink, and report totals.
pub fn run(spec: &JobSpec) -> Result<RunReport, RunError> {
    spec.validate()?;
    let started = Instant::now();
    let job = &spec.metadata.name;
    info!(job = %job, input = %spec.spec.input.path, "run starting");

    let schema = unified_schema(spec)?;
    let mut sinks: Vec<BoxDynSink> = spec
        .spec
        .sinks
        .iter()
        .map(|cfg| build_sink(&schema, cfg))
        .collect::<SinkResult<_>>()?;

    let input = &spec.spec.input;
    let reader = RecordReader::open(Path::new(&input.path))?
        .with_filter(input.record_element.clone())
        .with_window(input.window.map(|w| (w.start, w.end)));

    // Synchronous fold: the source advances only once every sink has
    // accepted the previous record.
    let mut records_read = 0u64;
    for item in reader {
        let (name, tree) = item?;
        for sink in sinks.iter_mut() {
            sink.write(&name, &tree)?;
        }
        records_read += 1;
    }

    let mut rows_written = 0u64;
    let mut cells_dropped = 0u64;
    for sink in sinks.iter_mut() {
        let report = sink.finish()?;
        info!(
            job = %job,
            sink_id = sink.id(),
            rows = report.rows_written,
            dropped = report.cells_dropped,
            batches = report.batches,
            "sink finished"
        );
        rows_written += report.rows_written;
        cells_dropped += report.cells_dropped;
    }

    let report = RunReport {
        records_read,
        rows_written,
        cells_dropped,
        elapsed: started.elapsed(),
    };
    info!(
        job = %job,
        records = report.records_read,
        rows = report.rows_written,
        dropped = report.cells_dropped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run complete"
    );
    Ok(report)
}

/// Infer the schema only and render it as an operator-readable outline.
pub fn schema_report(spec: &JobSpec) -> Result<String, RunError> {
    spec.validate()?;
    let schema = unified_schema(spec)?;
    Ok(schema_outline(&schema))
}

fn unified_schema(spec: &JobSpec) -> Result<Schema, RunError> {
    let input = &spec.spec.input;
    let inference = &spec.spec.inference;
    let wants_external = matches!(
        inference.mode,
        InferenceMode::External | InferenceMode::Hybrid
    );
    let schema = if wants_external && inference.resolver.enabled {
        let fetcher = HttpFetcher::new(Duration::from_secs(
            inference.resolver.timeout_secs,
        ))?;
        let resolver = XsdResolver::new(fetcher, true);
        infer_schema(input, inference, &resolver)?
    } else {
        infer_schema(input, inference, &NoExternal)?
    };
    Ok(schema)
}
