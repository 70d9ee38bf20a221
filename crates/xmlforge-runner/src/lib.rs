//! The run orchestrator.
//!
//! Deliberately thin: wire the extractor, resolver, inference engine and
//! sinks together from a resolved job spec, fold the record stream into
//! the sinks, and report totals. No business logic lives here.

mod run;

pub use run::{run, schema_report, RunError, RunReport};
