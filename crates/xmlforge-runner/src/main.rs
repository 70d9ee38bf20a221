use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use xmlforge_config::load_from_path;
use xmlforge_runner::{run, schema_report};

#[derive(Parser, Debug)]
#[command(
    name = "xmlforge",
    about = "Stream XML documents into JSON, Parquet, warehouse and relational sinks"
)]
struct Args {
    /// Path to the job spec YAML.
    #[arg(short, long)]
    config: String,

    /// Infer and print the unified schema, then exit without writing.
    #[arg(long)]
    schema_only: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Log level or filter string; RUST_LOG wins when set.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    xmlforge_o11y::init_all(&xmlforge_o11y::O11yConfig {
        logging: xmlforge_o11y::logging::Config {
            level: args.log_level.clone(),
            json: args.log_json,
            with_targets: false,
        },
        install_panic_hook: true,
    });

    let spec = load_from_path(&args.config).context("loading job spec")?;
    debug!(job = %spec.metadata.name, "job spec loaded");

    if args.schema_only {
        let outline = schema_report(&spec)?;
        print!("{outline}");
        return Ok(());
    }

    run(&spec)?;
    Ok(())
}
