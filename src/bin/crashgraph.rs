//! Crash-records ETL binary: turns the flat ARDD fatality export into a star
//! schema of dimension and fact tables plus relationship tables, and writes
//! them to CSV files, Parquet files or a Neo4j database.
//!
//! ## Usage
//!
//! ```sh
//! # Built-in ARDD configuration, CSV output under ./output
//! cargo run --release --bin crashgraph
//!
//! # Load into Neo4j (NEO4J_URI, NEO4J_USER, NEO4J_PASSWORD must be set)
//! cargo run --release --bin crashgraph -- --sink neo4j --batch-size 500
//! ```

use std::path::PathBuf;

use clap::Parser;
use indicatif::{HumanCount, HumanDuration};
use tracing::{info, warn};

use crashgraph::config::PipelineConfig;
use crashgraph::extract::extract;
use crashgraph::pipeline::{run_load, transform};
use crashgraph::sink::SinkKind;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(about = "Build a crash star schema and load it into a sink")]
struct Args {
    /// Pipeline configuration JSON. Defaults to the built-in ARDD layout.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input CSV, overriding `input.path` from the configuration.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Where to write the result.
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,

    /// Output directory for the csv and parquet sinks.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Rows per write batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum number of concurrent graph transactions per table.
    #[arg(long)]
    max_concurrent: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::embedded()?,
    };
    if let Some(input) = args.input {
        config.input.path = input;
    }
    if let Some(kind) = args.sink {
        config.sink.kind = kind;
    }
    if let Some(dir) = args.output_dir {
        config.sink.output_dir = dir;
    }
    if let Some(n) = args.batch_size {
        config.sink.batch_size = n;
    }
    if let Some(n) = args.max_concurrent {
        config.sink.max_concurrent = n;
    }
    config.validate()?;

    info!("Input:  {}", config.input.path.display());
    info!("Sink:   {:?}", config.sink.kind);

    let pipeline_start = std::time::Instant::now();

    // ── Step 1: Extract ─────────────────────────────────────────────────
    info!("Step 1: Reading input...");
    let raw = extract(&config.input.path, config.input.drop_na)?;

    // ── Steps 2-4: Transform ────────────────────────────────────────────
    let transformed = transform(raw, &config)?;

    // ── Step 5: Load ────────────────────────────────────────────────────
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = rt.block_on(run_load(&transformed, &config))?;

    let elapsed = pipeline_start.elapsed();
    info!("Pipeline complete in {}!", HumanDuration(elapsed));
    info!(
        "  Tables: {} ({} rows)",
        summary.tables,
        HumanCount(summary.nodes.rows_written)
    );
    info!(
        "  Relationships: {} ({} pairs)",
        summary.relationships,
        HumanCount(summary.edges.rows_written)
    );
    if summary.edges.unresolved > 0 {
        warn!(
            "  {} relationship rows had no matching endpoint",
            HumanCount(summary.edges.unresolved)
        );
    }
    let failed = summary.nodes.failed_batches + summary.edges.failed_batches;
    if failed > 0 {
        warn!("  {failed} batches failed; see errors above");
    }

    Ok(())
}
