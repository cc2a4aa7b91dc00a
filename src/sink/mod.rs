//! Sinks: where the star schema ends up.
//!
//! A [`Sink`] persists whole tables (dimensions and facts, one node label or
//! file each) and relationship tables (one edge type or file each). [`load`]
//! drives a sink over a transformed schema: every table first, then every
//! relationship, since edges are matched against already-loaded nodes.

mod file;
mod graph;

pub use file::{CsvSink, ParquetSink};
pub use graph::{GraphConfig, Neo4jSink};

use std::future::Future;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use indexmap::IndexMap;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::common::Table;
use crate::relationship::RelationshipTable;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse graph response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found in environment")]
    EnvNotFound(String),

    #[error("graph store rejected the connection: {0}")]
    Connectivity(String),

    #[error("relationship {relationship}: no node for endpoint ({src} -> {dst})")]
    EndpointNotFound {
        relationship: String,
        src: String,
        dst: String,
    },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Csv,
    Parquet,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Output directory for the file sinks.
    pub output_dir: PathBuf,
    /// Rows per write batch (graph transaction, Parquet row group).
    pub batch_size: usize,
    /// Batches of one table that may be in flight at once.
    pub max_concurrent: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Csv,
            output_dir: PathBuf::from("output"),
            batch_size: 1000,
            max_concurrent: 1,
        }
    }
}

// ============================================================================
// Sink Trait
// ============================================================================

/// Outcome of persisting one table or relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub rows_written: u64,
    /// Relationship rows whose endpoints matched no node.
    pub unresolved: u64,
    pub failed_batches: u64,
}

impl WriteReport {
    fn absorb(&mut self, other: WriteReport) {
        self.rows_written += other.rows_written;
        self.unresolved += other.unresolved;
        self.failed_batches += other.failed_batches;
    }
}

pub trait Sink {
    /// Persist a dimension or fact table under `name` (file name or node label).
    fn persist_table(
        &self,
        table: &Table,
        name: &str,
    ) -> impl Future<Output = Result<WriteReport, SinkError>>;

    /// Persist a relationship table under `name`. The rule carried by
    /// `relationship` names the endpoint labels and key columns.
    fn persist_relationship(
        &self,
        relationship: &RelationshipTable,
        name: &str,
    ) -> impl Future<Output = Result<WriteReport, SinkError>>;
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub tables: usize,
    pub nodes: WriteReport,
    pub relationships: usize,
    pub edges: WriteReport,
}

/// Persist every table, then every relationship.
///
/// A sink error aborts the load; per-row and per-batch failures are already
/// folded into the reports.
pub async fn load<'a, S: Sink>(
    sink: &S,
    tables: impl IntoIterator<Item = &'a Table>,
    relationships: &IndexMap<String, RelationshipTable>,
) -> Result<LoadSummary, SinkError> {
    let mut summary = LoadSummary::default();

    let start = Instant::now();
    for table in tables {
        let report = sink.persist_table(table, &table.name).await?;
        info!(
            "  {:<16} {:>8} rows written",
            table.name,
            HumanCount(report.rows_written)
        );
        summary.nodes.absorb(report);
        summary.tables += 1;
    }
    info!(
        "  Tables done: {} tables, {} rows in {}",
        summary.tables,
        HumanCount(summary.nodes.rows_written),
        HumanDuration(start.elapsed())
    );

    let start = Instant::now();
    for (id, relationship) in relationships {
        let report = sink.persist_relationship(relationship, id).await?;
        info!(
            "  {:<24} {:>8} written, {} unresolved",
            id,
            HumanCount(report.rows_written),
            report.unresolved
        );
        summary.edges.absorb(report);
        summary.relationships += 1;
    }
    info!(
        "  Relationships done: {} relationships, {} pairs in {}",
        summary.relationships,
        HumanCount(summary.edges.rows_written),
        HumanDuration(start.elapsed())
    );

    Ok(summary)
}

// ============================================================================
// Batching helpers
// ============================================================================

/// Split `0..len` into consecutive ranges of at most `batch_size`.
pub fn batch_ranges(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    let mut ranges = Vec::with_capacity(len.div_ceil(batch_size));
    let mut start = 0;
    while start < len {
        let end = (start + batch_size).min(len);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

fn batch_progress(num_batches: usize, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(num_batches as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "  {msg:<24} {bar:40.cyan/blue} {pos}/{len} batches [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    pb.set_message(name.to_string());
    pb
}
