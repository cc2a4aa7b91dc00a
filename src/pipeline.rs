//! End-to-end orchestration: extract → normalize → assemble → relationships → load.

use std::collections::HashSet;
use std::time::Instant;

use indexmap::IndexMap;
use indicatif::{HumanCount, HumanDuration};
use tracing::info;

use crate::common::{Table, TransformError};
use crate::config::PipelineConfig;
use crate::facts::{Assembly, assemble};
use crate::normalize::normalize;
use crate::relationship::{RelationshipTable, extract_relationships, referenced_columns};
use crate::sink::{
    CsvSink, GraphConfig, LoadSummary, Neo4jSink, ParquetSink, SinkError, SinkKind, load,
};

/// Everything the transform stage produces.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub assembly: Assembly,
    pub relationships: IndexMap<String, RelationshipTable>,
}

impl Transformed {
    /// Every dimension and fact table, in build order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.assembly.tables().map(|d| &d.table)
    }
}

/// Normalize `raw`, build every group and extract every relationship.
pub fn transform(raw: Table, config: &PipelineConfig) -> Result<Transformed, TransformError> {
    let start = Instant::now();

    info!("Step 2: Normalizing columns...");
    let table = normalize(raw, &config.normalize)?;
    info!(
        "  {} rows x {} columns after normalization",
        HumanCount(table.num_rows() as u64),
        table.num_columns()
    );

    info!(
        "Step 3: Building {} dimensions and {} facts...",
        config.dimensions.len(),
        config.facts.len()
    );
    let reserved: HashSet<String> = referenced_columns(&config.relationships)
        .map(str::to_string)
        .collect();
    let assembly = assemble(
        table,
        &config.dimensions,
        &config.facts,
        config.key_columns,
        &reserved,
    )?;

    info!(
        "Step 4: Extracting {} relationships...",
        config.relationships.len()
    );
    let relationships = extract_relationships(&assembly.working, &config.relationships)?;

    info!("  Transform done in {}", HumanDuration(start.elapsed()));
    Ok(Transformed {
        assembly,
        relationships,
    })
}

/// Write the transformed schema to the sink named by `config.sink`.
pub async fn run_load(
    transformed: &Transformed,
    config: &PipelineConfig,
) -> Result<LoadSummary, SinkError> {
    let sink = &config.sink;
    info!("Step 5: Loading into {:?} sink...", sink.kind);
    match sink.kind {
        SinkKind::Csv => {
            info!("  Output: {}", sink.output_dir.display());
            let csv = CsvSink::new(&sink.output_dir);
            load(&csv, transformed.tables(), &transformed.relationships).await
        }
        SinkKind::Parquet => {
            info!("  Output: {}", sink.output_dir.display());
            let parquet = ParquetSink::new(&sink.output_dir, sink.batch_size);
            load(&parquet, transformed.tables(), &transformed.relationships).await
        }
        SinkKind::Neo4j => {
            let graph_config = GraphConfig::from_env()?;
            info!(
                "  Server: {} (database {})",
                graph_config.uri, graph_config.database
            );
            let graph = Neo4jSink::new(graph_config, sink.batch_size, sink.max_concurrent)?;
            graph.ping().await?;
            load(&graph, transformed.tables(), &transformed.relationships).await
        }
    }
}
