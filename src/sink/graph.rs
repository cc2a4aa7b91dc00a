//! Graph sink: Neo4j over its HTTP transactional endpoint.
//!
//! Every batch is sent as one `tx/commit` request, which the server runs as a
//! single transaction. Nodes are `MERGE`d on all of their non-null columns, so
//! repeated loads converge on the same node set. Relationship rows `MATCH` both
//! endpoints by key column and `MERGE` the edge; rows whose endpoints are not
//! found are logged and counted, not fatal.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::{debug, error, warn};

use super::{Sink, SinkError, WriteReport, batch_progress, batch_ranges};
use crate::common::{Table, Value};
use crate::relationship::RelationshipTable;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Base HTTP URL of the server, e.g. `http://localhost:7474`.
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub request_timeout: Duration,
}

impl GraphConfig {
    /// Read `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and optionally `NEO4J_DATABASE`.
    pub fn from_env() -> Result<Self, SinkError> {
        let var = |name: &str| std::env::var(name).map_err(|_| SinkError::EnvNotFound(name.to_string()));
        Ok(Self {
            uri: var("NEO4J_URI")?,
            user: var("NEO4J_USER")?,
            password: var("NEO4J_PASSWORD")?,
            database: std::env::var("NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string()),
            request_timeout: Duration::from_secs(60),
        })
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.uri.trim_end_matches('/'),
            self.database
        )
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct CommitRequest {
    statements: Vec<Statement>,
}

#[derive(Debug, Serialize)]
struct Statement {
    statement: String,
    parameters: Json,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Deserialize)]
struct ResultRow {
    row: Vec<Json>,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

// ============================================================================
// Cypher generation
// ============================================================================

/// Quote a label, relationship type or property key for Cypher.
fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// `MERGE` statements for a batch of node rows.
///
/// Rows are grouped by which columns are non-null, since `MERGE` cannot match
/// on a null property; each group becomes one `UNWIND` statement.
fn node_statements(label: &str, columns: &[String], rows: &[Vec<Value>]) -> Vec<Statement> {
    let mut groups: BTreeMap<Vec<usize>, Vec<Json>> = BTreeMap::new();
    for row in rows {
        let present: Vec<usize> = (0..columns.len()).filter(|&i| !row[i].is_null()).collect();
        let props: Map<String, Json> = present
            .iter()
            .map(|&i| (columns[i].clone(), value_to_json(&row[i])))
            .collect();
        groups.entry(present).or_default().push(Json::Object(props));
    }

    groups
        .into_iter()
        .map(|(present, params)| {
            let keys = present
                .iter()
                .map(|&i| format!("{k}: row.{k}", k = quote(&columns[i])))
                .collect::<Vec<_>>()
                .join(", ");
            Statement {
                statement: format!("UNWIND $rows AS row MERGE (n:{} {{{keys}}})", quote(label)),
                parameters: json!({ "rows": params }),
            }
        })
        .collect()
}

/// The `MATCH ... MERGE` statement for a batch of relationship rows. Returns
/// the `idx` of every row whose edge was merged.
fn relationship_statement(relationship: &RelationshipTable, rows: &[Vec<Value>], offset: usize) -> Statement {
    let rule = &relationship.rule;
    let params: Vec<Json> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            json!({
                "idx": offset + i,
                "src": value_to_json(&row[0]),
                "dst": value_to_json(&row[1]),
            })
        })
        .collect();
    Statement {
        statement: format!(
            "UNWIND $rows AS row \
             MATCH (a:{} {{{}: row.src}}) \
             MATCH (b:{} {{{}: row.dst}}) \
             MERGE (a)-[:{}]->(b) \
             RETURN DISTINCT row.idx",
            quote(&rule.source_label),
            quote(&rule.source_key),
            quote(&rule.destination_label),
            quote(&rule.destination_key),
            quote(&rule.name),
        ),
        parameters: json!({ "rows": params }),
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Int(v) => Json::from(*v),
        Value::Text(s) => Json::from(s.as_str()),
    }
}

// ============================================================================
// Implementation
// ============================================================================

pub struct Neo4jSink {
    client: Client,
    config: GraphConfig,
    batch_size: usize,
    max_concurrent: usize,
}

impl Neo4jSink {
    pub fn new(config: GraphConfig, batch_size: usize, max_concurrent: usize) -> Result<Self, SinkError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            config,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        })
    }

    /// Check that the server is reachable and accepts the credentials.
    pub async fn ping(&self) -> Result<(), SinkError> {
        let statement = Statement {
            statement: "RETURN 1".to_string(),
            parameters: json!({}),
        };
        self.commit(vec![statement])
            .await?
            .map(|_| ())
            .map_err(SinkError::Connectivity)
    }

    /// Send one transaction.
    ///
    /// Transport and authentication failures are `Err`. Any other non-success
    /// status, and errors the server reports for the statements, come back as
    /// `Ok(Err(message))` so the caller can count the batch as failed and move on.
    async fn commit(&self, statements: Vec<Statement>) -> Result<Result<Vec<StatementResult>, String>, SinkError> {
        debug!("Graph commit: {} statements", statements.len());

        let response = self
            .client
            .post(self.config.commit_url())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&CommitRequest { statements })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Connectivity(format!("status={status}, body={body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(Err(format!("status={status}, body={body}")));
        }

        let bytes = response.bytes().await?;
        let parsed: CommitResponse = serde_json::from_slice(&bytes)?;
        if let Some(first) = parsed.errors.first() {
            if first.code.contains("Security") {
                return Err(SinkError::Connectivity(format!("{}: {}", first.code, first.message)));
            }
            let messages: Vec<String> = parsed
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            return Ok(Err(messages.join("; ")));
        }
        Ok(Ok(parsed.results))
    }

    async fn write_node_batch(&self, table: &Table, label: &str, rows: &[Vec<Value>]) -> Result<WriteReport, SinkError> {
        let statements = node_statements(label, table.columns(), rows);
        match self.commit(statements).await? {
            Ok(_) => Ok(WriteReport {
                rows_written: rows.len() as u64,
                ..Default::default()
            }),
            Err(message) => {
                error!("  {label}: batch of {} rows failed: {message}", rows.len());
                Ok(WriteReport {
                    failed_batches: 1,
                    ..Default::default()
                })
            }
        }
    }

    async fn write_edge_batch(
        &self,
        relationship: &RelationshipTable,
        name: &str,
        rows: &[Vec<Value>],
        offset: usize,
    ) -> Result<WriteReport, SinkError> {
        let statement = relationship_statement(relationship, rows, offset);
        let results = match self.commit(vec![statement]).await? {
            Ok(results) => results,
            Err(message) => {
                error!("  {name}: batch of {} rows failed: {message}", rows.len());
                return Ok(WriteReport {
                    failed_batches: 1,
                    ..Default::default()
                });
            }
        };

        let merged: HashSet<u64> = results
            .iter()
            .flat_map(|r| r.data.iter())
            .filter_map(|d| d.row.first().and_then(Json::as_u64))
            .collect();

        let mut unresolved = 0u64;
        for (i, row) in rows.iter().enumerate() {
            if !merged.contains(&((offset + i) as u64)) {
                let err = SinkError::EndpointNotFound {
                    relationship: relationship.rule.name.clone(),
                    src: row[0].to_string(),
                    dst: row[1].to_string(),
                };
                warn!("  {err}");
                unresolved += 1;
            }
        }

        Ok(WriteReport {
            rows_written: rows.len() as u64 - unresolved,
            unresolved,
            failed_batches: 0,
        })
    }
}

impl Sink for Neo4jSink {
    async fn persist_table(&self, table: &Table, name: &str) -> Result<WriteReport, SinkError> {
        let ranges = batch_ranges(table.num_rows(), self.batch_size);
        let pb = batch_progress(ranges.len(), name);

        let mut batches = stream::iter(ranges)
            .map(|range| self.write_node_batch(table, name, &table.rows()[range]))
            .buffered(self.max_concurrent);

        let mut report = WriteReport::default();
        while let Some(batch) = batches.next().await {
            report.absorb(batch?);
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(report)
    }

    async fn persist_relationship(
        &self,
        relationship: &RelationshipTable,
        name: &str,
    ) -> Result<WriteReport, SinkError> {
        let rows = relationship.table.rows();
        let ranges = batch_ranges(rows.len(), self.batch_size);
        let pb = batch_progress(ranges.len(), name);

        let mut batches = stream::iter(ranges)
            .map(|range| {
                let offset = range.start;
                self.write_edge_batch(relationship, name, &rows[range], offset)
            })
            .buffered(self.max_concurrent);

        let mut report = WriteReport::default();
        while let Some(batch) = batches.next().await {
            report.absorb(batch?);
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(report)
    }
}
