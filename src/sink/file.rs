//! File sinks: one CSV or Parquet file per table and per relationship.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use super::{Sink, SinkError, WriteReport, batch_ranges};
use crate::common::{Table, Value};
use crate::relationship::RelationshipTable;

fn prepare_path(dir: &Path, name: &str, extension: &str) -> Result<PathBuf, SinkError> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(format!("{name}.{extension}")))
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, table: &Table, name: &str) -> Result<WriteReport, SinkError> {
        let path = prepare_path(&self.dir, name, "csv")?;
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(Value::to_string))?;
        }
        writer.flush()?;
        debug!("  Wrote {}", path.display());
        Ok(WriteReport {
            rows_written: table.num_rows() as u64,
            ..Default::default()
        })
    }
}

impl Sink for CsvSink {
    async fn persist_table(&self, table: &Table, name: &str) -> Result<WriteReport, SinkError> {
        self.write(table, name)
    }

    async fn persist_relationship(
        &self,
        relationship: &RelationshipTable,
        name: &str,
    ) -> Result<WriteReport, SinkError> {
        self.write(&relationship.table, name)
    }
}

// ============================================================================
// Parquet
// ============================================================================

/// Writes one Parquet file per table; each batch of rows becomes a row group.
pub struct ParquetSink {
    dir: PathBuf,
    batch_size: usize,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            dir: dir.into(),
            batch_size,
        }
    }

    fn write(&self, table: &Table, name: &str) -> Result<WriteReport, SinkError> {
        let path = prepare_path(&self.dir, name, "parquet")?;
        let schema = arrow_schema(table);

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(self.batch_size.max(1))
            .build();
        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        for range in batch_ranges(table.num_rows(), self.batch_size) {
            let batch = record_batch(&schema, &table.rows()[range])?;
            writer.write(&batch)?;
        }
        writer.close()?;

        debug!("  Wrote {}", path.display());
        Ok(WriteReport {
            rows_written: table.num_rows() as u64,
            ..Default::default()
        })
    }
}

impl Sink for ParquetSink {
    async fn persist_table(&self, table: &Table, name: &str) -> Result<WriteReport, SinkError> {
        self.write(table, name)
    }

    async fn persist_relationship(
        &self,
        relationship: &RelationshipTable,
        name: &str,
    ) -> Result<WriteReport, SinkError> {
        self.write(&relationship.table, name)
    }
}

/// A column is `Int64` when it has at least one value and every value is an
/// integer; anything else is `Utf8`. All columns are nullable.
fn arrow_schema(table: &Table) -> SchemaRef {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(ci, name)| {
            let mut values = table.rows().iter().map(|row| &row[ci]).filter(|v| !v.is_null());
            let has_values = values.clone().next().is_some();
            let data_type = if has_values && values.all(|v| v.as_int().is_some()) {
                DataType::Int64
            } else {
                DataType::Utf8
            };
            Field::new(name, data_type, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

fn record_batch(schema: &SchemaRef, rows: &[Vec<Value>]) -> Result<RecordBatch, SinkError> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(ci, field)| -> ArrayRef {
            match field.data_type() {
                DataType::Int64 => Arc::new(Int64Array::from(
                    rows.iter().map(|row| row[ci].as_int()).collect::<Vec<_>>(),
                )),
                _ => Arc::new(StringArray::from(
                    rows.iter()
                        .map(|row| (!row[ci].is_null()).then(|| row[ci].to_string()))
                        .collect::<Vec<_>>(),
                )),
            }
        })
        .collect();
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use crate::relationship::RelationshipRule;

    fn state() -> Table {
        Table::new(
            "state",
            vec!["state_sk".into(), "state".into(), "note".into()],
            vec![
                vec![Value::Int(1), "NSW".into(), Value::Null],
                vec![Value::Int(2), "VIC".into(), Value::Null],
                vec![Value::Int(3), "WA".into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_csv_sink_writes_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));

        let report = sink.persist_table(&state(), "state").await.unwrap();
        assert_eq!(report.rows_written, 3);

        let text = std::fs::read_to_string(dir.path().join("out/state.csv")).unwrap();
        assert_eq!(text, "state_sk,state,note\n1,NSW,\n2,VIC,\n3,WA,\n");
    }

    #[tokio::test]
    async fn test_csv_sink_relationship_has_two_columns() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let rel = RelationshipTable {
            rule: RelationshipRule::new("IN_STATE", "sa4", "sa4_sk", "state", "state_sk"),
            table: Table::new(
                "IN_STATE",
                vec!["src_value".into(), "dst_value".into()],
                vec![vec![Value::Int(4), Value::Int(2)]],
            )
            .unwrap(),
        };
        sink.persist_relationship(&rel, "sa4_state").await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("sa4_state.csv")).unwrap();
        assert_eq!(text, "src_value,dst_value\n4,2\n");
    }

    #[tokio::test]
    async fn test_parquet_sink_round_trips_types() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ParquetSink::new(dir.path(), 2);
        sink.persist_table(&state(), "state").await.unwrap();

        let file = File::open(dir.path().join("state.parquet")).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 2);
        let schema = builder.schema().clone();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);

        let batches: Vec<RecordBatch> = builder
            .build()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 3);

        let keys = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(keys.value(1), 2);
        assert_eq!(batches[0].column(2).null_count(), batches[0].num_rows());
    }
}
