//! Extraction: read the delimited input file into a working [`Table`].

use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::common::{Table, TransformError, Value};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Table(#[from] TransformError),
}

/// Read the CSV at `path`. With `drop_na`, rows containing any null are removed.
pub fn extract(path: &Path, drop_na: bool) -> Result<Table, ExtractError> {
    let file = std::fs::File::open(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let table = read_table(&name, file)?;

    let total = table.num_rows();
    let table = if drop_na { table.drop_null_rows() } else { table };
    info!(
        "  Read {} rows x {} columns from {} ({} dropped for missing values)",
        total,
        table.num_columns(),
        path.display(),
        total - table.num_rows()
    );
    Ok(table)
}

/// Parse CSV with a header row.
///
/// Empty cells are null. A column whose non-null cells all parse as `i64` is an
/// integer column; any other column is text.
pub fn read_table<R: Read>(name: &str, reader: R) -> Result<Table, ExtractError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut raw: Vec<Vec<Option<String>>> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        raw.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        );
    }

    let integer_columns: Vec<bool> = (0..columns.len())
        .map(|ci| {
            raw.iter()
                .filter_map(|row| row.get(ci).and_then(Option::as_deref))
                .all(|cell| cell.parse::<i64>().is_ok())
        })
        .collect();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(ci, cell)| match cell {
                    None => Value::Null,
                    Some(s) if integer_columns[ci] => s.parse::<i64>().map_or(Value::Null, Value::Int),
                    Some(s) => Value::Text(s),
                })
                .collect()
        })
        .collect();

    Ok(Table::new(name, columns, rows)?)
}
