//! Common types used throughout the pipeline: cell values, the row-oriented
//! working table, and the transform-stage error type.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("table '{table}' is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("table '{table}' already has a column named '{column}'")]
    ColumnExists { table: String, column: String },

    #[error("row {row}: malformed time value '{value}' (expected HH:MM)")]
    MalformedTime { row: usize, value: String },

    #[error("table '{table}' row {row} has {got} cells, expected {expected}")]
    RaggedRow {
        table: String,
        row: usize,
        got: usize,
        expected: usize,
    },
}

// ============================================================================
// Cell Values
// ============================================================================

/// A single cell of a [`Table`].
///
/// `Null == Null` holds: natural-key joins match missing values against each
/// other, the same way a dataframe merge does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Text(_) => 1,
            Value::Null => 2,
        }
    }
}

/// Integers sort numerically, text lexicographically, integers before text,
/// and `Null` last.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Working Table
// ============================================================================

/// A named, row-oriented table. Columns are addressed by name, rows by position.
///
/// Every transform step takes a `Table` by value and hands back a new one, so
/// no step observes another step's intermediate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table, checking that every row has one cell per column.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, TransformError> {
        let name = name.into();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TransformError::RaggedRow {
                    table: name,
                    row: i,
                    got: row.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Resolve `names` to column indices, reporting every absent name at once.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, TransformError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name.as_ref()) {
                Some(i) => indices.push(i),
                None => missing.push(name.as_ref().to_string()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(TransformError::MissingColumns {
                table: self.name.clone(),
                columns: missing,
            })
        }
    }

    /// Iterate over the values of one column.
    pub fn column_values(&self, name: &str) -> Result<impl Iterator<Item = &Value>, TransformError> {
        let idx = self.require_columns(&[name])?[0];
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Rename columns through `f`; columns for which `f` returns `None` keep their name.
    pub fn rename_columns(mut self, f: impl Fn(&str) -> Option<String>) -> Self {
        for col in self.columns.iter_mut() {
            if let Some(renamed) = f(col) {
                *col = renamed;
            }
        }
        self
    }

    /// Project onto `names`, in that order. The result keeps this table's name.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TransformError> {
        let indices = self.require_columns(names)?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            name: self.name.clone(),
            columns: names.iter().map(|n| n.as_ref().to_string()).collect(),
            rows,
        })
    }

    /// Drop exact-duplicate rows, keeping the first occurrence of each.
    pub fn distinct(mut self) -> Self {
        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(self.rows.len());
        self.rows.retain(|row| seen.insert(row.clone()));
        self
    }

    /// Append a column. `values` must have one entry per row.
    pub fn push_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Self, TransformError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(TransformError::ColumnExists {
                table: self.name,
                column: name,
            });
        }
        if values.len() != self.rows.len() {
            return Err(TransformError::RaggedRow {
                table: self.name,
                row: values.len().min(self.rows.len()),
                got: values.len(),
                expected: self.rows.len(),
            });
        }
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.push(v);
        }
        self.columns.push(name);
        Ok(self)
    }

    /// Insert a column at position 0. `values` must have one entry per row.
    pub fn prepend_column(
        self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Self, TransformError> {
        let mut table = self.push_column(name, values)?;
        let last = table.columns.len() - 1;
        table.columns.rotate_right(1);
        for row in table.rows.iter_mut() {
            row[..=last].rotate_right(1);
        }
        Ok(table)
    }

    /// Replace the values of an existing column, or append it if absent.
    pub fn set_column(mut self, name: &str, values: Vec<Value>) -> Result<Self, TransformError> {
        match self.column_index(name) {
            Some(idx) => {
                if values.len() != self.rows.len() {
                    return Err(TransformError::RaggedRow {
                        table: self.name,
                        row: values.len().min(self.rows.len()),
                        got: values.len(),
                        expected: self.rows.len(),
                    });
                }
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
                Ok(self)
            }
            None => self.push_column(name, values),
        }
    }

    /// Remove the named columns. Names that are not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        let dropped: HashSet<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n.as_ref()))
            .collect();
        if dropped.is_empty() {
            return self;
        }
        let keep = |i: &usize| !dropped.contains(i);
        self.columns = self
            .columns
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep(i))
            .map(|(_, c)| c)
            .collect();
        for row in self.rows.iter_mut() {
            let old = std::mem::take(row);
            *row = old
                .into_iter()
                .enumerate()
                .filter(|(i, _)| keep(i))
                .map(|(_, v)| v)
                .collect();
        }
        self
    }

    /// Keep only the rows for which `f` returns true.
    pub fn filter_rows(mut self, mut f: impl FnMut(usize, &[Value]) -> bool) -> Self {
        let mut i = 0;
        self.rows.retain(|row| {
            let keep = f(i, row);
            i += 1;
            keep
        });
        self
    }

    /// Drop every row that has at least one null cell.
    pub fn drop_null_rows(self) -> Self {
        self.filter_rows(|_, row| row.iter().all(|v| !v.is_null()))
    }
}
