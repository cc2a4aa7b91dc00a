//! Dimension building: deduplicate a natural key, assign dense surrogate keys,
//! and join them back onto the working table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{Table, TransformError, Value};

/// One column group of the star schema: a dimension, or a fact built the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub natural_key: Vec<String>,
    #[serde(default = "default_true")]
    pub assign_surrogate_key: bool,
}

fn default_true() -> bool {
    true
}

impl DimensionSpec {
    pub fn new(name: &str, natural_key: &[&str], assign_surrogate_key: bool) -> Self {
        Self {
            name: name.to_string(),
            natural_key: natural_key.iter().map(|c| c.to_string()).collect(),
            assign_surrogate_key,
        }
    }

    /// Name of the surrogate-key column, `"<name>_sk"`.
    pub fn key_column(&self) -> String {
        surrogate_key_column(&self.name)
    }
}

pub fn surrogate_key_column(dimension: &str) -> String {
    format!("{dimension}_sk")
}

/// Whether natural-key columns stay on the working table after the key merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColumnPolicy {
    /// Keep the natural-key columns next to the new surrogate key.
    Retain,
    /// Drop the natural-key columns once the surrogate key is in place.
    #[default]
    Replace,
}

/// A built dimension (or fact) table.
///
/// With a surrogate key the table's columns are `[<name>_sk, natural_key...]`,
/// otherwise just the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub spec: DimensionSpec,
    pub table: Table,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Surrogate key → natural-key values. Empty when no key was assigned.
    pub fn by_key(&self) -> HashMap<i64, &[Value]> {
        if !self.spec.assign_surrogate_key {
            return HashMap::new();
        }
        self.table
            .rows()
            .iter()
            .filter_map(|row| row[0].as_int().map(|sk| (sk, &row[1..])))
            .collect()
    }
}

/// Deduplicated natural-key rows in surrogate-key assignment order.
///
/// Rows are sorted by the first natural-key column; ties fall through to the
/// remaining columns in order. Rows are distinct, so this is a total order and
/// the result does not depend on input row order.
pub fn distinct_sorted(table: &Table, natural_key: &[String]) -> Result<Vec<Vec<Value>>, TransformError> {
    let mut rows = table.project(natural_key)?.distinct().into_rows();
    rows.sort();
    Ok(rows)
}

/// Build one dimension from `table` and return it with the updated table.
///
/// Without a surrogate key the dimension is a reference table only and
/// `table` comes back unchanged.
pub fn build_dimension(
    table: Table,
    spec: &DimensionSpec,
    policy: KeyColumnPolicy,
) -> Result<(Dimension, Table), TransformError> {
    let key_indices = table.require_columns(&spec.natural_key)?;
    let rows = distinct_sorted(&table, &spec.natural_key)?;

    if !spec.assign_surrogate_key {
        let dim_table = Table::new(spec.name.as_str(), spec.natural_key.clone(), rows)?;
        debug!("  {}: {} distinct rows (no key)", spec.name, dim_table.num_rows());
        let dimension = Dimension {
            spec: spec.clone(),
            table: dim_table,
        };
        return Ok((dimension, table));
    }

    let sk_col = spec.key_column();
    if table.has_column(&sk_col) {
        return Err(TransformError::ColumnExists {
            table: table.name.clone(),
            column: sk_col,
        });
    }

    let mut lookup: HashMap<Vec<Value>, i64> = HashMap::with_capacity(rows.len());
    let mut dim_rows = Vec::with_capacity(rows.len());
    for (pos, natural) in rows.into_iter().enumerate() {
        let sk = pos as i64 + 1;
        let mut row = Vec::with_capacity(natural.len() + 1);
        row.push(Value::Int(sk));
        row.extend(natural.iter().cloned());
        lookup.insert(natural, sk);
        dim_rows.push(row);
    }

    // Left join by natural key. Every key in `table` is in `lookup` by construction.
    let keys: Vec<Value> = table
        .rows()
        .iter()
        .map(|row| {
            let natural: Vec<Value> = key_indices.iter().map(|&i| row[i].clone()).collect();
            lookup.get(&natural).copied().into()
        })
        .collect();

    let mut dim_columns = Vec::with_capacity(spec.natural_key.len() + 1);
    dim_columns.push(sk_col.clone());
    dim_columns.extend(spec.natural_key.iter().cloned());
    let dim_table = Table::new(spec.name.as_str(), dim_columns, dim_rows)?;

    let table = table.push_column(sk_col, keys)?;
    let table = match policy {
        KeyColumnPolicy::Retain => table,
        KeyColumnPolicy::Replace => table.drop_columns(&spec.natural_key),
    };

    debug!(
        "  {}: {} distinct rows over [{}]",
        spec.name,
        dim_table.num_rows(),
        spec.natural_key.join(", ")
    );

    Ok((
        Dimension {
            spec: spec.clone(),
            table: dim_table,
        },
        table,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crashes() -> Table {
        Table::new(
            "crashes",
            vec!["state".into(), "sa4".into(), "speed_limit".into()],
            vec![
                vec!["VIC".into(), "Melbourne - Inner".into(), Value::Int(60)],
                vec!["NSW".into(), "Sydney - City".into(), Value::Int(50)],
                vec!["VIC".into(), "Ballarat".into(), Value::Int(100)],
                vec!["VIC".into(), "Melbourne - Inner".into(), Value::Int(40)],
                vec!["NSW".into(), "Sydney - City".into(), Value::Int(50)],
            ],
        )
        .unwrap()
    }

    fn column(table: &Table, name: &str) -> Vec<Value> {
        table.column_values(name).unwrap().cloned().collect()
    }

    #[test]
    fn test_state_example() {
        let t = Table::new(
            "facts",
            vec!["state".into()],
            vec![vec!["VIC".into()], vec!["NSW".into()], vec!["VIC".into()]],
        )
        .unwrap();
        let spec = DimensionSpec::new("state", &["state"], true);
        let (dim, t) = build_dimension(t, &spec, KeyColumnPolicy::Replace).unwrap();

        assert_eq!(dim.table.columns(), &["state_sk", "state"]);
        assert_eq!(
            dim.table.rows(),
            &[
                vec![Value::Int(1), Value::from("NSW")],
                vec![Value::Int(2), Value::from("VIC")],
            ]
        );
        assert_eq!(t.columns(), &["state_sk"]);
        assert_eq!(
            column(&t, "state_sk"),
            vec![Value::Int(2), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_surrogate_keys_are_dense() {
        let spec = DimensionSpec::new("sa4", &["sa4", "state"], true);
        let (dim, t) = build_dimension(crashes(), &spec, KeyColumnPolicy::Retain).unwrap();

        let mut keys: Vec<i64> = column(&dim.table, "sa4_sk")
            .iter()
            .filter_map(Value::as_int)
            .collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(column(&t, "sa4_sk").iter().all(|v| v.as_int().is_some()));
    }

    #[test]
    fn test_join_back_reconstructs_natural_key() {
        let original = crashes();
        let spec = DimensionSpec::new("location", &["state", "sa4"], true);
        let (dim, reduced) =
            build_dimension(original.clone(), &spec, KeyColumnPolicy::Replace).unwrap();
        assert_eq!(reduced.columns(), &["speed_limit", "location_sk"]);

        let by_key = dim.by_key();
        for (orig, row) in original.rows().iter().zip(reduced.rows()) {
            let sk = row[1].as_int().unwrap();
            assert_eq!(by_key[&sk], &orig[..2]);
        }
    }

    #[test]
    fn test_order_independent_assignment() {
        let spec = DimensionSpec::new("location", &["state", "sa4"], true);
        let (a, _) = build_dimension(crashes(), &spec, KeyColumnPolicy::Retain).unwrap();

        let mut rows = crashes().into_rows();
        rows.reverse();
        let shuffled = Table::new("crashes", crashes().columns().to_vec(), rows).unwrap();
        let (b, _) = build_dimension(shuffled, &spec, KeyColumnPolicy::Retain).unwrap();

        assert_eq!(a.table, b.table);
        // Ties on state are broken by sa4.
        assert_eq!(
            a.table.rows()[1],
            vec![Value::Int(2), Value::from("VIC"), Value::from("Ballarat")]
        );
    }

    #[test]
    fn test_no_surrogate_key_leaves_table_untouched() {
        let spec = DimensionSpec::new("speed", &["speed_limit"], false);
        let (dim, t) = build_dimension(crashes(), &spec, KeyColumnPolicy::Replace).unwrap();
        assert_eq!(t, crashes());
        assert_eq!(dim.table.columns(), &["speed_limit"]);
        assert_eq!(
            column(&dim.table, "speed_limit"),
            vec![Value::Int(40), Value::Int(50), Value::Int(60), Value::Int(100)]
        );
        assert!(dim.by_key().is_empty());
    }

    #[test]
    fn test_null_natural_key_gets_its_own_key() {
        let t = Table::new(
            "facts",
            vec!["lga".into()],
            vec![vec![Value::Null], vec!["Ararat".into()], vec![Value::Null]],
        )
        .unwrap();
        let spec = DimensionSpec::new("lga", &["lga"], true);
        let (dim, t) = build_dimension(t, &spec, KeyColumnPolicy::Replace).unwrap();
        assert_eq!(dim.table.rows()[1], vec![Value::Int(2), Value::Null]);
        assert_eq!(
            column(&t, "lga_sk"),
            vec![Value::Int(2), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_missing_columns() {
        let spec = DimensionSpec::new("lga", &["lga", "sa4", "state"], true);
        let err = build_dimension(crashes(), &spec, KeyColumnPolicy::Replace).unwrap_err();
        match err {
            TransformError::MissingColumns { columns, .. } => assert_eq!(columns, vec!["lga"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_existing_key_column_is_rejected() {
        let spec = DimensionSpec::new("state", &["state"], true);
        let (_, t) = build_dimension(crashes(), &spec, KeyColumnPolicy::Retain).unwrap();
        let err = build_dimension(t, &spec, KeyColumnPolicy::Retain).unwrap_err();
        assert!(matches!(err, TransformError::ColumnExists { .. }));
    }
}
