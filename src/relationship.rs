//! Relationship extraction: project the key-normalized working table down to
//! deduplicated `(src_value, dst_value)` pairs, one table per rule.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{Table, TransformError};

pub const SRC_COLUMN: &str = "src_value";
pub const DST_COLUMN: &str = "dst_value";

/// One edge rule: `(name, source label, source key, destination label, destination key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub name: String,
    pub source_label: String,
    pub source_key: String,
    pub destination_label: String,
    pub destination_key: String,
}

impl RelationshipRule {
    pub fn new(
        name: &str,
        source_label: &str,
        source_key: &str,
        destination_label: &str,
        destination_key: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            source_label: source_label.to_string(),
            source_key: source_key.to_string(),
            destination_label: destination_label.to_string(),
            destination_key: destination_key.to_string(),
        }
    }
}

/// Relationship id → rule, in declaration order.
pub type RelationshipSchema = IndexMap<String, RelationshipRule>;

/// The pairs for one rule, columns `[src_value, dst_value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipTable {
    pub rule: RelationshipRule,
    pub table: Table,
}

impl RelationshipTable {
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }
}

/// Every column a schema reads from the working table.
pub fn referenced_columns(schema: &RelationshipSchema) -> impl Iterator<Item = &str> {
    schema
        .values()
        .flat_map(|r| [r.source_key.as_str(), r.destination_key.as_str()])
}

/// Extract one relationship table.
///
/// Rows with a null on either side are dropped; duplicate pairs are collapsed,
/// keeping first-occurrence order.
pub fn extract_relationship(
    table: &Table,
    rule: &RelationshipRule,
) -> Result<RelationshipTable, TransformError> {
    let projected = table
        .project(&[rule.source_key.as_str(), rule.destination_key.as_str()])?
        .drop_null_rows();
    let pairs = Table::new(
        rule.name.as_str(),
        vec![SRC_COLUMN.to_string(), DST_COLUMN.to_string()],
        projected.into_rows(),
    )?
    .distinct();

    debug!(
        "  {} ({}.{} -> {}.{}): {} pairs",
        rule.name,
        rule.source_label,
        rule.source_key,
        rule.destination_label,
        rule.destination_key,
        pairs.num_rows()
    );

    Ok(RelationshipTable {
        rule: rule.clone(),
        table: pairs,
    })
}

/// Extract every relationship in `schema`, keyed by relationship id.
///
/// Rules are independent: two rules over the same label pair, or sharing a
/// relationship name, produce two tables.
pub fn extract_relationships(
    table: &Table,
    schema: &RelationshipSchema,
) -> Result<IndexMap<String, RelationshipTable>, TransformError> {
    let mut out = IndexMap::with_capacity(schema.len());
    for (id, rule) in schema {
        let rel = extract_relationship(table, rule)?;
        info!("  {:<24} {:>8} pairs", id, rel.num_rows());
        out.insert(id.clone(), rel);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;

    fn working() -> Table {
        Table::new(
            "working",
            vec!["crash_sk".into(), "sa4_sk".into(), "state_sk".into()],
            vec![
                vec![Value::Int(1), Value::Int(3), Value::Int(2)],
                vec![Value::Int(1), Value::Int(3), Value::Int(2)],
                vec![Value::Int(2), Value::Int(1), Value::Int(1)],
                vec![Value::Int(3), Value::Int(3), Value::Null],
            ],
        )
        .unwrap()
    }

    fn schema() -> RelationshipSchema {
        let mut schema = RelationshipSchema::new();
        schema.insert(
            "sa4_state".into(),
            RelationshipRule::new("IN_STATE", "sa4", "sa4_sk", "state", "state_sk"),
        );
        schema.insert(
            "crash_sa4".into(),
            RelationshipRule::new("IN_SA4", "crash", "crash_sk", "sa4", "sa4_sk"),
        );
        schema
    }

    #[test]
    fn test_null_endpoint_is_dropped() {
        let t = Table::new(
            "working",
            vec!["sa4_sk".into(), "state_sk".into()],
            vec![vec![Value::Int(3), Value::Null]],
        )
        .unwrap();
        let rule = RelationshipRule::new("IN_STATE", "sa4", "sa4_sk", "state", "state_sk");
        let rel = extract_relationship(&t, &rule).unwrap();
        assert_eq!(rel.num_rows(), 0);
        assert_eq!(rel.table.columns(), &[SRC_COLUMN, DST_COLUMN]);
    }

    #[test]
    fn test_pairs_are_deduplicated_per_relationship() {
        let rels = extract_relationships(&working(), &schema()).unwrap();
        let names: Vec<&String> = rels.keys().collect();
        assert_eq!(names, vec!["sa4_state", "crash_sa4"]);

        let in_state = &rels["sa4_state"];
        assert_eq!(in_state.table.name, "IN_STATE");
        assert_eq!(
            in_state.table.rows(),
            &[
                vec![Value::Int(3), Value::Int(2)],
                vec![Value::Int(1), Value::Int(1)],
            ]
        );

        let in_sa4 = &rels["crash_sa4"];
        assert_eq!(in_sa4.num_rows(), 3);
        for rel in rels.values() {
            assert!(rel.table.rows().iter().flatten().all(|v| !v.is_null()));
        }
    }

    #[test]
    fn test_same_key_on_both_sides() {
        let rule = RelationshipRule::new("SAME", "crash", "crash_sk", "crash", "crash_sk");
        let rel = extract_relationship(&working(), &rule).unwrap();
        assert_eq!(rel.num_rows(), 3);
        assert!(rel.table.rows().iter().all(|r| r[0] == r[1]));
    }

    #[test]
    fn test_missing_key_column() {
        let rule = RelationshipRule::new("IN_LGA", "crash", "crash_sk", "lga", "lga_sk");
        let err = extract_relationship(&working(), &rule).unwrap_err();
        assert!(matches!(err, TransformError::MissingColumns { .. }));
    }

    #[test]
    fn test_referenced_columns() {
        let schema = schema();
        let cols: Vec<&str> = referenced_columns(&schema).collect();
        assert_eq!(cols, vec!["sa4_sk", "state_sk", "crash_sk", "sa4_sk"]);
    }
}
