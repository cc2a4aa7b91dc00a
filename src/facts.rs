//! Fact assembly: run the dimension builder over every dimension group, then
//! over the fact groups, threading the shrinking working table through.

use std::collections::HashSet;

use tracing::info;

use crate::common::{Table, TransformError};
use crate::dimension::{Dimension, DimensionSpec, KeyColumnPolicy, build_dimension};

/// The key-normalized result of fact assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub dimensions: Vec<Dimension>,
    pub facts: Vec<Dimension>,
    /// The working table after every group has merged its key.
    pub working: Table,
}

impl Assembly {
    /// Dimensions first, then facts, in build order.
    pub fn tables(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().chain(self.facts.iter())
    }
}

/// Build every dimension and then every fact group, in the given order.
///
/// Under [`KeyColumnPolicy::Replace`] a natural-key column is dropped from the
/// working table only once no later group needs it and it is not listed in
/// `reserved`. A composite dimension such as `lga` on `[lga, sa4, state]` can
/// therefore precede the `sa4` and `state` dimensions without starving them.
pub fn assemble(
    table: Table,
    dimensions: &[DimensionSpec],
    facts: &[DimensionSpec],
    policy: KeyColumnPolicy,
    reserved: &HashSet<String>,
) -> Result<Assembly, TransformError> {
    let groups: Vec<&DimensionSpec> = dimensions.iter().chain(facts.iter()).collect();

    let mut working = table;
    let mut built = Vec::with_capacity(groups.len());
    for (i, spec) in groups.iter().enumerate() {
        let (dimension, next) = build_dimension(working, spec, KeyColumnPolicy::Retain)?;
        working = next;

        if policy == KeyColumnPolicy::Replace && spec.assign_surrogate_key {
            let still_needed: HashSet<&str> = groups[i + 1..]
                .iter()
                .flat_map(|later| later.natural_key.iter().map(String::as_str))
                .collect();
            let exhausted: Vec<&str> = spec
                .natural_key
                .iter()
                .map(String::as_str)
                .filter(|c| !still_needed.contains(c) && !reserved.contains(*c))
                .collect();
            working = working.drop_columns(&exhausted);
        }

        info!(
            "  {:<16} {:>8} rows  (working table: {} columns)",
            dimension.name(),
            dimension.num_rows(),
            working.num_columns()
        );
        built.push(dimension);
    }

    let facts = built.split_off(dimensions.len());
    Ok(Assembly {
        dimensions: built,
        facts,
        working,
    })
}
