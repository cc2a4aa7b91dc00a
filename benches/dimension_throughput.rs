//! Dimension-building throughput benchmarks.
//!
//! Runs on synthetic ARDD-shaped rows so no input file is needed:
//! - **build_dimension**: one composite-key dimension at increasing row counts.
//! - **assemble**: the full dimension + fact sequence of the built-in config.
//!
//! # Running
//!
//! ```sh
//! cargo bench --bench dimension_throughput
//! ```

use std::collections::HashSet;

use criterion::{BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crashgraph::common::{Table, Value};
use crashgraph::config::PipelineConfig;
use crashgraph::dimension::{DimensionSpec, KeyColumnPolicy, build_dimension};
use crashgraph::facts::assemble;
use crashgraph::normalize::normalize;
use crashgraph::relationship::referenced_columns;

// ============================================================================
// Test data generators
// ============================================================================

const STATES: [&str; 8] = ["NSW", "Vic", "Qld", "SA", "WA", "Tas", "NT", "ACT"];
const ROAD_USERS: [&str; 5] = ["Driver", "Passenger", "Pedestrian", "Motorcycle rider", "Pedal cyclist"];
const YES_NO: [&str; 2] = ["Yes", "No"];
const GENDERS: [&str; 2] = ["Male", "Female"];

/// Raw rows with the ARDD header, roughly two fatalities per crash.
fn generate_rows(count: usize) -> Table {
    let mut rng = StdRng::seed_from_u64(42);
    let columns: Vec<String> = [
        "Crash ID", "State", "Month", "Year", "Dayweek", "Time", "Crash Type",
        "Number Fatalities", "Bus Involvement", "Heavy Rigid Truck Involvement",
        "Articulated Truck Involvement", "Speed Limit", "Road User", "Gender", "Age",
        "National Remoteness Areas", "SA4 Name 2021", "National LGA Name 2021",
        "National Road Type", "Christmas Period", "Easter Period", "Age Group",
        "Day of week", "Time of day",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    let rows = (0..count)
        .map(|i| {
            let state = STATES[rng.random_range(0..STATES.len())];
            let sa4 = rng.random_range(0..90);
            let lga = sa4 * 6 + rng.random_range(0..6);
            let hour = rng.random_range(0..24);
            vec![
                Value::Int(20_000_000 + (i / 2) as i64),
                state.into(),
                Value::Int(rng.random_range(1..=12)),
                Value::Int(rng.random_range(1989..=2024)),
                Value::from(if rng.random_bool(0.7) { "Weekday" } else { "Weekend" }),
                Value::from(format!("{hour:02}:{:02}", rng.random_range(0..60))),
                Value::from(if rng.random_bool(0.6) { "Single" } else { "Multiple" }),
                Value::Int(rng.random_range(1..=3)),
                YES_NO[rng.random_range(0..2)].into(),
                YES_NO[rng.random_range(0..2)].into(),
                YES_NO[rng.random_range(0..2)].into(),
                Value::Int(rng.random_range(4..=11) * 10),
                ROAD_USERS[rng.random_range(0..ROAD_USERS.len())].into(),
                GENDERS[rng.random_range(0..2)].into(),
                Value::Int(rng.random_range(0..100)),
                Value::from(format!("Remoteness {}", rng.random_range(0..5))),
                Value::from(format!("{state} SA4 {sa4}")),
                Value::from(format!("{state} LGA {lga}")),
                Value::from(format!("Road type {}", rng.random_range(0..8))),
                YES_NO[rng.random_range(0..2)].into(),
                YES_NO[rng.random_range(0..2)].into(),
                Value::from(format!("{}_to_{}", hour, hour + 9)),
                Value::from("Weekday"),
                Value::from("Day"),
            ]
        })
        .collect();

    Table::new("synthetic", columns, rows).expect("generated rows match the header")
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_build_dimension(c: &mut Criterion) {
    let spec = DimensionSpec::new(
        "lga",
        &["National LGA Name 2021", "SA4 Name 2021", "State"],
        true,
    );

    let mut group = c.benchmark_group("build_dimension");
    group.sample_size(20);
    group.noise_threshold(0.05);

    for num_rows in [10_000, 50_000, 200_000] {
        let table = generate_rows(num_rows);
        group.throughput(Throughput::Elements(num_rows as u64));
        group.bench_with_input(BenchmarkId::new("lga", num_rows), &table, |b, table| {
            b.iter(|| build_dimension(table.clone(), &spec, KeyColumnPolicy::Replace).unwrap());
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let config = PipelineConfig::embedded().expect("embedded config is valid");
    let reserved: HashSet<String> = referenced_columns(&config.relationships)
        .map(str::to_string)
        .collect();

    let num_rows = 50_000;
    let table = normalize(generate_rows(num_rows), &config.normalize).unwrap();

    let mut group = c.benchmark_group("assemble");
    group.sample_size(10);
    group.noise_threshold(0.05);
    group.throughput(Throughput::Elements(num_rows as u64));
    group.bench_function("ardd_config", |b| {
        b.iter(|| {
            assemble(
                table.clone(),
                &config.dimensions,
                &config.facts,
                config.key_columns,
                &reserved,
            )
            .unwrap()
        });
    });
    group.finish();
}

// ============================================================================
// Criterion main
// ============================================================================

fn main() {
    let mut criterion = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .configure_from_args();

    bench_build_dimension(&mut criterion);
    bench_assemble(&mut criterion);

    criterion.final_summary();
}
