//! Column normalization: canonical snake_case names, the derived `hour`
//! attribute, and the day/night classification recomputed from it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::{Table, TransformError, Value};

/// Raw ARDD column name → canonical column name.
pub const RENAME_MAP: [(&str, &str); 24] = [
    ("Crash ID", "crash_id"),
    ("State", "state"),
    ("Month", "month"),
    ("Year", "year"),
    ("Dayweek", "dayweek"),
    ("Time", "time"),
    ("Crash Type", "crash_type"),
    ("Number Fatalities", "number_fatalities"),
    ("Bus Involvement", "bus_involvement"),
    ("Heavy Rigid Truck Involvement", "heavy_rigid_truck_involvement"),
    ("Articulated Truck Involvement", "articulated_truck_involvement"),
    ("Speed Limit", "speed_limit"),
    ("Road User", "road_user"),
    ("Gender", "gender"),
    ("Age", "age"),
    ("National Remoteness Areas", "remoteness_area"),
    ("SA4 Name 2021", "sa4"),
    ("National LGA Name 2021", "lga"),
    ("National Road Type", "road_type"),
    ("Christmas Period", "christmas_period"),
    ("Easter Period", "easter_period"),
    ("Age Group", "age_group"),
    ("Day of week", "day_of_week"),
    ("Time of day", "time_of_day"),
];

pub const HOUR_COLUMN: &str = "hour";
pub const TIME_OF_DAY_COLUMN: &str = "time_of_day";

/// Day starts at 06:00 inclusive and ends at 18:00 exclusive.
const DAY_START_HOUR: i64 = 6;
const DAY_END_HOUR: i64 = 18;

// ============================================================================
// Options
// ============================================================================

/// What to do with a row whose time value cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedTimePolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Remove the row and keep going.
    DropRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Canonical name of the `"HH:MM"` time column.
    pub time_column: String,
    /// Drop the time-string column once `hour` has been derived.
    pub drop_time_column: bool,
    pub malformed_time: MalformedTimePolicy,
    /// When set, a 1-based positional id column is prepended under this name.
    pub row_id_column: Option<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            time_column: "time".to_string(),
            drop_time_column: false,
            malformed_time: MalformedTimePolicy::Abort,
            row_id_column: None,
        }
    }
}

// ============================================================================
// Time of day
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeOfDay {
    Day,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: i64) -> Self {
        if (DAY_START_HOUR..DAY_END_HOUR).contains(&hour) {
            TimeOfDay::Day
        } else {
            TimeOfDay::Night
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Day => "Day",
            TimeOfDay::Night => "Night",
        }
    }
}

/// Parse the leading `HH` of an `"HH:MM"` (or `"HH:MM:SS"`) string.
pub fn parse_hour(raw: &str) -> Option<i64> {
    let (hh, _) = raw.trim().split_once(':')?;
    hh.trim().parse::<i64>().ok()
}

// ============================================================================
// Normalizer
// ============================================================================

pub fn canonical_name(raw: &str) -> Option<&'static str> {
    RENAME_MAP
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| *to)
}

/// Rename the raw columns, then derive `hour` and `time_of_day`.
pub fn normalize(table: Table, options: &NormalizeOptions) -> Result<Table, TransformError> {
    let mut table = table.rename_columns(|raw| canonical_name(raw).map(str::to_string));

    if let Some(id_col) = &options.row_id_column {
        let ids = (1..=table.num_rows() as i64).map(Value::Int).collect();
        table = table.prepend_column(id_col.as_str(), ids)?;
    }

    derive_hour(table, options)
}

/// Derive `hour` from the time column and overwrite `time_of_day` from it.
pub fn derive_hour(table: Table, options: &NormalizeOptions) -> Result<Table, TransformError> {
    let time_idx = table.require_columns(&[options.time_column.as_str()])?[0];

    let mut hours: Vec<Option<i64>> = Vec::with_capacity(table.num_rows());
    for (row, cells) in table.rows().iter().enumerate() {
        let hour = match &cells[time_idx] {
            Value::Text(s) => parse_hour(s),
            _ => None,
        };
        if hour.is_none() {
            let value = cells[time_idx].to_string();
            match options.malformed_time {
                MalformedTimePolicy::Abort => {
                    return Err(TransformError::MalformedTime { row, value });
                }
                MalformedTimePolicy::DropRow => {
                    warn!("  Dropping row {row}: malformed time value '{value}'");
                }
            }
        }
        hours.push(hour);
    }

    let num_dropped = hours.iter().filter(|h| h.is_none()).count();
    let table = if num_dropped > 0 {
        table.filter_rows(|i, _| hours[i].is_some())
    } else {
        table
    };
    let hours: Vec<i64> = hours.into_iter().flatten().collect();

    let time_of_day = hours
        .iter()
        .map(|&h| Value::from(TimeOfDay::from_hour(h).as_str()))
        .collect();
    let table = table
        .set_column(HOUR_COLUMN, hours.into_iter().map(Value::Int).collect())?
        .set_column(TIME_OF_DAY_COLUMN, time_of_day)?;

    debug!(
        "  Derived {HOUR_COLUMN}/{TIME_OF_DAY_COLUMN} for {} rows ({num_dropped} dropped)",
        table.num_rows()
    );

    if options.drop_time_column {
        Ok(table.drop_columns(&[options.time_column.as_str()]))
    } else {
        Ok(table)
    }
}
