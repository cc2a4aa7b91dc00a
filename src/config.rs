//! Pipeline configuration.
//!
//! The whole run is described by one JSON document: where the input lives,
//! how columns are normalized, which dimension and fact groups to build (in
//! order), which relationships to extract and where to write the result. The
//! ARDD layout ships embedded in the binary; `--config` swaps in another file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dimension::{DimensionSpec, KeyColumnPolicy};
use crate::normalize::NormalizeOptions;
use crate::relationship::RelationshipSchema;
use crate::sink::SinkConfig;

const EMBEDDED: &str = include_str!("../config/pipeline.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,
    /// Drop every row with a missing value before normalization.
    #[serde(default = "default_drop_na")]
    pub drop_na: bool,
}

fn default_drop_na() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub normalize: NormalizeOptions,
    #[serde(default)]
    pub key_columns: KeyColumnPolicy,
    pub dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub facts: Vec<DimensionSpec>,
    #[serde(default)]
    pub relationships: RelationshipSchema,
    #[serde(default)]
    pub sink: SinkConfig,
}

impl PipelineConfig {
    /// The built-in ARDD configuration.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need the input data.
    ///
    /// Column existence is checked later, against the actual table, when each
    /// group is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for spec in self.dimensions.iter().chain(self.facts.iter()) {
            if spec.natural_key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "group '{}' has an empty natural key",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "group name '{}' is declared twice",
                    spec.name
                )));
            }
        }

        for (id, rule) in &self.relationships {
            if rule.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "relationship '{id}' has an empty name"
                )));
            }
        }

        if self.sink.batch_size == 0 {
            return Err(ConfigError::Invalid("sink.batch_size must be > 0".into()));
        }
        if self.sink.max_concurrent == 0 {
            return Err(ConfigError::Invalid("sink.max_concurrent must be > 0".into()));
        }
        Ok(())
    }
}
