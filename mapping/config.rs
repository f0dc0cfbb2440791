//! Mapping configuration.
//!
//! The configuration is owned by the caller and honored by the mapper. It can be
//! built in code or read from a TOML file:
//!
//! ```toml
//! id_mode = "alias-name"   # or "primary-id"
//! or_policy = "max"        # or "sum"
//! workers = 4
//! samples = ["patient_07", 3]
//! ```
//!
//! String fields are resolved after deserialization so that an unknown OR policy
//! surfaces as [`MappingError::AggregationPolicy`] rather than a generic parse error.

use crate::batch::MappingError;
use crate::types::{IdMode, OrPolicy, SampleSelector};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] MappingError),
}

/// Available hardware parallelism minus one, never below one.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingConfig {
    pub id_mode: IdMode,
    pub or_policy: OrPolicy,
    pub workers: usize,
    /// Samples to map, in output column order. Empty selects every sample.
    pub samples: Vec<SampleSelector>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            id_mode: IdMode::default(),
            or_policy: OrPolicy::default(),
            workers: default_worker_count(),
            samples: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMappingConfig {
    id_mode: Option<String>,
    or_policy: Option<String>,
    workers: Option<usize>,
    #[serde(default)]
    samples: Vec<SampleSelector>,
}

impl MappingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawMappingConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(id_mode) = raw.id_mode {
            config.id_mode = id_mode.parse()?;
        }
        if let Some(or_policy) = raw.or_policy {
            config.or_policy = or_policy.parse()?;
        }
        if let Some(workers) = raw.workers {
            config.workers = workers;
        }
        config.samples = raw.samples;

        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks the values that can be checked without a model or table.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.workers == 0 {
            return Err(MappingError::InvalidWorkerCount(self.workers));
        }
        Ok(())
    }
}
