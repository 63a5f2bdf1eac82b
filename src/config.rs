use crate::error::{IngestError, Result};
use jsonschema::JSONSchema;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// JSON Schema the service configuration is validated against before use.
const CONFIG_SCHEMA: &str = include_str!("../schemas/ingest.v1.json");

/// How NULL positions in a valid series are resolved before acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FillStrategy {
    #[serde(rename = "zeroFill")]
    ZeroFill,
    #[serde(rename = "pad")]
    Pad,
    #[serde(rename = "backfill")]
    Backfill,
    #[serde(rename = "linearInterpolation")]
    LinearInterpolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatedPolicy {
    Drop,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    Drop,
    Save,
}

/// Configuration subtree for one kind of series (labeled or unlabeled).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SeriesTypeConfig {
    pub input_dir_path: PathBuf,
    pub input_file_extension: String,
    pub input_file_datetime_format: String,
    pub input_series_separator: String,
    pub output_file_path: PathBuf,
    pub output_series_separator: String,
    #[serde(rename = "maxNULLperc")]
    pub max_null_perc: f64,
    #[serde(rename = "maxConsecNULL")]
    pub max_consec_null: usize,
    #[serde(rename = "NULLFillingStrategy")]
    pub null_filling_strategy: FillStrategy,
    pub duplicated_policy: DuplicatedPolicy,
    pub malformed_policy: MalformedPolicy,
    pub malformed_output_dir_path: PathBuf,
}

/// Top-level service configuration, loaded from JSON and validated against
/// `schemas/ingest.v1.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestConfig {
    pub sample_size: usize,
    pub default_label: String,
    pub starting_index: u64,
    pub max_series_per_run: usize,
    pub multi_core_enable: bool,
    pub multi_core_limit: usize,
    #[serde(rename = "labeledSeriesConfiguration")]
    pub labeled: SeriesTypeConfig,
    #[serde(rename = "unlabeledSeriesConfiguration")]
    pub unlabeled: SeriesTypeConfig,
}

impl IngestConfig {
    /// Loads and validates the service configuration from a JSON file.
    ///
    /// A configuration that fails schema validation is a systemic error: the
    /// run is aborted before any input file is touched.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Self::validate_against_schema(&value)?;
        let config: IngestConfig = serde_json::from_value(value)?;
        Ok(config)
    }

    fn validate_against_schema(instance: &serde_json::Value) -> Result<()> {
        let schema: serde_json::Value = serde_json::from_str(CONFIG_SCHEMA)?;
        // jsonschema 0.17 expects a schema with 'static lifetime; leak the
        // parsed schema for the (one-shot) validation
        let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema));
        let compiled = JSONSchema::options()
            .compile(schema_static)
            .map_err(|e| IngestError::Config(format!("invalid configuration schema: {}", e)))?;

        if let Err(errors) = compiled.validate(instance) {
            let details: Vec<String> = errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect();
            return Err(IngestError::Config(format!(
                "configuration does not match schema: {}",
                details.join("; ")
            )));
        }
        Ok(())
    }

    /// Verifies and repairs the filesystem resources named by the
    /// configuration: input directories must already exist, while output file
    /// parents and malformed directories are created when missing.
    pub fn ensure_resources(&self) -> Result<()> {
        for (kind, cfg) in [("labeled", &self.labeled), ("unlabeled", &self.unlabeled)] {
            if !cfg.input_dir_path.is_dir() {
                return Err(IngestError::InputDir {
                    kind: kind.to_string(),
                    path: cfg.input_dir_path.display().to_string(),
                });
            }
            if cfg.output_file_path.is_dir() {
                return Err(IngestError::StoreInit {
                    kind: kind.to_string(),
                    message: format!(
                        "output file path '{}' is a directory",
                        cfg.output_file_path.display()
                    ),
                });
            }
            if let Some(parent) = cfg.output_file_path.parent() {
                fs::create_dir_all(parent)?;
            }
            if cfg.malformed_policy == MalformedPolicy::Save {
                if cfg.malformed_output_dir_path.is_file() {
                    return Err(IngestError::StoreInit {
                        kind: kind.to_string(),
                        message: format!(
                            "malformed output directory '{}' is a file",
                            cfg.malformed_output_dir_path.display()
                        ),
                    });
                }
                if !cfg.malformed_output_dir_path.exists() {
                    warn!(
                        "Malformed output directory for {} series doesn't exist and will be created ({})",
                        kind,
                        cfg.malformed_output_dir_path.display()
                    );
                    fs::create_dir_all(&cfg.malformed_output_dir_path)?;
                }
            }
        }
        Ok(())
    }
}
