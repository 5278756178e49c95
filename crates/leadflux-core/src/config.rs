use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub dim_user: PathBuf,
    pub fct_credit_pack_purchases: PathBuf,
    pub fct_membership_purchases: PathBuf,
    pub fct_client_conversion_events_part_2: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            dim_user: PathBuf::from("data/dim_user.csv"),
            fct_credit_pack_purchases: PathBuf::from("data/fct_credit_pack_purchases.csv"),
            fct_membership_purchases: PathBuf::from("data/fct_membership_purchases.csv"),
            fct_client_conversion_events_part_2: PathBuf::from(
                "data/fct_client_conversion_events_part_2.csv",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub fct_client_conversion_events: PathBuf,
    pub fct_lead_conversions: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_summary: Option<PathBuf>,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            fct_client_conversion_events: PathBuf::from(
                "outputs/fct_client_conversion_events.csv",
            ),
            fct_lead_conversions: PathBuf::from("outputs/fct_lead_conversions.csv"),
            run_summary: Some(PathBuf::from("outputs/run_summary.json")),
        }
    }
}

/// Pipeline configuration
///
/// # Example
///
/// ```toml
/// output_format = "csv"
///
/// [input_paths]
/// dim_user = "data/dim_user.csv"
///
/// [output_paths]
/// fct_lead_conversions = "outputs/fct_lead_conversions.csv"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_format: OutputFormat,
    pub input_paths: InputPaths,
    pub output_paths: OutputPaths,
}

impl PipelineConfig {
    /// Loads configuration from `path`, falling back to defaults when no path is given
    /// or the file does not exist. `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("no config file given; using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if is_json(path) {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
