//! Transformation configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options shared by every canonical-form transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Prefix for names generated during rewriting
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Merge alpha-equivalent calls to the split intrinsic before zipping.
    /// When off, only structurally identical calls are merged.
    #[serde(default = "default_true")]
    pub deduplicate_intrinsic_calls: bool,

    /// Run `check_extraction_result` on every consolidated unit
    #[serde(default = "default_true")]
    pub verify_extraction: bool,
}

fn default_name_prefix() -> String {
    fedcomp_ir::naming::DEFAULT_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            deduplicate_intrinsic_calls: true,
            verify_extraction: true,
        }
    }
}

/// Invalid configuration text
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse transform configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("name_prefix must not be empty")]
    EmptyNamePrefix,
}

impl TransformConfig {
    /// Parse a configuration from TOML; missing fields take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TransformConfig = toml::from_str(text)?;
        if config.name_prefix.is_empty() {
            return Err(ConfigError::EmptyNamePrefix);
        }
        Ok(config)
    }
}
