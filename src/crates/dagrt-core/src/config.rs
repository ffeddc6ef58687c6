//! Layered pipeline configuration, deserialized from YAML with `serde_yaml`.
//! Deliberately small: per-node behaviour lives entirely in `NodeDescriptor`,
//! not in global configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_log_filter() -> String {
    "info".to_string()
}

/// Filesystem artifact store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_root() -> String {
    "./artifacts".to_string()
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self { enabled: false, root: default_root() }
    }
}

/// The handful of knobs the core genuinely needs at construction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub artifact_store: ArtifactStoreConfig,
    /// `RUST_LOG`-style filter string for the `tracing-subscriber`
    /// `EnvFilter` used by the demo binary and tests.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Worker threads reserved for `process`-tagged callables; `0` means no
    /// process pool is stood up and `process`-tagged nodes fail fast.
    #[serde(default)]
    pub process_pool_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_store: ArtifactStoreConfig::default(),
            log_filter: default_log_filter(),
            process_pool_threads: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl PipelineConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&contents)
    }
}
