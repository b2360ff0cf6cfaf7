use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "licitar";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "LICITAR_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Remote,
    Local,
}

/// One embedding provider in fallback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Providers tried in order; first to respond within budget wins.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Retry attempts for dependency failures before the stage fails.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_window")]
    pub window: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_window() -> usize {
    1_000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window: default_chunk_window(),
            overlap: default_chunk_overlap(),
        }
    }
}

/// Full runtime configuration for the analysis core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root under which artifacts/, comparisons/ and vectors/ live.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Override paths for the data tables; built-in defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicators_path: Option<PathBuf>,

    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Wall-clock budget per stage.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Upper bound for the post-classification worker pool; clamped to
    /// the available cores at run time.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

fn default_stage_timeout_ms() -> u64 {
    120_000
}

fn default_worker_pool_size() -> usize {
    3
}

fn default_data_root() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".licitar")
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            embedding: EmbeddingConfig::default(),
            taxonomy_path: None,
            rules_path: None,
            indicators_path: None,
            chunk: ChunkConfig::default(),
            stage_timeout_ms: default_stage_timeout_ms(),
            worker_pool_size: default_worker_pool_size(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk.window == 0 {
            return Err(ConfigError::Invalid("chunk.window must be > 0".into()));
        }
        if self.chunk.overlap >= self.chunk.window {
            return Err(ConfigError::Invalid(
                "chunk.overlap must be smaller than chunk.window".into(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid("worker.pool_size must be >= 1".into()));
        }
        for (i, provider) in self.embedding.providers.iter().enumerate() {
            if provider.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "embedding.providers[{i}]: model must not be empty"
                )));
            }
            if provider.kind == ProviderKind::Local && provider.endpoint.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "embedding.providers[{i}]: local provider requires an endpoint"
                )));
            }
        }
        Ok(())
    }

    /// Effective pool size for the concurrent validation/risk/ruc stages.
    pub fn effective_pool_size(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_pool_size.min(cores).max(1)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_root.join("artifacts")
    }

    pub fn comparisons_dir(&self) -> PathBuf {
        self.data_root.join("comparisons")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_root.join("vectors")
    }
}
