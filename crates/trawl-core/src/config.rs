//! Centralized configuration for Trawl.
//!
//! Constant tables hold the fixed thresholds; [`TrawlConfig`] is the
//! operator-editable part, persisted as JSON in the data directory.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::error::{Result, TrawlError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Classifier and scanner thresholds.
pub struct DiscoveryDefaults;

impl DiscoveryDefaults {
    /// Files smaller than this are never treated as model weights.
    pub const MIN_MODEL_SIZE: u64 = 1024 * 1024;
    /// Bytes hashed from each end of a large file.
    pub const FINGERPRINT_CHUNK: u64 = 1024 * 1024;
    /// Files up to this size are hashed whole.
    pub const WHOLE_FILE_HASH_LIMIT: u64 = 2 * 1024 * 1024;
    /// Hex characters of the SHA-256 digest kept as the fingerprint.
    pub const FINGERPRINT_LEN: usize = 16;
    pub const SCAN_INTERVAL: Duration = Duration::from_secs(300);
    pub const ERROR_BACKOFF: Duration = Duration::from_secs(60);
    pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
    /// Volumes larger than this are assumed to be internal disks.
    pub const EXTERNAL_VOLUME_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024 * 1024;

    pub const FILE_EXTENSIONS: &'static [&'static str] =
        &[".gguf", ".bin", ".safetensors", ".pt", ".pth", ".onnx"];

    pub const MODEL_INDICATORS: &'static [&'static str] = &[
        "model",
        "llm",
        "gpt",
        "bert",
        "transformer",
        "neural",
        "embedding",
        "vision",
        "audio",
        "multimodal",
        "chat",
        "instruct",
        "base",
        "fine",
        "tune",
        "lora",
        "adapter",
        "llama",
        "mistral",
        "qwen",
        "gemma",
        "phi",
        "gguf",
    ];

    /// Subdirectories checked on every candidate volume.
    pub const VOLUME_SUBDIRS: &'static [&'static str] = &["models", "AI_Models", "Downloads"];
}

/// Scheduler and extraction settings.
pub struct LearningDefaults;

impl LearningDefaults {
    pub const MAX_CONCURRENT_TASKS: usize = 2;
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
    pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
    /// Assets above this size are skipped by bulk enqueueing.
    pub const MAX_MODEL_SIZE: u64 = 50 * 1024 * 1024 * 1024;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const INFERENCE_BASE_URL: &'static str = "http://127.0.0.1:11434/api";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const USER_AGENT: &'static str = "trawl";
}

/// Data directory layout.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONFIG_FILENAME: &'static str = "trawl-config.json";
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const DISCOVERY_CACHE_FILENAME: &'static str = "discovered_models.json";
    pub const LEARNING_DIR_NAME: &'static str = "learning";
    pub const TASKS_FILENAME: &'static str = "learning_tasks.json";
    pub const KNOWLEDGE_FILENAME: &'static str = "extracted_knowledge.json";
}

/// Operator-editable settings.
///
/// Missing fields fall back to the defaults, so a hand-written file only needs
/// the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrawlConfig {
    /// Extra roots added by the operator on top of the enumerated defaults.
    pub scan_paths: Vec<PathBuf>,
    pub file_extensions: Vec<String>,
    pub model_indicators: Vec<String>,
    pub scan_interval_secs: u64,
    pub max_concurrent_tasks: usize,
    pub inference_base_url: String,
    pub query_timeout_secs: u64,
    pub max_model_size: u64,
    /// Include the well-known per-user and system model folders.
    pub scan_default_roots: bool,
    /// Search mounted volumes for extra roots.
    pub scan_volumes: bool,
}

impl Default for TrawlConfig {
    fn default() -> Self {
        Self {
            scan_paths: Vec::new(),
            file_extensions: DiscoveryDefaults::FILE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            model_indicators: DiscoveryDefaults::MODEL_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scan_interval_secs: DiscoveryDefaults::SCAN_INTERVAL.as_secs(),
            max_concurrent_tasks: LearningDefaults::MAX_CONCURRENT_TASKS,
            inference_base_url: NetworkConfig::INFERENCE_BASE_URL.to_string(),
            query_timeout_secs: LearningDefaults::QUERY_TIMEOUT.as_secs(),
            max_model_size: LearningDefaults::MAX_MODEL_SIZE,
            scan_default_roots: true,
            scan_volumes: true,
        }
    }
}

impl TrawlConfig {
    /// Load the config file, or defaults if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = atomic_read_json(path)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    /// Reject settings the scanner or scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(TrawlError::Validation {
                field: "max_concurrent_tasks".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scan_interval_secs == 0 {
            return Err(TrawlError::Validation {
                field: "scan_interval_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.file_extensions.is_empty() {
            return Err(TrawlError::Validation {
                field: "file_extensions".to_string(),
                message: "at least one extension is required".to_string(),
            });
        }
        let url = url::Url::parse(&self.inference_base_url).map_err(|e| TrawlError::Config {
            message: format!("Invalid inference_base_url '{}': {}", self.inference_base_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TrawlError::Config {
                message: format!("Unsupported inference URL scheme: {}", url.scheme()),
            });
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TrawlConfig::default().validate().is_ok());
        assert!(DiscoveryDefaults::WHOLE_FILE_HASH_LIMIT == 2 * DiscoveryDefaults::FINGERPRINT_CHUNK);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(PathsConfig::CONFIG_FILENAME);
        std::fs::write(&path, r#"{"max_concurrent_tasks": 4}"#).unwrap();

        let config = TrawlConfig::load(&path).unwrap();
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.scan_interval_secs, 300);
        assert!(config.file_extensions.contains(&".gguf".to_string()));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrawlConfig::load(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TrawlConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = TrawlConfig {
            max_concurrent_tasks: 0,
            ..TrawlConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrawlConfig {
            inference_base_url: "ftp://example.com".to_string(),
            ..TrawlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
