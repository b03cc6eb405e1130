//! Builder for configuring TrawlApi initialization.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{PathsConfig, TrawlConfig};
use crate::discovery::{DiscoveryRegistry, DiscoveryScanner};
use crate::error::{Result, TrawlError};
use crate::learning::{InferenceClient, KnowledgeStore, TaskScheduler};
use crate::TrawlApi;

/// Builder for configuring TrawlApi initialization.
///
/// # Example
///
/// ```rust,ignore
/// use trawl_core::TrawlApi;
///
/// let api = TrawlApi::builder("./trawl-data")
///     .auto_create_dirs(true)
///     .scan_volumes(false)
///     .inference_base_url("http://10.0.0.5:11434/api")
///     .build()
///     .await?;
/// ```
pub struct TrawlApiBuilder {
    data_dir: PathBuf,
    auto_create_dirs: bool,
    config: Option<TrawlConfig>,
    scan_volumes: Option<bool>,
    scan_default_roots: Option<bool>,
    inference_base_url: Option<String>,
}

impl TrawlApiBuilder {
    /// Create a new builder with the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            auto_create_dirs: false,
            config: None,
            scan_volumes: None,
            scan_default_roots: None,
            inference_base_url: None,
        }
    }

    /// Auto-create the data directory and its `cache/` and `learning/`
    /// subdirectories.
    ///
    /// Default: `false` (the data directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use this configuration instead of `trawl-config.json`.
    ///
    /// The file is still written when operator scan paths change.
    pub fn with_config(mut self, config: TrawlConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enable or disable probing mounted volumes for extra scan roots.
    pub fn scan_volumes(mut self, enable: bool) -> Self {
        self.scan_volumes = Some(enable);
        self
    }

    /// Enable or disable the well-known per-user and system model folders.
    pub fn scan_default_roots(mut self, enable: bool) -> Self {
        self.scan_default_roots = Some(enable);
        self
    }

    /// Override the inference service base URL.
    pub fn inference_base_url(mut self, url: impl Into<String>) -> Self {
        self.inference_base_url = Some(url.into());
        self
    }

    fn create_directory_structure(data_dir: &Path) -> Result<()> {
        let dirs = [
            data_dir.to_path_buf(),
            data_dir.join(PathsConfig::CACHE_DIR_NAME),
            data_dir.join(PathsConfig::LEARNING_DIR_NAME),
        ];
        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| TrawlError::Io {
                    message: format!("Failed to create directory: {}", dir.display()),
                    path: Some(dir.clone()),
                    source: Some(e),
                })?;
            }
        }
        Ok(())
    }

    /// Build the TrawlApi instance.
    ///
    /// Loads the config, the discovery cache and any saved learning tasks.
    /// Background loops are not started; call `start_discovery` and
    /// `start_learning` for that.
    pub async fn build(self) -> Result<TrawlApi> {
        if self.auto_create_dirs {
            Self::create_directory_structure(&self.data_dir)?;
        } else if !self.data_dir.is_dir() {
            return Err(TrawlError::Config {
                message: format!("Data directory does not exist: {}", self.data_dir.display()),
            });
        }

        let config_path = self.data_dir.join(PathsConfig::CONFIG_FILENAME);
        let mut config = match self.config {
            Some(config) => config,
            None => TrawlConfig::load(&config_path)?,
        };
        if let Some(enable) = self.scan_volumes {
            config.scan_volumes = enable;
        }
        if let Some(enable) = self.scan_default_roots {
            config.scan_default_roots = enable;
        }
        if let Some(url) = self.inference_base_url {
            config.inference_base_url = url;
        }
        config.validate()?;

        let registry = Arc::new(DiscoveryRegistry::open(
            self.data_dir
                .join(PathsConfig::CACHE_DIR_NAME)
                .join(PathsConfig::DISCOVERY_CACHE_FILENAME),
        ));

        let learning_dir = self.data_dir.join(PathsConfig::LEARNING_DIR_NAME);
        let knowledge = Arc::new(KnowledgeStore::open(
            learning_dir.join(PathsConfig::KNOWLEDGE_FILENAME),
        ));
        let client = InferenceClient::new(&config.inference_base_url)?;
        let scheduler = TaskScheduler::open(
            registry.clone(),
            client,
            knowledge,
            learning_dir.join(PathsConfig::TASKS_FILENAME),
            config.query_timeout(),
        );

        let config = Arc::new(RwLock::new(config));
        let scanner = DiscoveryScanner::new(registry.clone(), config.clone());

        tracing::info!(
            "Trawl initialized at {} ({} cached assets)",
            self.data_dir.display(),
            registry.len()
        );

        Ok(TrawlApi {
            data_dir: self.data_dir,
            config_path,
            config,
            registry,
            scanner,
            scheduler,
        })
    }
}
