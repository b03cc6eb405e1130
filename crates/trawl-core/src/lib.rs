//! Trawl Core - Headless library for local model discovery and learning.
//!
//! Trawl walks the filesystem and attached volumes for model weight files,
//! keeps a deduplicated registry of what it finds, and runs bounded-concurrency
//! learning tasks (knowledge extraction, behavior modeling, parameter
//! analysis) against the discovered models through a local inference service.
//!
//! # Example
//!
//! ```rust,ignore
//! use trawl_core::{LearningMethod, TrawlApi};
//!
//! #[tokio::main]
//! async fn main() -> trawl_core::Result<()> {
//!     let api = TrawlApi::builder("./trawl-data")
//!         .auto_create_dirs(true)
//!         .build()
//!         .await?;
//!
//!     let report = api.scan_now().await;
//!     println!("Found {} new models", report.new_assets);
//!
//!     if let Some(asset) = api.discovered_assets().first() {
//!         api.create_learning_task(&asset.fingerprint, LearningMethod::ParameterAnalysis)?;
//!     }
//!     api.start_learning();
//!
//!     api.shutdown().await
//! }
//! ```

pub mod atomic;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod learning;

mod api;

pub use cancel::CancellationToken;
pub use config::TrawlConfig;
pub use discovery::{
    AssetFormat, AssetKind, AssetRecord, DiscoveryRegistry, DiscoveryScanner, DiscoveryStats,
    ScanReport,
};
pub use error::{Result, TrawlError};
pub use learning::{
    KnowledgeItem, LearningMethod, LearningStats, LearningTask, TaskScheduler, TaskStatus,
};

pub use api::TrawlApiBuilder;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Main API struct for Trawl operations.
///
/// Owns the discovery registry, the scanner loop and the learning scheduler.
/// Built once through [`TrawlApi::builder`] and torn down with
/// [`TrawlApi::shutdown`]; there is no global instance.
pub struct TrawlApi {
    /// Root directory for config, caches and learning results
    data_dir: PathBuf,
    config_path: PathBuf,
    /// Live configuration, shared with the scanner
    config: Arc<RwLock<TrawlConfig>>,
    registry: Arc<DiscoveryRegistry>,
    scanner: DiscoveryScanner,
    scheduler: TaskScheduler,
}

impl TrawlApi {
    /// Create a builder for TrawlApi.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let api = TrawlApi::builder("./trawl-data")
    ///     .auto_create_dirs(true)
    ///     .scan_volumes(false)
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder(data_dir: impl Into<PathBuf>) -> TrawlApiBuilder {
        TrawlApiBuilder::new(data_dir)
    }

    /// Create a TrawlApi with default options. The data directory must exist.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        TrawlApiBuilder::new(data_dir).build().await
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> TrawlConfig {
        self.config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
