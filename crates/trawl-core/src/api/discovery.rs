//! Discovery methods on TrawlApi.

use std::path::{Path, PathBuf};
use std::sync::PoisonError;

use crate::discovery::{AssetKind, AssetRecord, DiscoveryStats, ScanReport};
use crate::error::{Result, TrawlError};
use crate::TrawlApi;

impl TrawlApi {
    // ========================================
    // Scan paths
    // ========================================

    /// Add an operator scan path and persist it to the config file.
    ///
    /// The config lock is held through the save so concurrent edits are
    /// written in the order they were applied.
    ///
    /// Returns `false` if the path was already configured.
    pub fn add_scan_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(TrawlError::Validation {
                field: "path".to_string(),
                message: format!("Not a directory: {}", path.display()),
            });
        }
        let path = std::path::absolute(path).map_err(|e| TrawlError::io_with_path(e, path))?;

        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if config.scan_paths.contains(&path) {
            return Ok(false);
        }
        config.scan_paths.push(path.clone());
        config.save(&self.config_path)?;
        drop(config);
        tracing::info!("Added scan path {}", path.display());
        Ok(true)
    }

    /// Remove an operator scan path and persist the change.
    pub fn remove_scan_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let before = config.scan_paths.len();
        config.scan_paths.retain(|p| p != path && *p != absolute);
        if config.scan_paths.len() == before {
            return Err(TrawlError::ScanPathNotFound(path.to_path_buf()));
        }
        config.save(&self.config_path)?;
        drop(config);
        tracing::info!("Removed scan path {}", path.display());
        Ok(())
    }

    /// Operator-added scan paths.
    pub fn scan_paths(&self) -> Vec<PathBuf> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .scan_paths
            .clone()
    }

    /// Every root the next scan pass will walk.
    pub async fn scan_roots(&self) -> Vec<PathBuf> {
        self.scanner.roots().await
    }

    // ========================================
    // Registry
    // ========================================

    /// All discovered assets, ordered by name.
    pub fn discovered_assets(&self) -> Vec<AssetRecord> {
        let mut assets: Vec<_> = self.registry.snapshot().into_values().collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        assets
    }

    /// Discovered assets of one kind, largest first.
    pub fn assets_by_kind(&self, kind: AssetKind) -> Vec<AssetRecord> {
        self.registry.by_kind(kind)
    }

    /// The `limit` largest discovered language models.
    pub fn best_language_models(&self, limit: usize) -> Vec<AssetRecord> {
        let mut models = self.registry.by_kind(AssetKind::LanguageModel);
        models.truncate(limit);
        models
    }

    pub fn asset(&self, asset_id: &str) -> Result<AssetRecord> {
        self.registry
            .get(asset_id)
            .ok_or_else(|| TrawlError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })
    }

    /// Forget an asset and persist the registry.
    pub fn remove_asset(&self, asset_id: &str) -> Result<AssetRecord> {
        let removed = self
            .registry
            .remove(asset_id)
            .ok_or_else(|| TrawlError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;
        self.registry.save()?;
        Ok(removed)
    }

    pub async fn discovery_stats(&self) -> DiscoveryStats {
        let mut stats = self.registry.stats();
        stats.scan_paths = self.scan_roots().await.len();
        stats.is_scanning = self.scanner.is_running().await;
        stats
    }

    /// Drop every discovered asset and delete the cache file.
    pub fn clear_discovery_cache(&self) -> Result<()> {
        self.registry.clear()
    }

    // ========================================
    // Scanning
    // ========================================

    /// Run one scan pass now and wait for it.
    pub async fn scan_now(&self) -> ScanReport {
        self.scanner.scan_now().await
    }

    /// Start continuous discovery. Returns `false` if already running.
    pub async fn start_discovery(&self) -> bool {
        self.scanner.start().await
    }

    pub async fn stop_discovery(&self) {
        self.scanner.stop().await
    }

    pub async fn is_discovering(&self) -> bool {
        self.scanner.is_running().await
    }
}
