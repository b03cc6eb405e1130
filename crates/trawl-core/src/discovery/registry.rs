//! Fingerprint-keyed registry of discovered assets.
//!
//! The registry is shared between the scanner (writer) and the scheduler
//! (reader). A coarse `RwLock` is held only for the duration of a single
//! lookup or merge, so readers never observe a half-applied update.
//!
//! Persistence format (`discovered_models.json`):
//!
//! ```json
//! { "lastScan": 1718000000.5, "models": { "<fingerprint>": { ...AssetRecord } } }
//! ```

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::discovery::types::{AssetKind, AssetRecord, DiscoveryStats};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// What [`DiscoveryRegistry::merge`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First time this fingerprint was seen
    Inserted,
    /// Replaced an existing record with a larger copy
    Replaced,
    /// Same copy rediscovered; metadata and timestamps updated
    Refreshed,
    /// Stored path no longer exists; record now points at the new copy
    Moved,
    /// Existing record kept as is
    Kept,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    last_scan: f64,
    #[serde(default)]
    models: BTreeMap<String, AssetRecord>,
}

/// In-memory asset registry backed by a JSON cache file.
pub struct DiscoveryRegistry {
    assets: RwLock<HashMap<String, AssetRecord>>,
    last_scan: RwLock<Option<f64>>,
    cache_path: PathBuf,
}

impl DiscoveryRegistry {
    /// Create an empty registry that persists to `cache_path`.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            last_scan: RwLock::new(None),
            cache_path: cache_path.into(),
        }
    }

    /// Load a registry from its cache file.
    ///
    /// A missing file yields an empty registry; a corrupt one is an error.
    pub fn load(cache_path: impl Into<PathBuf>) -> Result<Self> {
        let registry = Self::new(cache_path);
        if let Some(cache) = atomic_read_json::<CacheFile>(&registry.cache_path)? {
            let count = cache.models.len();
            *registry.write_assets() = cache.models.into_iter().collect();
            *registry
                .last_scan
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(cache.last_scan);
            info!(
                "Loaded {} assets from {}",
                count,
                registry.cache_path.display()
            );
        }
        Ok(registry)
    }

    /// Like [`load`](Self::load), but falls back to an empty registry when the
    /// cache cannot be read. The next successful save overwrites the bad file.
    pub fn open(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        match Self::load(&cache_path) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(
                    "Ignoring unreadable discovery cache {}: {}",
                    cache_path.display(),
                    e
                );
                Self::new(cache_path)
            }
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    fn read_assets(&self) -> RwLockReadGuard<'_, HashMap<String, AssetRecord>> {
        self.assets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_assets(&self) -> RwLockWriteGuard<'_, HashMap<String, AssetRecord>> {
        self.assets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a freshly classified record.
    ///
    /// On a fingerprint collision the record with the larger `size_bytes`
    /// wins; an equal-size rediscovery at the same path refreshes metadata
    /// and timestamps. If the stored copy has vanished from disk, the new
    /// sighting replaces it whatever its size.
    pub fn merge(&self, record: AssetRecord) -> MergeOutcome {
        let mut assets = self.write_assets();
        match assets.get_mut(&record.fingerprint) {
            None => {
                debug!("Registered asset {} ({})", record.name, record.fingerprint);
                assets.insert(record.fingerprint.clone(), record);
                MergeOutcome::Inserted
            }
            Some(existing) if record.size_bytes > existing.size_bytes => {
                debug!(
                    "Replacing {} with larger copy at {}",
                    existing.fingerprint,
                    record.path.display()
                );
                *existing = record;
                MergeOutcome::Replaced
            }
            Some(existing)
                if record.size_bytes == existing.size_bytes && record.path == existing.path =>
            {
                existing.metadata = record.metadata;
                existing.modified_at = record.modified_at;
                existing.created_at = record.created_at;
                MergeOutcome::Refreshed
            }
            Some(existing) if !existing.path.exists() => {
                debug!(
                    "Asset {} moved from {} to {}",
                    existing.fingerprint,
                    existing.path.display(),
                    record.path.display()
                );
                *existing = record;
                MergeOutcome::Moved
            }
            Some(_) => MergeOutcome::Kept,
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<AssetRecord> {
        self.read_assets().get(fingerprint).cloned()
    }

    /// Remove an asset. Tasks that still reference it fail when they run.
    pub fn remove(&self, fingerprint: &str) -> Option<AssetRecord> {
        self.write_assets().remove(fingerprint)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.read_assets().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.read_assets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_assets().is_empty()
    }

    /// Point-in-time copy of all records, keyed by fingerprint.
    pub fn snapshot(&self) -> BTreeMap<String, AssetRecord> {
        self.read_assets()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Records of one kind, largest first.
    pub fn by_kind(&self, kind: AssetKind) -> Vec<AssetRecord> {
        let mut records: Vec<_> = self
            .read_assets()
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| a.name.cmp(&b.name))
        });
        records
    }

    pub fn last_scan(&self) -> Option<f64> {
        *self.last_scan.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the completion time of a scan pass.
    pub fn mark_scanned(&self) {
        *self.last_scan.write().unwrap_or_else(PoisonError::into_inner) = Some(epoch_now());
    }

    /// Totals by format and kind.
    pub fn stats(&self) -> DiscoveryStats {
        let assets = self.read_assets();
        let mut stats = DiscoveryStats {
            total_assets: assets.len(),
            last_scan: self.last_scan(),
            ..DiscoveryStats::default()
        };
        for asset in assets.values() {
            *stats
                .totals_by_format
                .entry(asset.format.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .totals_by_kind
                .entry(asset.kind.as_str().to_string())
                .or_insert(0) += 1;
            stats.total_size_bytes += asset.size_bytes;
        }
        stats
    }

    /// Write the registry to its cache file atomically.
    pub fn save(&self) -> Result<()> {
        let cache = CacheFile {
            last_scan: self.last_scan().unwrap_or_else(epoch_now),
            models: self.snapshot(),
        };
        atomic_write_json(&self.cache_path, &cache)?;
        debug!(
            "Saved {} assets to {}",
            cache.models.len(),
            self.cache_path.display()
        );
        Ok(())
    }

    /// Drop every record and delete the cache file.
    pub fn clear(&self) -> Result<()> {
        self.write_assets().clear();
        *self.last_scan.write().unwrap_or_else(PoisonError::into_inner) = None;
        match std::fs::remove_file(&self.cache_path) {
            Ok(()) => {
                info!("Cleared discovery cache {}", self.cache_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::TrawlError::io_with_path(e, &self.cache_path)),
        }
    }
}

fn epoch_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
