//! Discovery scanner.
//!
//! A scan pass walks every root single-threaded, classifies each regular file
//! and merges hits into the registry, then saves the cache. The continuous
//! mode repeats passes on an interval until stopped.

use crate::cancel::CancellationToken;
use crate::config::{DiscoveryDefaults, TrawlConfig};
use crate::discovery::classifier::{classify, ClassifierConfig};
use crate::discovery::registry::{DiscoveryRegistry, MergeOutcome};
use crate::discovery::roots::enumerate_roots;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Summary of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub roots_scanned: usize,
    pub files_visited: u64,
    pub candidates: u64,
    /// Records added to the registry for the first time
    pub new_assets: usize,
    pub replaced: usize,
    /// Records whose stored copy had disappeared and now point at a new path
    #[serde(default)]
    pub moved: usize,
    /// Walk or read errors that were logged and skipped
    pub errors: u64,
    pub duration_ms: u64,
    /// Set when the pass stopped early on cancellation
    pub cancelled: bool,
}

/// Run one pass over `roots`, merging results into `registry`.
///
/// Walk errors are logged per entry and never abort the pass. The registry is
/// saved at the end; a failed save is logged and retried by the next pass.
pub fn run_scan_pass<'a>(
    roots: impl IntoIterator<Item = &'a Path>,
    registry: &DiscoveryRegistry,
    classifier: &ClassifierConfig,
    cancel: Option<&CancellationToken>,
) -> ScanReport {
    let start = Instant::now();
    let mut report = ScanReport::default();

    'roots: for root in roots {
        if !root.is_dir() {
            debug!("Skipping missing root {}", root.display());
            continue;
        }
        report.roots_scanned += 1;

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                report.cancelled = true;
                break 'roots;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors += 1;
                    warn!("Cannot access {}: {}", display_walk_path(&e), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.files_visited += 1;

            let Some(record) = classify(entry.path(), classifier) else {
                continue;
            };
            report.candidates += 1;
            match registry.merge(record) {
                MergeOutcome::Inserted => report.new_assets += 1,
                MergeOutcome::Replaced => report.replaced += 1,
                MergeOutcome::Moved => report.moved += 1,
                MergeOutcome::Refreshed | MergeOutcome::Kept => {}
            }
        }
    }

    registry.mark_scanned();
    if let Err(e) = registry.save() {
        error!("Failed to save discovery cache: {}", e);
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Model scan completed: {} new assets ({} candidates, {} files) in {}ms",
        report.new_assets, report.candidates, report.files_visited, report.duration_ms
    );
    report
}

fn display_walk_path(e: &walkdir::Error) -> String {
    e.path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

struct RunningLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Background scanner with idempotent start/stop.
pub struct DiscoveryScanner {
    registry: Arc<DiscoveryRegistry>,
    config: Arc<RwLock<TrawlConfig>>,
    running: tokio::sync::Mutex<Option<RunningLoop>>,
    /// Serializes passes so an on-demand scan never overlaps the loop's.
    pass_lock: Arc<tokio::sync::Mutex<()>>,
}

impl DiscoveryScanner {
    pub fn new(registry: Arc<DiscoveryRegistry>, config: Arc<RwLock<TrawlConfig>>) -> Self {
        Self {
            registry,
            config,
            running: tokio::sync::Mutex::new(None),
            pass_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &Arc<DiscoveryRegistry> {
        &self.registry
    }

    /// Current scan roots, re-enumerated from the live config.
    ///
    /// Volume probing and existence checks run on the blocking pool.
    pub async fn roots(&self) -> Vec<PathBuf> {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner).clone();
        match tokio::task::spawn_blocking(move || enumerate_roots(&config)).await {
            Ok(roots) => roots.into_iter().collect(),
            Err(e) => {
                error!("Root enumeration panicked: {}", e);
                Vec::new()
            }
        }
    }

    /// Run a single pass now.
    pub async fn scan_now(&self) -> ScanReport {
        run_pass(
            self.registry.clone(),
            self.config.clone(),
            self.pass_lock.clone(),
            None,
        )
        .await
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start the continuous loop.
    ///
    /// Returns `false` (and logs a warning) if it is already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().map(|r| !r.handle.is_finished()).unwrap_or(false) {
            warn!("Discovery already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(continuous_loop(
            self.registry.clone(),
            self.config.clone(),
            self.pass_lock.clone(),
            cancel.clone(),
        ));
        *running = Some(RunningLoop { handle, cancel });
        info!("Started continuous model discovery");
        true
    }

    /// Signal the loop to stop and wait a bounded time for it to exit.
    ///
    /// Returns even if the loop has not observed the signal yet; a pass in
    /// progress notices the cancellation at its next file.
    pub async fn stop(&self) {
        let Some(RunningLoop { handle, cancel }) = self.running.lock().await.take() else {
            return;
        };
        cancel.cancel();
        match tokio::time::timeout(DiscoveryDefaults::STOP_JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Discovery loop ended abnormally: {}", e),
            Err(_) => warn!(
                "Discovery loop did not stop within {:?}; detaching",
                DiscoveryDefaults::STOP_JOIN_TIMEOUT
            ),
        }
        info!("Stopped model discovery");
    }
}

async fn run_pass(
    registry: Arc<DiscoveryRegistry>,
    config: Arc<RwLock<TrawlConfig>>,
    pass_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: Option<CancellationToken>,
) -> ScanReport {
    let _guard = pass_lock.lock().await;
    let result = tokio::task::spawn_blocking(move || {
        let config = config.read().unwrap_or_else(PoisonError::into_inner).clone();
        let roots = enumerate_roots(&config);
        let classifier = ClassifierConfig::from(&config);
        run_scan_pass(
            roots.iter().map(|p| p.as_path()),
            &registry,
            &classifier,
            cancel.as_ref(),
        )
    })
    .await;

    match result {
        Ok(report) => report,
        Err(e) => {
            error!("Discovery pass panicked: {}", e);
            ScanReport {
                errors: 1,
                ..ScanReport::default()
            }
        }
    }
}

async fn continuous_loop(
    registry: Arc<DiscoveryRegistry>,
    config: Arc<RwLock<TrawlConfig>>,
    pass_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let report = run_pass(
            registry.clone(),
            config.clone(),
            pass_lock.clone(),
            Some(cancel.clone()),
        )
        .await;

        let delay = if report.errors > 0 && report.roots_scanned == 0 {
            DiscoveryDefaults::ERROR_BACKOFF
        } else {
            config
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .scan_interval()
        };
        if cancel.sleep(delay).await {
            break;
        }
    }
    debug!("Discovery loop exiting");
}
