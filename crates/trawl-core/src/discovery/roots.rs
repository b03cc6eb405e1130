//! Scan root enumeration.
//!
//! Combines the well-known model locations, operator-added paths and the
//! `models`/`AI_Models`/`Downloads` folders of attached volumes into one
//! deduplicated set.

use crate::config::{DiscoveryDefaults, TrawlConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{debug, info};

/// A mounted volume as seen by the enumerator.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub mount_point: PathBuf,
    pub total_space: u64,
    pub is_removable: bool,
}

/// Well-known locations where model files tend to live.
pub fn default_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("models"));
        roots.push(home.join(".cache").join("huggingface"));
        roots.push(home.join(".ollama").join("models"));
        roots.push(home.join("Downloads"));
        roots.push(home.join("Documents").join("AI_Models"));
    }

    #[cfg(windows)]
    {
        roots.push(PathBuf::from("C:/Models"));
        roots.push(PathBuf::from("C:/ProgramData/Models"));
    }

    #[cfg(not(windows))]
    {
        roots.push(PathBuf::from("/opt/models"));
        roots.push(PathBuf::from("/usr/local/share/models"));
    }

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.join("models"));
    }

    roots
}

/// Query the OS for mounted volumes.
///
/// `sysinfo` has no failure path of its own; an empty list simply contributes
/// no extra roots.
pub fn list_volumes() -> Vec<VolumeInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| VolumeInfo {
            mount_point: disk.mount_point().to_path_buf(),
            total_space: disk.total_space(),
            is_removable: disk.is_removable(),
        })
        .collect()
}

/// Whether `mount_point` is the volume the OS booted from.
fn is_boot_volume(mount_point: &Path) -> bool {
    #[cfg(windows)]
    {
        let system_drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        mount_point
            .to_string_lossy()
            .to_uppercase()
            .starts_with(&system_drive.to_uppercase())
    }

    #[cfg(not(windows))]
    {
        mount_point == Path::new("/")
    }
}

/// Candidate roots contributed by attached volumes.
///
/// Removable media is always accepted. Other volumes are skipped when they
/// are the boot volume or larger than the external-volume threshold.
pub fn volume_roots(volumes: &[VolumeInfo]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for volume in volumes {
        if is_boot_volume(&volume.mount_point) {
            continue;
        }
        if !volume.is_removable && volume.total_space > DiscoveryDefaults::EXTERNAL_VOLUME_MAX_BYTES
        {
            debug!(
                "Skipping large internal volume {}",
                volume.mount_point.display()
            );
            continue;
        }
        for subdir in DiscoveryDefaults::VOLUME_SUBDIRS {
            roots.push(volume.mount_point.join(subdir));
        }
    }
    roots
}

/// A root is kept when it exists or its parent does, so a folder the user is
/// about to create is still picked up on the next pass.
fn is_plausible_root(path: &Path) -> bool {
    path.exists() || path.parent().map(|p| p.exists()).unwrap_or(false)
}

/// Build the full scan root set from explicit inputs.
pub fn collect_roots(
    defaults: Vec<PathBuf>,
    operator_paths: &[PathBuf],
    volumes: &[VolumeInfo],
) -> BTreeSet<PathBuf> {
    defaults
        .into_iter()
        .chain(operator_paths.iter().cloned())
        .chain(volume_roots(volumes))
        .filter(|p| is_plausible_root(p))
        .collect()
}

/// Enumerate every root the scanner should walk.
pub fn enumerate_roots(config: &TrawlConfig) -> BTreeSet<PathBuf> {
    let volumes = if config.scan_volumes {
        list_volumes()
    } else {
        Vec::new()
    };
    let defaults = if config.scan_default_roots {
        default_roots()
    } else {
        Vec::new()
    };
    let roots = collect_roots(defaults, &config.scan_paths, &volumes);
    info!(
        "Enumerated {} scan roots ({} volumes checked)",
        roots.len(),
        volumes.len()
    );
    roots
}
