//! Bounded-cost content fingerprints.
//!
//! Multi-gigabyte weights cannot be hashed in full on every scan pass, so
//! large files are fingerprinted from their first and last megabyte only:
//! - files up to 2 MiB: SHA-256 of the whole file
//! - larger files: SHA-256 of (first 1 MiB ++ last 1 MiB)
//!
//! Only the first 16 hex characters are kept.

use crate::config::DiscoveryDefaults;
use crate::error::{Result, TrawlError};
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Compute the fingerprint of a file.
pub fn compute_fingerprint(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| TrawlError::io_with_path(e, path))?;

    let file_size = file
        .metadata()
        .map_err(|e| TrawlError::io_with_path(e, path))?
        .len();

    let mut hasher = Sha256::new();

    if file_size <= DiscoveryDefaults::WHOLE_FILE_HASH_LIMIT {
        let mut buffer = Vec::with_capacity(file_size as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| TrawlError::io_with_path(e, path))?;
        hasher.update(&buffer);
    } else {
        let chunk = DiscoveryDefaults::FINGERPRINT_CHUNK as usize;
        let mut buffer = vec![0u8; chunk];

        file.read_exact(&mut buffer)
            .map_err(|e| TrawlError::io_with_path(e, path))?;
        hasher.update(&buffer);

        file.seek(SeekFrom::End(-(DiscoveryDefaults::FINGERPRINT_CHUNK as i64)))
            .map_err(|e| TrawlError::io_with_path(e, path))?;
        file.read_exact(&mut buffer)
            .map_err(|e| TrawlError::io_with_path(e, path))?;
        hasher.update(&buffer);
    }

    Ok(truncate_digest(&hex::encode(hasher.finalize())))
}

fn truncate_digest(hex_digest: &str) -> String {
    hex_digest[..DiscoveryDefaults::FINGERPRINT_LEN].to_string()
}
