//! Local model discovery.
//!
//! - [`roots`]: which directories to walk
//! - [`classifier`]: whether a file is a model, and what kind
//! - [`fingerprint`]: content identity for deduplication
//! - [`registry`]: fingerprint-keyed records with a JSON cache
//! - [`scanner`]: single passes and the background loop

pub mod classifier;
pub mod fingerprint;
pub mod registry;
pub mod roots;
pub mod scanner;
pub mod types;

pub use classifier::{classify, detect_kind, ClassifierConfig};
pub use fingerprint::compute_fingerprint;
pub use registry::{DiscoveryRegistry, MergeOutcome};
pub use roots::{enumerate_roots, VolumeInfo};
pub use scanner::{run_scan_pass, DiscoveryScanner, ScanReport};
pub use types::{AssetFormat, AssetKind, AssetRecord, DiscoveryStats};
