//! Discovered asset records and their classification enums.

use crate::error::TrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// On-disk format of a discovered asset.
///
/// The serde tags are part of the cache file format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetFormat {
    /// Quantized llama.cpp weights (`.gguf`)
    #[serde(rename = "gguf")]
    QuantizedBinary,
    /// Generic tensor checkpoint (safetensors, PyTorch pickles)
    #[serde(rename = "checkpoint")]
    TensorCheckpoint,
    /// Portable graph formats such as ONNX
    #[serde(rename = "onnx")]
    GenericBinary,
    /// Weights owned by a local inference server; only reachable over HTTP
    #[serde(rename = "hosted")]
    VendorHosted,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AssetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetFormat::QuantizedBinary => "gguf",
            AssetFormat::TensorCheckpoint => "checkpoint",
            AssetFormat::GenericBinary => "onnx",
            AssetFormat::VendorHosted => "hosted",
            AssetFormat::Unknown => "unknown",
        }
    }

    /// Map a lower-case file extension (without the dot) to a format.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "gguf" => AssetFormat::QuantizedBinary,
            "safetensors" | "pt" | "pth" | "bin" => AssetFormat::TensorCheckpoint,
            "onnx" => AssetFormat::GenericBinary,
            _ => AssetFormat::Unknown,
        }
    }
}

impl std::fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse semantic type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKind {
    #[serde(rename = "llm")]
    LanguageModel,
    #[serde(rename = "embedding")]
    EmbeddingModel,
    #[serde(rename = "vision")]
    VisionModel,
    #[serde(rename = "audio")]
    AudioModel,
    #[serde(rename = "multimodal")]
    MultimodalModel,
}

impl AssetKind {
    pub const ALL: [AssetKind; 5] = [
        AssetKind::LanguageModel,
        AssetKind::EmbeddingModel,
        AssetKind::VisionModel,
        AssetKind::AudioModel,
        AssetKind::MultimodalModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::LanguageModel => "llm",
            AssetKind::EmbeddingModel => "embedding",
            AssetKind::VisionModel => "vision",
            AssetKind::AudioModel => "audio",
            AssetKind::MultimodalModel => "multimodal",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetKind {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TrawlError::Validation {
                field: "kind".to_string(),
                message: format!("Unknown asset kind '{}'", s),
            })
    }
}

/// One discovered candidate model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// File stem
    pub name: String,
    /// Absolute path at which the asset was last seen
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: AssetFormat,
    pub kind: AssetKind,
    /// Registry key; see [`crate::discovery::fingerprint`]
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AssetRecord {
    /// Look up a string metadata value.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Aggregate counts over the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStats {
    pub total_assets: usize,
    pub totals_by_format: BTreeMap<String, usize>,
    pub totals_by_kind: BTreeMap<String, usize>,
    pub total_size_bytes: u64,
    #[serde(default)]
    pub scan_paths: usize,
    #[serde(default)]
    pub is_scanning: bool,
    /// Epoch seconds of the last completed pass
    #[serde(default)]
    pub last_scan: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_tags_are_exact() {
        assert_eq!(
            serde_json::to_string(&AssetFormat::QuantizedBinary).unwrap(),
            "\"gguf\""
        );
        assert_eq!(
            serde_json::to_string(&AssetKind::LanguageModel).unwrap(),
            "\"llm\""
        );
        let parsed: AssetFormat = serde_json::from_str("\"hosted\"").unwrap();
        assert_eq!(parsed, AssetFormat::VendorHosted);
    }

    #[test]
    fn test_as_str_matches_serde_tag() {
        for format in [
            AssetFormat::QuantizedBinary,
            AssetFormat::TensorCheckpoint,
            AssetFormat::GenericBinary,
            AssetFormat::VendorHosted,
            AssetFormat::Unknown,
        ] {
            let tag = serde_json::to_value(format).unwrap();
            assert_eq!(tag.as_str(), Some(format.as_str()));
        }
    }

    #[test]
    fn test_kind_parses_from_tag() {
        for kind in AssetKind::ALL {
            assert_eq!(kind.as_str().parse::<AssetKind>().unwrap(), kind);
        }
        assert!("llama".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(AssetFormat::from_extension("gguf"), AssetFormat::QuantizedBinary);
        assert_eq!(AssetFormat::from_extension("pth"), AssetFormat::TensorCheckpoint);
        assert_eq!(AssetFormat::from_extension("onnx"), AssetFormat::GenericBinary);
        assert_eq!(AssetFormat::from_extension("pb"), AssetFormat::Unknown);
    }
}
