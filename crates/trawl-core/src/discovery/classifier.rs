//! Model file classification.
//!
//! Decides whether a file is a plausible model artifact and, if so, derives
//! its fingerprint, format and kind. Rejections are applied in order and
//! short-circuit:
//! 1. extension not in the allow-list
//! 2. smaller than 1 MiB
//! 3. filename has none of the model-indicator substrings
//!
//! Paths that are not valid UTF-8 are skipped as well, since the cache file
//! stores paths as JSON strings.

use crate::config::{DiscoveryDefaults, TrawlConfig};
use crate::discovery::fingerprint::compute_fingerprint;
use crate::discovery::types::{AssetFormat, AssetKind, AssetRecord};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::{debug, warn};

const VISION_TERMS: &[&str] = &["vision", "clip", "vit", "image", "visual"];
const AUDIO_TERMS: &[&str] = &["audio", "speech", "whisper", "wav2vec", "tts", "stt"];
const EMBEDDING_TERMS: &[&str] = &["embedding", "sentence", "e5", "bge", "gte"];
const MULTIMODAL_TERMS: &[&str] = &["multimodal", "llava", "blip", "flamingo"];

/// Directory name used by the local inference server's model store.
const INFERENCE_STORE_SEGMENT: &str = ".ollama";
const HF_SEGMENT: &str = "huggingface";
const HF_REPO_PREFIX: &str = "models--";

/// Allow-lists used by [`classify`], normalized to lower case.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Extensions including the leading dot, e.g. `.gguf`
    pub extensions: Vec<String>,
    pub indicators: Vec<String>,
    pub min_size: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from(&TrawlConfig::default())
    }
}

impl From<&TrawlConfig> for ClassifierConfig {
    fn from(config: &TrawlConfig) -> Self {
        Self {
            extensions: config
                .file_extensions
                .iter()
                .map(|e| {
                    let e = e.to_lowercase();
                    if e.starts_with('.') {
                        e
                    } else {
                        format!(".{}", e)
                    }
                })
                .collect(),
            indicators: config
                .model_indicators
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            min_size: DiscoveryDefaults::MIN_MODEL_SIZE,
        }
    }
}

/// Classify a file, returning `None` for anything that is not a model
/// candidate or cannot be read.
pub fn classify(path: &Path, config: &ClassifierConfig) -> Option<AssetRecord> {
    let extension = path.extension()?.to_string_lossy().to_lowercase();
    let dotted = format!(".{}", extension);
    if !config.extensions.iter().any(|e| *e == dotted) {
        return None;
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if absolute.to_str().is_none() {
        debug!("Skipping non-UTF-8 path {}", path.display());
        return None;
    }

    let fs_meta = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return None,
        Err(e) => {
            debug!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };
    if fs_meta.len() < config.min_size {
        return None;
    }

    let file_name = path.file_name()?.to_string_lossy().to_lowercase();
    if !config.indicators.iter().any(|i| file_name.contains(i.as_str())) {
        return None;
    }

    let fingerprint = match compute_fingerprint(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to fingerprint {}: {}", path.display(), e);
            return None;
        }
    };

    let modified_at: DateTime<Utc> = fs_meta
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());
    let created_at: DateTime<Utc> = fs_meta.created().map(DateTime::from).unwrap_or(modified_at);

    let mut metadata = BTreeMap::new();
    let format = detect_format(path, &extension, &mut metadata);
    let kind = detect_kind(path);
    metadata.insert("file_name".to_string(), json!(path.file_name()?.to_string_lossy()));
    if let Some(parent) = path.parent() {
        metadata.insert("directory".to_string(), json!(parent.to_string_lossy()));
    }

    let record = AssetRecord {
        name: path.file_stem()?.to_string_lossy().into_owned(),
        path: absolute,
        size_bytes: fs_meta.len(),
        format,
        kind,
        fingerprint,
        created_at,
        modified_at,
        metadata,
    };
    debug!(
        "Classified {} as {}/{} ({})",
        path.display(),
        record.format,
        record.kind,
        record.fingerprint
    );
    Some(record)
}

/// Suffix mapping plus the two path-based overrides.
fn detect_format(
    path: &Path,
    extension: &str,
    metadata: &mut BTreeMap<String, Value>,
) -> AssetFormat {
    let mut format = AssetFormat::from_extension(extension);

    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.iter().any(|s| s == INFERENCE_STORE_SEGMENT) {
        format = AssetFormat::VendorHosted;
        metadata.insert("hosted_by".to_string(), json!("ollama"));
        if let Some(stem) = path.file_stem() {
            metadata.insert("served_as".to_string(), json!(stem.to_string_lossy()));
        }
    }

    let hf_repo = segments
        .iter()
        .find_map(|s| s.strip_prefix(HF_REPO_PREFIX))
        .map(|repo| repo.replace("--", "/"));
    if hf_repo.is_some() || segments.iter().any(|s| s.to_lowercase() == HF_SEGMENT) {
        metadata.insert("source".to_string(), json!("huggingface"));
        if let Some(repo) = hf_repo {
            metadata.insert("repo_id".to_string(), json!(repo));
        }
        if let Some(parent) = path.parent() {
            merge_hf_config(&parent.join("config.json"), metadata);
        }
    }

    format
}

/// Copy architecture hints out of a HuggingFace `config.json`, if present.
fn merge_hf_config(config_path: &Path, metadata: &mut BTreeMap<String, Value>) {
    let Ok(contents) = std::fs::read_to_string(config_path) else {
        return;
    };
    match serde_json::from_str::<Value>(&contents) {
        Ok(config) => {
            metadata.insert(
                "architectures".to_string(),
                config.get("architectures").cloned().unwrap_or(json!([])),
            );
            metadata.insert(
                "model_type".to_string(),
                config.get("model_type").cloned().unwrap_or(json!("unknown")),
            );
            metadata.insert(
                "vocab_size".to_string(),
                config.get("vocab_size").cloned().unwrap_or(json!(0)),
            );
        }
        Err(e) => debug!("Unreadable {}: {}", config_path.display(), e),
    }
}

/// Keyword heuristics over the path, most specific category first.
///
/// Hidden components (`.cache`, `.tmpXXXX`) are tool-internal names and are
/// left out of the match.
pub fn detect_kind(path: &Path) -> AssetKind {
    let haystack = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => {
                let s = s.to_string_lossy().to_lowercase();
                (!s.starts_with('.')).then_some(s)
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let has_any = |terms: &[&str]| terms.iter().any(|t| haystack.contains(t));

    if has_any(VISION_TERMS) {
        AssetKind::VisionModel
    } else if has_any(AUDIO_TERMS) {
        AssetKind::AudioModel
    } else if has_any(EMBEDDING_TERMS) {
        AssetKind::EmbeddingModel
    } else if has_any(MULTIMODAL_TERMS) {
        AssetKind::MultimodalModel
    } else {
        AssetKind::LanguageModel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MIB: usize = 1024 * 1024;

    fn write_sized(dir: &Path, rel: &str, size: usize) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let content: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_llama_gguf_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sized(temp_dir.path(), "llama-7b-q4.gguf", 5 * MIB);

        let record = classify(&path, &ClassifierConfig::default()).expect("should classify");
        assert_eq!(record.name, "llama-7b-q4");
        assert_eq!(record.format, AssetFormat::QuantizedBinary);
        assert_eq!(record.kind, AssetKind::LanguageModel);
        assert_eq!(record.size_bytes, 5 * MIB as u64);
        assert_eq!(record.fingerprint.len(), 16);
        assert_eq!(record.metadata_str("file_name"), Some("llama-7b-q4.gguf"));
    }

    #[test]
    fn test_small_files_rejected_regardless_of_name() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["llama-model.gguf", "chat-model.safetensors", "model.onnx"] {
            let path = write_sized(temp_dir.path(), name, MIB - 1);
            assert!(classify(&path, &ClassifierConfig::default()).is_none(), "{}", name);
        }
    }

    #[test]
    fn test_unlisted_extension_rejected() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["llama-model.txt", "chat-model.zip", "model"] {
            let path = write_sized(temp_dir.path(), name, 2 * MIB);
            assert!(classify(&path, &ClassifierConfig::default()).is_none(), "{}", name);
        }
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sized(temp_dir.path(), "Mistral-Instruct.GGUF", 2 * MIB);
        let record = classify(&path, &ClassifierConfig::default()).unwrap();
        assert_eq!(record.format, AssetFormat::QuantizedBinary);
    }

    #[test]
    fn test_filename_without_indicator_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sized(temp_dir.path(), "holiday-photos.bin", 2 * MIB);
        assert!(classify(&path, &ClassifierConfig::default()).is_none());
    }

    #[test]
    fn test_format_suffix_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let cases = [
            ("model-a.safetensors", AssetFormat::TensorCheckpoint),
            ("model-b.pt", AssetFormat::TensorCheckpoint),
            ("model-c.pth", AssetFormat::TensorCheckpoint),
            ("model-d.bin", AssetFormat::TensorCheckpoint),
            ("model-e.onnx", AssetFormat::GenericBinary),
        ];
        for (name, expected) in cases {
            let path = write_sized(temp_dir.path(), name, MIB);
            let record = classify(&path, &ClassifierConfig::default()).unwrap();
            assert_eq!(record.format, expected, "{}", name);
        }
    }

    #[test]
    fn test_operator_extension_maps_to_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sized(temp_dir.path(), "frozen-model.pb", MIB);
        let config = ClassifierConfig::from(&TrawlConfig {
            file_extensions: vec!["pb".to_string()],
            ..TrawlConfig::default()
        });
        let record = classify(&path, &config).unwrap();
        assert_eq!(record.format, AssetFormat::Unknown);
    }

    #[test]
    fn test_inference_store_is_vendor_hosted() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sized(temp_dir.path(), ".ollama/models/llama3-chat.gguf", MIB);
        let record = classify(&path, &ClassifierConfig::default()).unwrap();
        assert_eq!(record.format, AssetFormat::VendorHosted);
        assert_eq!(record.metadata_str("hosted_by"), Some("ollama"));
        assert_eq!(record.metadata_str("served_as"), Some("llama3-chat"));
    }

    #[test]
    fn test_huggingface_cache_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = "hub/models--meta-llama--Llama-2-7b/snapshots/abc123";
        let path = write_sized(
            temp_dir.path(),
            &format!("{}/model-00001.safetensors", snapshot),
            MIB,
        );
        std::fs::write(
            temp_dir.path().join(snapshot).join("config.json"),
            r#"{"architectures": ["LlamaForCausalLM"], "model_type": "llama", "vocab_size": 32000}"#,
        )
        .unwrap();

        let record = classify(&path, &ClassifierConfig::default()).unwrap();
        assert_eq!(record.format, AssetFormat::TensorCheckpoint);
        assert_eq!(record.metadata_str("source"), Some("huggingface"));
        assert_eq!(record.metadata_str("repo_id"), Some("meta-llama/Llama-2-7b"));
        assert_eq!(record.metadata_str("model_type"), Some("llama"));
        assert_eq!(record.metadata["vocab_size"], json!(32000));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_rejected() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let name = std::ffi::OsStr::from_bytes(b"model-\xff.gguf");
        let path = temp_dir.path().join(name);
        std::fs::write(&path, vec![7u8; 2 * MIB]).unwrap();

        assert!(classify(&path, &ClassifierConfig::default()).is_none());
    }

    #[test]
    fn test_kind_detection_order() {
        assert_eq!(
            detect_kind(Path::new("/m/clip-vit-large.safetensors")),
            AssetKind::VisionModel
        );
        assert_eq!(
            detect_kind(Path::new("/m/whisper-small.bin")),
            AssetKind::AudioModel
        );
        assert_eq!(
            detect_kind(Path::new("/m/bge-small-en.onnx")),
            AssetKind::EmbeddingModel
        );
        assert_eq!(
            detect_kind(Path::new("/m/llava-1.5.gguf")),
            AssetKind::MultimodalModel
        );
        // vision is checked before multimodal
        assert_eq!(
            detect_kind(Path::new("/m/multimodal-vision.gguf")),
            AssetKind::VisionModel
        );
        assert_eq!(
            detect_kind(Path::new("/m/mistral-7b.gguf")),
            AssetKind::LanguageModel
        );
    }

    #[test]
    fn test_kind_uses_directory_names() {
        assert_eq!(
            detect_kind(Path::new("/data/speech/model.bin")),
            AssetKind::AudioModel
        );
        assert_eq!(
            detect_kind(Path::new("/data/.stt-cache/model.bin")),
            AssetKind::LanguageModel
        );
    }

    #[test]
    fn test_directory_is_not_classified() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("model.gguf");
        std::fs::create_dir_all(&dir).unwrap();
        assert!(classify(&dir, &ClassifierConfig::default()).is_none());
    }
}
