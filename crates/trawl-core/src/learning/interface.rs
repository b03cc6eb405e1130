//! Model interfaces.
//!
//! One `load()` / `query(prompt)` contract over the on-disk formats. Loading
//! validates the local artifact (where there is one) and resolves the name
//! the inference service serves it under; queries always go through the
//! shared [`InferenceClient`].

use crate::discovery::types::{AssetFormat, AssetRecord};
use crate::error::{Result, TrawlError};
use crate::learning::inference::InferenceClient;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Magic bytes for header sniffing.
mod magic {
    pub const GGUF: &[u8; 4] = b"GGUF";
    /// ZIP header (PyTorch `.pt` archives)
    pub const ZIP: &[u8; 4] = &[0x50, 0x4B, 0x03, 0x04];
    pub const PICKLE_PROTO: u8 = 0x80;
    pub const PICKLE_PROTO_MIN: u8 = 2;
    pub const PICKLE_PROTO_MAX: u8 = 5;
    /// Upper bound on a safetensors JSON header we are willing to read.
    pub const SAFETENSORS_MAX_HEADER: u64 = 100_000_000;
}

/// A loaded model, ready to be queried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelHandle {
    /// Name the inference service knows the model by
    pub served_name: String,
    pub format: AssetFormat,
    /// Facts learned while loading (header version, tensor count, ...)
    pub details: BTreeMap<String, Value>,
}

/// Uniform access to a model regardless of its storage format.
#[async_trait]
pub trait ModelInterface: Send + Sync {
    fn format(&self) -> AssetFormat;

    /// Validate the artifact and prepare a handle.
    async fn load(&self) -> Result<ModelHandle>;

    /// Send one prompt and return the generated text.
    async fn query(&self, handle: &ModelHandle, prompt: &str, timeout: Duration) -> Result<String>;
}

/// Build the interface for an asset's format.
///
/// Formats with no query path (`onnx`, `unknown`) yield
/// [`TrawlError::NoInterface`].
pub fn build_interface(
    asset: &AssetRecord,
    client: &InferenceClient,
) -> Result<Box<dyn ModelInterface>> {
    let served_name = served_name(asset);
    match asset.format {
        AssetFormat::QuantizedBinary => Ok(Box::new(GgufInterface {
            path: asset.path.clone(),
            served_name,
            client: client.clone(),
        })),
        AssetFormat::TensorCheckpoint => Ok(Box::new(CheckpointInterface {
            path: asset.path.clone(),
            served_name,
            client: client.clone(),
        })),
        AssetFormat::VendorHosted => Ok(Box::new(HostedInterface {
            served_name,
            client: client.clone(),
        })),
        AssetFormat::GenericBinary | AssetFormat::Unknown => Err(TrawlError::NoInterface {
            format: asset.format.as_str().to_string(),
        }),
    }
}

/// The inference-server tag if discovery recorded one, else the file stem.
fn served_name(asset: &AssetRecord) -> String {
    asset
        .metadata_str("served_as")
        .unwrap_or(&asset.name)
        .to_string()
}

async fn query_service(
    client: &InferenceClient,
    handle: &ModelHandle,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    client
        .generate(&handle.served_name, prompt, timeout)
        .await
        .map_err(|e| match e {
            TrawlError::Timeout(_) => e,
            other => TrawlError::QueryFailed {
                model: handle.served_name.clone(),
                message: other.to_string(),
            },
        })
}

/// Read up to `len` leading bytes of a file on the blocking pool.
async fn read_header(path: &Path, len: usize) -> Result<Vec<u8>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| TrawlError::io_with_path(e, &path))?;
        let mut buffer = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buffer)
            .map_err(|e| TrawlError::io_with_path(e, &path))?;
        Ok(buffer)
    })
    .await
    .map_err(|e| TrawlError::Other(format!("Header read task failed: {}", e)))?
}

fn load_err(model: &str, message: impl Into<String>) -> TrawlError {
    TrawlError::InterfaceLoad {
        model: model.to_string(),
        message: message.into(),
    }
}

/// Quantized llama.cpp weights.
pub struct GgufInterface {
    path: PathBuf,
    served_name: String,
    client: InferenceClient,
}

/// Parsed fixed-size GGUF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufHeader {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Parse the GGUF header.
///
/// Layout: magic `GGUF` (4), version u32 LE, then tensor and metadata counts.
/// Version 1 stores the counts as u32; later versions use u64.
pub fn parse_gguf_header(header: &[u8]) -> Option<GgufHeader> {
    if header.len() < 16 || &header[..4] != magic::GGUF {
        return None;
    }
    let version = u32::from_le_bytes(header[4..8].try_into().ok()?);
    match version {
        1 => Some(GgufHeader {
            version,
            tensor_count: u32::from_le_bytes(header[8..12].try_into().ok()?) as u64,
            metadata_kv_count: u32::from_le_bytes(header[12..16].try_into().ok()?) as u64,
        }),
        v if v >= 2 && header.len() >= 24 => Some(GgufHeader {
            version,
            tensor_count: u64::from_le_bytes(header[8..16].try_into().ok()?),
            metadata_kv_count: u64::from_le_bytes(header[16..24].try_into().ok()?),
        }),
        _ => None,
    }
}

#[async_trait]
impl ModelInterface for GgufInterface {
    fn format(&self) -> AssetFormat {
        AssetFormat::QuantizedBinary
    }

    async fn load(&self) -> Result<ModelHandle> {
        let header = read_header(&self.path, 24).await?;
        let parsed = parse_gguf_header(&header)
            .ok_or_else(|| load_err(&self.served_name, "not a valid GGUF file"))?;
        debug!(
            "GGUF v{} with {} tensors at {}",
            parsed.version,
            parsed.tensor_count,
            self.path.display()
        );

        let mut details = BTreeMap::new();
        details.insert("gguf_version".to_string(), json!(parsed.version));
        details.insert("tensor_count".to_string(), json!(parsed.tensor_count));
        details.insert(
            "metadata_kv_count".to_string(),
            json!(parsed.metadata_kv_count),
        );
        Ok(ModelHandle {
            served_name: self.served_name.clone(),
            format: self.format(),
            details,
        })
    }

    async fn query(&self, handle: &ModelHandle, prompt: &str, timeout: Duration) -> Result<String> {
        query_service(&self.client, handle, prompt, timeout).await
    }
}

/// Container detected inside a tensor checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointContainer {
    Safetensors { header_len: u64 },
    Zip,
    Pickle,
}

impl CheckpointContainer {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointContainer::Safetensors { .. } => "safetensors",
            CheckpointContainer::Zip => "zip",
            CheckpointContainer::Pickle => "pickle",
        }
    }
}

/// Identify the container from the first bytes of a checkpoint.
pub fn sniff_checkpoint(header: &[u8]) -> Option<CheckpointContainer> {
    if header.len() >= 4 && &header[..4] == magic::ZIP {
        return Some(CheckpointContainer::Zip);
    }
    if header.len() >= 2
        && header[0] == magic::PICKLE_PROTO
        && (magic::PICKLE_PROTO_MIN..=magic::PICKLE_PROTO_MAX).contains(&header[1])
    {
        return Some(CheckpointContainer::Pickle);
    }
    if header.len() >= 9 {
        let header_len = u64::from_le_bytes(header[..8].try_into().ok()?);
        if header_len > 0 && header_len < magic::SAFETENSORS_MAX_HEADER && header[8] == b'{' {
            return Some(CheckpointContainer::Safetensors { header_len });
        }
    }
    None
}

/// Safetensors, PyTorch zip archives and raw pickles.
pub struct CheckpointInterface {
    path: PathBuf,
    served_name: String,
    client: InferenceClient,
}

#[async_trait]
impl ModelInterface for CheckpointInterface {
    fn format(&self) -> AssetFormat {
        AssetFormat::TensorCheckpoint
    }

    async fn load(&self) -> Result<ModelHandle> {
        let header = read_header(&self.path, 16).await?;
        let container = sniff_checkpoint(&header)
            .ok_or_else(|| load_err(&self.served_name, "unrecognized checkpoint container"))?;

        let mut details = BTreeMap::new();
        details.insert("container".to_string(), json!(container.as_str()));
        if let CheckpointContainer::Safetensors { header_len } = container {
            details.insert("header_bytes".to_string(), json!(header_len));
            // header_len was bounded by the sniff
            let full = read_header(&self.path, 8 + header_len as usize).await?;
            if let Ok(Value::Object(tensors)) = serde_json::from_slice::<Value>(&full[8..]) {
                let count = tensors.keys().filter(|k| *k != "__metadata__").count();
                details.insert("tensor_count".to_string(), json!(count));
            }
        }

        Ok(ModelHandle {
            served_name: self.served_name.clone(),
            format: self.format(),
            details,
        })
    }

    async fn query(&self, handle: &ModelHandle, prompt: &str, timeout: Duration) -> Result<String> {
        query_service(&self.client, handle, prompt, timeout).await
    }
}

/// Models that live inside the inference server's own store.
pub struct HostedInterface {
    served_name: String,
    client: InferenceClient,
}

#[async_trait]
impl ModelInterface for HostedInterface {
    fn format(&self) -> AssetFormat {
        AssetFormat::VendorHosted
    }

    async fn load(&self) -> Result<ModelHandle> {
        if self.served_name.trim().is_empty() {
            return Err(load_err(&self.served_name, "hosted model has no tag"));
        }
        Ok(ModelHandle {
            served_name: self.served_name.clone(),
            format: self.format(),
            details: BTreeMap::new(),
        })
    }

    async fn query(&self, handle: &ModelHandle, prompt: &str, timeout: Duration) -> Result<String> {
        query_service(&self.client, handle, prompt, timeout).await
    }
}
