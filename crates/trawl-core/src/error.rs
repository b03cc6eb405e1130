//! Error types for Trawl.
//!
//! Nothing in discovery or learning is allowed to take the process down; these
//! errors end up in logs, in a failed task's `error_message`, or in a JSON-RPC
//! error payload.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Trawl library.
#[derive(Debug, Error)]
pub enum TrawlError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Discovery errors
    #[error("Asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    #[error("Scan path not configured: {0}")]
    ScanPathNotFound(PathBuf),

    // Learning errors
    #[error("Learning task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("No model interface for format '{format}'")]
    NoInterface { format: String },

    #[error("Failed to load model {model}: {message}")]
    InterfaceLoad { model: String, message: String },

    #[error("Query to {model} failed: {message}")]
    QueryFailed { model: String, message: String },

    #[error("Unknown learning method: {0}")]
    UnknownMethod(String),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Trawl operations.
pub type Result<T> = std::result::Result<T, TrawlError>;

impl From<std::io::Error> for TrawlError {
    fn from(err: std::io::Error) -> Self {
        TrawlError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TrawlError {
    fn from(err: serde_json::Error) -> Self {
        TrawlError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for TrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrawlError::Timeout(std::time::Duration::from_secs(0))
        } else {
            TrawlError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl TrawlError {
    /// Create an IO error with path context.
    ///
    /// `NotFound` and `PermissionDenied` map onto their dedicated variants so
    /// the scanner can tell "vanished mid-scan" apart from other failures.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => TrawlError::FileNotFound(path),
            std::io::ErrorKind::PermissionDenied => TrawlError::PermissionDenied(path),
            _ => TrawlError::Io {
                message: err.to_string(),
                path: Some(path),
                source: Some(err),
            },
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Task not found
    /// - -32002: Asset not found
    /// - -32003: Model interface or query failure
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            TrawlError::Network { .. } | TrawlError::Timeout(_) => -32000,

            TrawlError::TaskNotFound { .. } => -32001,

            TrawlError::AssetNotFound { .. } | TrawlError::ScanPathNotFound(_) => -32002,

            TrawlError::NoInterface { .. }
            | TrawlError::InterfaceLoad { .. }
            | TrawlError::QueryFailed { .. } => -32003,

            TrawlError::Validation { .. } | TrawlError::UnknownMethod(_) => -32005,

            TrawlError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }
}
