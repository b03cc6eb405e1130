//! HTTP client for the local inference service.
//!
//! Only one endpoint is used:
//!
//! ```text
//! POST {base_url}/generate  {"model": "...", "prompt": "...", "stream": false}
//!   -> {"response": "..."}
//! ```

use crate::config::NetworkConfig;
use crate::error::{Result, TrawlError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

fn net_err(message: String) -> TrawlError {
    TrawlError::Network {
        message,
        cause: None,
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client shared by every model interface.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    client: reqwest::Client,
}

impl InferenceClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:11434/api`).
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| net_err(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a non-streaming completion and return the response text.
    ///
    /// Fails on connection errors, non-2xx statuses, an unparsable body, or
    /// when `timeout` elapses.
    pub async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/generate", self.base_url);
        debug!("Querying {} via {}", model, url);

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TrawlError::Timeout(timeout)
                } else {
                    net_err(format!("Failed to reach inference service at {}: {}", url, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(net_err(format!(
                "Inference service returned {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                TrawlError::Timeout(timeout)
            } else {
                net_err(format!("Failed to parse generate response: {}", e))
            }
        })?;
        Ok(body.response)
    }
}
