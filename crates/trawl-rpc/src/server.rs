//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use trawl_core::TrawlApi;

/// Application state shared across handlers.
pub struct AppState {
    pub api: TrawlApi,
}

/// Build the router without binding it.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the bound address (useful when port=0) and the shared state so
/// the caller can shut the API down.
pub async fn start_server(
    api: TrawlApi,
    host: &str,
    port: u16,
) -> anyhow::Result<(SocketAddr, Arc<AppState>)> {
    let state = Arc::new(AppState { api });
    let app = router(state.clone());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_starts() {
        let temp_dir = TempDir::new().unwrap();
        let api = TrawlApi::builder(temp_dir.path())
            .scan_default_roots(false)
            .scan_volumes(false)
            .build()
            .await
            .unwrap();

        let (addr, state) = start_server(api, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
        assert!(!state.api.is_learning());
    }

    #[tokio::test]
    async fn test_invalid_host_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let api = TrawlApi::builder(temp_dir.path())
            .scan_default_roots(false)
            .scan_volumes(false)
            .build()
            .await
            .unwrap();

        assert!(start_server(api, "not a host", 0).await.is_err());
    }
}
