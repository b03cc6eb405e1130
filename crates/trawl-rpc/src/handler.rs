//! JSON-RPC request handlers.

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use trawl_core::{AssetKind, LearningMethod, TrawlApi, TrawlError};

/// JSON-RPC 2.0 "method not found".
const METHOD_NOT_FOUND: i32 = -32601;

/// Default number of entries returned by `get_best_language_models`.
const DEFAULT_BEST_LIMIT: usize = 5;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// Failure of a dispatched call, already carrying its JSON-RPC code.
#[derive(Debug)]
struct DispatchError {
    code: i32,
    message: String,
}

impl From<TrawlError> for DispatchError {
    fn from(e: TrawlError) -> Self {
        Self {
            code: e.to_rpc_error_code(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        TrawlError::from(e).into()
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    let response = match dispatch_method(&state.api, method, &params).await {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!("RPC error for {}: {}", method, e.message);
            JsonRpcResponse::error(id, e.code, e.message)
        }
    };
    (StatusCode::OK, Json(response))
}

// ============================================================================
// Helper macros for extracting parameters
// ============================================================================

/// Extract a string parameter, supporting both snake_case and camelCase.
macro_rules! get_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_str())
    };
}

/// Extract a required string parameter or return an error.
macro_rules! require_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        match get_str_param!($params, $snake, $camel) {
            Some(s) => s.to_string(),
            None => {
                return Err(TrawlError::InvalidParams {
                    message: format!("Missing required parameter: {}", $snake),
                }
                .into());
            }
        }
    };
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate API handler.
async fn dispatch_method(
    api: &TrawlApi,
    method: &str,
    params: &Value,
) -> Result<Value, DispatchError> {
    match method {
        "health_check" => Ok(json!({"status": "ok"})),

        // ====================================================================
        // Scan paths
        // ====================================================================
        "add_scan_path" => {
            let path = require_str_param!(params, "path", "path");
            let added = api.add_scan_path(&path)?;
            Ok(json!({"success": true, "added": added}))
        }

        "remove_scan_path" => {
            let path = require_str_param!(params, "path", "path");
            api.remove_scan_path(&path)?;
            Ok(json!({"success": true}))
        }

        "get_scan_paths" => {
            let roots = api.scan_roots().await;
            Ok(json!({
                "success": true,
                "scan_paths": api.scan_paths(),
                "roots": roots,
            }))
        }

        // ====================================================================
        // Discovery
        // ====================================================================
        "get_discovered_assets" => Ok(json!({
            "success": true,
            "assets": api.discovered_assets(),
        })),

        "get_assets_by_kind" => {
            let kind: AssetKind = require_str_param!(params, "kind", "kind").parse()?;
            Ok(json!({
                "success": true,
                "assets": api.assets_by_kind(kind),
            }))
        }

        "get_best_language_models" => {
            let limit = params
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_BEST_LIMIT);
            Ok(json!({
                "success": true,
                "models": api.best_language_models(limit),
            }))
        }

        "get_asset" => {
            let asset_id = require_str_param!(params, "asset_id", "assetId");
            let asset = api.asset(&asset_id)?;
            Ok(json!({"success": true, "asset": asset}))
        }

        "remove_asset" => {
            let asset_id = require_str_param!(params, "asset_id", "assetId");
            let removed = api.remove_asset(&asset_id)?;
            Ok(json!({"success": true, "asset": removed}))
        }

        "get_discovery_stats" => {
            let stats = api.discovery_stats().await;
            Ok(json!({"success": true, "stats": stats}))
        }

        "scan_now" => {
            let report = api.scan_now().await;
            Ok(json!({"success": !report.cancelled, "report": report}))
        }

        "start_discovery" => {
            let started = api.start_discovery().await;
            Ok(json!({"success": true, "started": started}))
        }

        "stop_discovery" => {
            api.stop_discovery().await;
            Ok(json!({"success": true}))
        }

        "clear_discovery_cache" => {
            api.clear_discovery_cache()?;
            Ok(json!({"success": true}))
        }

        // ====================================================================
        // Learning
        // ====================================================================
        "create_learning_task" => {
            let asset_id = require_str_param!(params, "asset_id", "assetId");
            let method: LearningMethod = require_str_param!(params, "method", "method").parse()?;
            let task_id = api.create_learning_task(&asset_id, method)?;
            Ok(json!({"success": true, "task_id": task_id}))
        }

        "learn_from_discovered" => {
            let task_ids = api.learn_from_discovered();
            Ok(json!({"success": true, "task_ids": task_ids}))
        }

        "get_task_status" => {
            let task_id = require_str_param!(params, "task_id", "taskId");
            let task = api.task_status(&task_id)?;
            Ok(json!({"success": true, "task": task}))
        }

        "list_tasks" => Ok(json!({"success": true, "tasks": api.list_tasks()})),

        "get_knowledge_items" => {
            let asset_id = require_str_param!(params, "asset_id", "assetId");
            Ok(json!({
                "success": true,
                "items": api.knowledge_items(&asset_id),
            }))
        }

        "get_learning_stats" => {
            let stats = serde_json::to_value(api.learning_stats())?;
            Ok(json!({"success": true, "stats": stats}))
        }

        "save_learning_results" => {
            api.save_learning_results()?;
            Ok(json!({"success": true}))
        }

        "start_learning" => {
            let started = api.start_learning();
            Ok(json!({"success": true, "started": started}))
        }

        "stop_learning" => {
            api.stop_learning().await;
            Ok(json!({"success": true}))
        }

        _ => {
            warn!("Method not found: {}", method);
            Err(DispatchError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", method),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_api(dir: &TempDir) -> TrawlApi {
        TrawlApi::builder(dir.path())
            .scan_default_roots(false)
            .scan_volumes(false)
            .inference_base_url("http://127.0.0.1:9/api")
            .build()
            .await
            .unwrap()
    }

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"data": "test"}));
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(json!(1)), -32600, "Test error".into());
        assert!(response.error.is_some());
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[test]
    fn test_trawl_error_keeps_rpc_code() {
        let err: DispatchError = TrawlError::TaskNotFound {
            task_id: "t1".into(),
        }
        .into();
        assert_eq!(err.code, -32001);
        assert!(err.message.contains("t1"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let err = dispatch_method(&api, "launch_rockets", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_param() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let err = dispatch_method(&api, "get_task_status", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32602);
        assert!(err.message.contains("task_id"));
    }

    #[tokio::test]
    async fn test_camel_case_params() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let err = dispatch_method(&api, "get_task_status", &json!({"taskId": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32001);
    }

    #[tokio::test]
    async fn test_unknown_learning_method() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let err = dispatch_method(
            &api,
            "create_learning_task",
            &json!({"asset_id": "abc", "method": "telepathy"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, -32005);
    }

    #[tokio::test]
    async fn test_scan_path_round_trip() {
        let dir = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        let api = test_api(&dir).await;
        let path = models.path().to_str().unwrap();

        let added = dispatch_method(&api, "add_scan_path", &json!({"path": path}))
            .await
            .unwrap();
        assert_eq!(added["added"], true);

        let listed = dispatch_method(&api, "get_scan_paths", &json!({}))
            .await
            .unwrap();
        assert_eq!(listed["scan_paths"].as_array().unwrap().len(), 1);

        dispatch_method(&api, "remove_scan_path", &json!({"path": path}))
            .await
            .unwrap();
        let err = dispatch_method(&api, "remove_scan_path", &json!({"path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32002);
    }

    #[tokio::test]
    async fn test_stats_on_empty_library() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let stats = dispatch_method(&api, "get_discovery_stats", &json!({}))
            .await
            .unwrap();
        assert_eq!(stats["stats"]["totalAssets"], 0);

        let learning = dispatch_method(&api, "get_learning_stats", &json!({}))
            .await
            .unwrap();
        assert_eq!(learning["stats"]["totalTasks"], 0);
        assert_eq!(learning["stats"]["isLearning"], false);
    }

    #[tokio::test]
    async fn test_assets_by_kind_methods() {
        let dir = TempDir::new().unwrap();
        let api = test_api(&dir).await;

        let err = dispatch_method(&api, "get_assets_by_kind", &json!({"kind": "spaceship"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32005);

        let empty = dispatch_method(&api, "get_assets_by_kind", &json!({"kind": "llm"}))
            .await
            .unwrap();
        assert_eq!(empty["assets"], json!([]));

        let best = dispatch_method(&api, "get_best_language_models", &json!({"limit": 3}))
            .await
            .unwrap();
        assert_eq!(best["models"], json!([]));
    }
}
