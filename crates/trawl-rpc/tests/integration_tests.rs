//! Integration tests for the trawl-rpc JSON-RPC server.
//!
//! Each test spawns the real binary over a temporary data directory with the
//! discovery loop disabled, then drives it through `/rpc`.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

const MIB: usize = 1024 * 1024;

/// Write a GGUF v3 file of `size` bytes, ending in its own name.
fn write_gguf(dir: &Path, name: &str, size: usize) {
    let mut bytes = b"GGUF".to_vec();
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&291u64.to_le_bytes());
    bytes.extend_from_slice(&24u64.to_le_bytes());
    bytes.resize(size, 0);
    let tail = size - name.len();
    bytes[tail..].copy_from_slice(name.as_bytes());
    std::fs::write(dir.join(name), bytes).unwrap();
}

/// Make an RPC call to the server.
async fn rpc_call(port: u16, method: &str, params: Value) -> Result<Value, String> {
    let json = rpc_call_raw(port, method, params).await?;
    if let Some(error) = json.get("error") {
        return Err(error.to_string());
    }
    Ok(json.get("result").cloned().unwrap_or(Value::Null))
}

/// Make an RPC call and return the full JSON-RPC payload.
async fn rpc_call_raw(port: u16, method: &str, params: Value) -> Result<Value, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{}/rpc", port))
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    response.json::<Value>().await.map_err(|e| e.to_string())
}

/// Check health endpoint.
async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("ok");
        }
    }
    false
}

/// Wait for server to be ready.
async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

struct RpcServerHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

fn rpc_binary() -> Result<PathBuf, String> {
    if let Some(path) = option_env!("CARGO_BIN_EXE_trawl-rpc") {
        return Ok(PathBuf::from(path));
    }
    let current_exe = std::env::current_exe()
        .map_err(|e| format!("failed to resolve current_exe for fallback: {e}"))?;
    let target_debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .ok_or_else(|| "failed to resolve target/debug directory for fallback".to_string())?;

    let mut fallback = target_debug_dir.join("trawl-rpc");
    if cfg!(target_os = "windows") {
        fallback.set_extension("exe");
    }
    if !fallback.exists() {
        return Err(format!(
            "CARGO_BIN_EXE_trawl-rpc not set and fallback binary not found at {}",
            fallback.display()
        ));
    }
    Ok(fallback)
}

/// Start the RPC binary and wait until `/health` is ready.
async fn start_rpc_server(data_dir: &Path) -> Result<RpcServerHandle, String> {
    let binary = rpc_binary()?;

    let mut child = tokio::process::Command::new(&binary)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--no-discovery")
        .arg("--no-default-roots")
        .arg("--no-volumes")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn trawl-rpc: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("RPC_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid RPC_PORT value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read trawl-rpc stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port =
        discovered_port.ok_or_else(|| "RPC_PORT line not emitted by trawl-rpc".to_string())?;
    if !wait_for_server(port, 15).await {
        return Err(format!("trawl-rpc failed health check on port {port}"));
    }

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(RpcServerHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

/// Poll a task until it leaves the queue.
async fn wait_for_task(port: u16, task_id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let response = rpc_call(port, "get_task_status", json!({"taskId": task_id}))
            .await
            .unwrap();
        let status = response["task"]["status"].as_str().unwrap_or_default().to_string();
        if status == "completed" || status == "failed" {
            return response["task"].clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} stuck in {status}"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_health_and_unknown_method() {
    let data = TempDir::new().unwrap();
    let server = start_rpc_server(data.path()).await.unwrap();

    let health = rpc_call(server.port, "health_check", json!({})).await.unwrap();
    assert_eq!(health["status"], "ok");

    let raw = rpc_call_raw(server.port, "does_not_exist", json!({}))
        .await
        .unwrap();
    assert_eq!(raw["error"]["code"], -32601);
    assert_eq!(raw["id"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_data_dir_is_created() {
    let parent = TempDir::new().unwrap();
    let data_dir = parent.path().join("fresh");
    let server = start_rpc_server(&data_dir).await.unwrap();

    assert!(data_dir.join("cache").is_dir());
    assert!(data_dir.join("learning").is_dir());

    server.stop().await;
}

#[tokio::test]
async fn test_scan_and_analyze_over_rpc() {
    let data = TempDir::new().unwrap();
    let models = TempDir::new().unwrap();
    write_gguf(models.path(), "llama-7b-q4.gguf", 5 * MIB);
    write_gguf(models.path(), "mistral-7b-q8.gguf", 7 * MIB);

    let server = start_rpc_server(data.path()).await.unwrap();
    let port = server.port;

    let added = rpc_call(
        port,
        "add_scan_path",
        json!({"path": models.path().to_str().unwrap()}),
    )
    .await
    .unwrap();
    assert_eq!(added["added"], true);

    let scan = rpc_call(port, "scan_now", json!({})).await.unwrap();
    assert_eq!(scan["report"]["newAssets"], 2);

    let assets = rpc_call(port, "get_assets_by_kind", json!({"kind": "llm"}))
        .await
        .unwrap();
    let assets = assets["assets"].as_array().unwrap();
    assert_eq!(assets.len(), 2);
    assert_eq!(assets[0]["name"], "mistral-7b-q8");
    assert_eq!(assets[1]["format"], "gguf");
    let asset_id = assets[1]["fingerprint"].as_str().unwrap().to_string();

    let best = rpc_call(port, "get_best_language_models", json!({"limit": 1}))
        .await
        .unwrap();
    let best = best["models"].as_array().unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0]["name"], "mistral-7b-q8");

    let stats = rpc_call(port, "get_discovery_stats", json!({})).await.unwrap();
    assert_eq!(stats["stats"]["totalAssets"], 2);

    let created = rpc_call(
        port,
        "create_learning_task",
        json!({"assetId": asset_id, "method": "parameter_analysis"}),
    )
    .await
    .unwrap();
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let task = wait_for_task(port, &task_id).await;
    assert_eq!(task["status"], "completed");
    assert_eq!(task["result"]["estimated_parameters"], 2_621_440);

    let listed = rpc_call(port, "list_tasks", json!({})).await.unwrap();
    assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);

    rpc_call(port, "save_learning_results", json!({})).await.unwrap();
    assert!(data.path().join("learning/learning_tasks.json").exists());

    server.stop().await;
}

#[tokio::test]
async fn test_error_codes() {
    let data = TempDir::new().unwrap();
    let server = start_rpc_server(data.path()).await.unwrap();
    let port = server.port;

    let missing_task = rpc_call_raw(port, "get_task_status", json!({"task_id": "nope"}))
        .await
        .unwrap();
    assert_eq!(missing_task["error"]["code"], -32001);

    let missing_asset = rpc_call_raw(
        port,
        "create_learning_task",
        json!({"asset_id": "nope", "method": "knowledge_extraction"}),
    )
    .await
    .unwrap();
    assert_eq!(missing_asset["error"]["code"], -32002);

    let missing_param = rpc_call_raw(port, "add_scan_path", json!({})).await.unwrap();
    assert_eq!(missing_param["error"]["code"], -32602);

    let not_a_dir = rpc_call_raw(
        port,
        "add_scan_path",
        json!({"path": data.path().join("missing").to_str().unwrap()}),
    )
    .await
    .unwrap();
    assert_eq!(not_a_dir["error"]["code"], -32005);

    server.stop().await;
}
