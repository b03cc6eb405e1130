//! In-process mock of the inference service for unit tests.
//!
//! Model names steer the response: names containing `broken` get a 500,
//! `garbled` gets a 200 with a non-JSON body, anything else is echoed back as
//! `"{model} answers: {prompt}"` after the configured delay.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct MockState {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

pub(crate) struct MockInference {
    /// Base URL to hand to `InferenceClient::new`
    pub base_url: String,
    state: MockState,
}

impl MockInference {
    pub(crate) async fn spawn(delay: Duration) -> Self {
        let state = MockState {
            delay,
            ..MockState::default()
        };
        let app = Router::new()
            .route("/api/generate", post(generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api", addr),
            state,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed in flight at once.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

async fn generate(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let model = body["model"].as_str().unwrap_or_default().to_string();
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();

    if body["stream"] != json!(false) {
        return (StatusCode::BAD_REQUEST, "stream must be false").into_response();
    }
    if model.contains("broken") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    if model.contains("garbled") {
        return (StatusCode::OK, "not json").into_response();
    }

    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    Json(json!({ "response": format!("{} answers: {}", model, prompt) })).into_response()
}
