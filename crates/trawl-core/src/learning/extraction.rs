//! Extraction methods run by learning tasks.
//!
//! The two query-based methods send a fixed prompt set through a loaded
//! [`ModelInterface`]. A failed prompt is logged and skipped; the method only
//! fails when every prompt failed. Parameter analysis never touches the model.

use crate::discovery::types::{AssetFormat, AssetRecord};
use crate::error::{Result, TrawlError};
use crate::learning::interface::{ModelHandle, ModelInterface};
use crate::learning::types::{KnowledgeContent, KnowledgeItem};
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Open questions used to pull knowledge out of a model.
pub const KNOWLEDGE_PROMPTS: &[&str] = &[
    "What are the key concepts you understand?",
    "What domains of knowledge do you have expertise in?",
    "What are your capabilities and limitations?",
    "What programming languages and technologies do you know?",
    "What are important facts about science and technology?",
];

/// Typed prompts for behavior modeling: (input, expected response type).
pub const BEHAVIOR_PROMPTS: &[(&str, &str)] = &[
    ("Hello", "greeting"),
    ("What is 2+2?", "math"),
    ("Write a short story", "creative"),
    ("Explain quantum physics", "scientific"),
    ("def fibonacci(n):", "code"),
];

/// Word count at which a response earns full confidence.
const CONFIDENT_WORD_COUNT: usize = 200;

/// `<n>b` parameter-count token, e.g. `7b`, `13b`, `1.5b`.
static PARAM_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)b(?:$|[^a-z0-9])").unwrap());

/// Progress sink, called with values in `0.0..=1.0`.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Everything a method needs besides the interface.
pub struct ExtractionContext<'a> {
    pub asset: &'a AssetRecord,
    pub task_id: &'a str,
    pub query_timeout: Duration,
    pub progress: ProgressFn<'a>,
}

/// Output of a method: the task result plus any knowledge to store.
#[derive(Debug, Default)]
pub struct ExtractionOutput {
    pub result: Value,
    pub knowledge: Vec<KnowledgeItem>,
}

/// Heuristic confidence of a prompt response.
///
/// Empty answers score 0. Anything else starts at 0.5 and grows linearly
/// with word count, reaching 1.0 at 200 words.
pub fn confidence(response: &str) -> f32 {
    let words = response.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let substance = words.min(CONFIDENT_WORD_COUNT) as f32 / CONFIDENT_WORD_COUNT as f32;
    0.5 + 0.5 * substance
}

/// Run the knowledge prompts and turn every answer into a [`KnowledgeItem`].
pub async fn knowledge_extraction(
    interface: &dyn ModelInterface,
    handle: &ModelHandle,
    ctx: &ExtractionContext<'_>,
) -> Result<ExtractionOutput> {
    info!("Extracting knowledge from {}", ctx.asset.name);

    let mut knowledge = Vec::new();
    let mut last_error = None;

    for (i, prompt) in KNOWLEDGE_PROMPTS.iter().enumerate() {
        match interface.query(handle, prompt, ctx.query_timeout).await {
            Ok(response) if !is_blank(&response) => {
                let mut metadata = BTreeMap::new();
                metadata.insert("model_name".to_string(), json!(ctx.asset.name));
                metadata.insert(
                    "model_path".to_string(),
                    json!(ctx.asset.path.to_string_lossy()),
                );
                metadata.insert("task_id".to_string(), json!(ctx.task_id));

                knowledge.push(KnowledgeItem {
                    model_id: ctx.asset.fingerprint.clone(),
                    knowledge_type: format!("knowledge_{}", i),
                    confidence: confidence(&response),
                    content: KnowledgeContent {
                        query: prompt.to_string(),
                        response,
                    },
                    extracted_at: Utc::now(),
                    metadata,
                });
            }
            Ok(_) => warn!("Empty response to knowledge prompt '{}'", prompt),
            Err(e) => {
                warn!("Failed to extract knowledge with query '{}': {}", prompt, e);
                last_error = Some(e);
            }
        }
        (ctx.progress)((i + 1) as f32 / KNOWLEDGE_PROMPTS.len() as f32);
    }

    if knowledge.is_empty() {
        return Err(all_prompts_failed(&ctx.asset.name, last_error));
    }

    let result = json!({
        "extracted_items": knowledge.len(),
        "knowledge_areas": knowledge.iter().map(|k| k.knowledge_type.clone()).collect::<Vec<_>>(),
        "total_chars": knowledge.iter().map(|k| k.content.response.chars().count()).sum::<usize>(),
    });
    Ok(ExtractionOutput { result, knowledge })
}

/// Send the typed prompts and record length and latency of each answer.
pub async fn behavior_modeling(
    interface: &dyn ModelInterface,
    handle: &ModelHandle,
    ctx: &ExtractionContext<'_>,
) -> Result<ExtractionOutput> {
    info!("Modeling behavior of {}", ctx.asset.name);

    let mut patterns = Map::new();
    let mut total_length = 0usize;
    let mut total_latency_ms = 0u64;
    let mut last_error = None;

    for (i, (input, expected_type)) in BEHAVIOR_PROMPTS.iter().enumerate() {
        let start = Instant::now();
        match interface.query(handle, input, ctx.query_timeout).await {
            Ok(response) if !is_blank(&response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let length = response.chars().count();
                total_length += length;
                total_latency_ms += latency_ms;
                patterns.insert(
                    format!("pattern_{}", i),
                    json!({
                        "input": input,
                        "output": response,
                        "expected_type": expected_type,
                        "response_length": length,
                        "latency_ms": latency_ms,
                    }),
                );
            }
            Ok(_) => warn!("Empty response to behavior prompt '{}'", input),
            Err(e) => {
                warn!("Failed behavior test '{}': {}", input, e);
                last_error = Some(e);
            }
        }
        (ctx.progress)((i + 1) as f32 / BEHAVIOR_PROMPTS.len() as f32);
    }

    if patterns.is_empty() {
        return Err(all_prompts_failed(&ctx.asset.name, last_error));
    }

    let count = patterns.len();
    let result = json!({
        "behavior_patterns": count,
        "avg_response_length": total_length as f64 / count as f64,
        "avg_latency_ms": total_latency_ms as f64 / count as f64,
        "test_results": Value::Object(patterns),
    });
    Ok(ExtractionOutput {
        result,
        knowledge: Vec::new(),
    })
}

/// Whitespace-only answers count as no answer.
fn is_blank(response: &str) -> bool {
    response.trim().is_empty()
}

/// Estimate parameter count and architecture from file properties.
pub fn parameter_analysis(asset: &AssetRecord) -> ExtractionOutput {
    info!("Analyzing parameters of {}", asset.name);
    let result = json!({
        "file_size": asset.size_bytes,
        "format": asset.format.as_str(),
        "estimated_parameters": estimate_parameters(asset),
        "architecture_hints": architecture_hints(&asset.name),
    });
    ExtractionOutput {
        result,
        knowledge: Vec::new(),
    }
}

/// Quantized files are assumed to average 2 bytes per parameter, everything
/// else 4 (float32).
pub fn estimate_parameters(asset: &AssetRecord) -> u64 {
    match asset.format {
        AssetFormat::QuantizedBinary => asset.size_bytes / 2,
        _ => asset.size_bytes / 4,
    }
}

/// Architecture hints from the model name: family, size, quantization.
pub fn architecture_hints(name: &str) -> Vec<String> {
    let name = name.to_lowercase();
    let mut hints = Vec::new();

    let family = [
        ("llama", "LLaMA"),
        ("mistral", "Mistral"),
        ("gpt", "GPT"),
        ("bert", "BERT"),
    ]
    .into_iter()
    .find(|(needle, _)| name.contains(needle));
    if let Some((_, label)) = family {
        hints.push(format!("{} architecture", label));
    }

    if let Some(count) = PARAM_COUNT.captures(&name).and_then(|c| c.get(1)) {
        hints.push(format!("~{}B parameters", count.as_str()));
    }

    if name.contains("q4") {
        hints.push("4-bit quantization".to_string());
    } else if name.contains("q8") {
        hints.push("8-bit quantization".to_string());
    } else if name.contains("fp16") {
        hints.push("16-bit floating point".to_string());
    }

    hints
}

fn all_prompts_failed(model: &str, last_error: Option<TrawlError>) -> TrawlError {
    match last_error {
        Some(e) => TrawlError::QueryFailed {
            model: model.to_string(),
            message: format!("every prompt failed, last error: {}", e),
        },
        None => TrawlError::Other("Model returned no usable responses".to_string()),
    }
}
