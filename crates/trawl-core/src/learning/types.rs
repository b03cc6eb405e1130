//! Types for learning tasks and extracted knowledge.

use crate::error::TrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Extraction method run by a learning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningMethod {
    /// Ask the model with open questions and keep the answers
    KnowledgeExtraction,
    /// Time and measure responses to typed prompts
    BehaviorModeling,
    /// Estimate size and architecture from file properties only
    ParameterAnalysis,
}

impl LearningMethod {
    pub const ALL: [LearningMethod; 3] = [
        LearningMethod::KnowledgeExtraction,
        LearningMethod::BehaviorModeling,
        LearningMethod::ParameterAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningMethod::KnowledgeExtraction => "knowledge_extraction",
            LearningMethod::BehaviorModeling => "behavior_modeling",
            LearningMethod::ParameterAnalysis => "parameter_analysis",
        }
    }
}

impl std::fmt::Display for LearningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningMethod {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LearningMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| TrawlError::UnknownMethod(s.to_string()))
    }
}

/// Lifecycle state of a task.
///
/// Legal transitions: `Pending -> InProgress -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of extraction work against a discovered asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningTask {
    pub id: String,
    /// Fingerprint of the target asset. Weak: the asset may be gone by the
    /// time the task runs.
    pub asset_id: String,
    pub asset_name: String,
    pub method: LearningMethod,
    pub status: TaskStatus,
    /// Progress from 0.0 to 1.0
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl LearningTask {
    pub(crate) fn new(id: String, asset_id: &str, asset_name: &str, method: LearningMethod) -> Self {
        Self {
            id,
            asset_id: asset_id.to_string(),
            asset_name: asset_name.to_string(),
            method,
            status: TaskStatus::Pending,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }
}

/// Query/response pair captured from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeContent {
    pub query: String,
    pub response: String,
}

/// Durable output of a completed knowledge-extraction task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    /// Fingerprint of the source asset
    pub model_id: String,
    /// `knowledge_{i}`, where `i` is the prompt index
    pub knowledge_type: String,
    pub content: KnowledgeContent,
    /// Heuristic confidence from 0.0 to 1.0
    pub confidence: f32,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl KnowledgeItem {
    /// Store key, `{model_id}_{knowledge_type}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.model_id, self.knowledge_type)
    }
}

/// Aggregate view of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_knowledge_items: usize,
    pub is_learning: bool,
    pub max_concurrent: usize,
}
