//! Learning methods on TrawlApi.

use crate::error::{Result, TrawlError};
use crate::learning::{KnowledgeItem, LearningMethod, LearningStats, LearningTask};
use crate::TrawlApi;

impl TrawlApi {
    // ========================================
    // Tasks
    // ========================================

    /// Queue a learning task for a discovered asset.
    pub fn create_learning_task(&self, asset_id: &str, method: LearningMethod) -> Result<String> {
        self.scheduler.create_task(asset_id, method)
    }

    /// Queue knowledge extraction and behavior modeling for every discovered
    /// language model within the configured size limit.
    pub fn learn_from_discovered(&self) -> Vec<String> {
        let max_model_size = self.config().max_model_size;
        self.scheduler.enqueue_all_language_models(max_model_size)
    }

    pub fn task_status(&self, task_id: &str) -> Result<LearningTask> {
        self.scheduler
            .task(task_id)
            .ok_or_else(|| TrawlError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    pub fn list_tasks(&self) -> Vec<LearningTask> {
        self.scheduler.list_tasks()
    }

    /// Knowledge extracted from one asset.
    pub fn knowledge_items(&self, asset_id: &str) -> Vec<KnowledgeItem> {
        self.scheduler.knowledge().for_model(asset_id)
    }

    pub fn learning_stats(&self) -> LearningStats {
        self.scheduler.stats()
    }

    pub fn save_learning_results(&self) -> Result<()> {
        self.scheduler.save_results()
    }

    // ========================================
    // Worker pool
    // ========================================

    /// Start the worker pool with the configured concurrency.
    pub fn start_learning(&self) -> bool {
        let max_concurrent = self.config().max_concurrent_tasks;
        self.scheduler.start(max_concurrent)
    }

    pub async fn stop_learning(&self) {
        self.scheduler.stop().await
    }

    pub fn is_learning(&self) -> bool {
        self.scheduler.is_running()
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Stop both background loops and persist everything.
    ///
    /// Persistence failures are logged and the first one is returned after
    /// all steps have run.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down Trawl");
        self.stop_discovery().await;
        self.stop_learning().await;

        let mut first_error = None;
        if let Err(e) = self.registry.save() {
            tracing::error!("Failed to save discovery cache: {}", e);
            first_error = Some(e);
        }
        if let Err(e) = self.scheduler.save_results() {
            tracing::error!("Failed to save learning results: {}", e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
