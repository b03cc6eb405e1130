//! Learning task scheduler.
//!
//! Tasks are queued FIFO. A dispatch loop holds a semaphore with
//! `max_concurrent` permits: it acquires a permit, moves the oldest pending
//! task to `in_progress` and spawns its execution, which returns the permit
//! when the task reaches a terminal state. With nothing queued the loop sleeps
//! for the poll interval or until an enqueue wakes it.
//!
//! Stopping is a cooperative drain: no new tasks are picked, and tasks that
//! already started run to completion. If the drain outlasts the stop timeout
//! the old loop is detached, and the next `start` waits for it to finish
//! before claiming work, so the two never hold permits at the same time.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::cancel::CancellationToken;
use crate::config::LearningDefaults;
use crate::discovery::registry::DiscoveryRegistry;
use crate::discovery::types::{AssetKind, AssetRecord};
use crate::error::{Result, TrawlError};
use crate::learning::extraction::{
    behavior_modeling, knowledge_extraction, parameter_analysis, ExtractionContext,
    ExtractionOutput,
};
use crate::learning::inference::InferenceClient;
use crate::learning::interface::build_interface;
use crate::learning::knowledge::KnowledgeStore;
use crate::learning::types::{LearningMethod, LearningStats, LearningTask, TaskStatus};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Read access to discovered assets.
pub trait AssetLookup: Send + Sync {
    fn lookup(&self, asset_id: &str) -> Option<AssetRecord>;

    fn all_assets(&self) -> Vec<AssetRecord>;
}

impl AssetLookup for DiscoveryRegistry {
    fn lookup(&self, asset_id: &str) -> Option<AssetRecord> {
        self.get(asset_id)
    }

    fn all_assets(&self) -> Vec<AssetRecord> {
        self.snapshot().into_values().collect()
    }
}

/// State shared between the scheduler handle, the dispatch loop and workers.
struct Inner {
    assets: Arc<dyn AssetLookup>,
    client: InferenceClient,
    knowledge: Arc<KnowledgeStore>,
    query_timeout: Duration,
    tasks: RwLock<HashMap<String, LearningTask>>,
    queue: Mutex<VecDeque<String>>,
    wake: Notify,
}

struct RunningLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    max_concurrent: usize,
}

pub struct TaskScheduler {
    inner: Arc<Inner>,
    running: Mutex<Option<RunningLoop>>,
    /// Loop left draining by a `stop` that timed out
    detached: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
    tasks_path: PathBuf,
}

impl TaskScheduler {
    pub fn new(
        assets: Arc<dyn AssetLookup>,
        client: InferenceClient,
        knowledge: Arc<KnowledgeStore>,
        tasks_path: impl Into<PathBuf>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                assets,
                client,
                knowledge,
                query_timeout,
                tasks: RwLock::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
            }),
            running: Mutex::new(None),
            detached: Mutex::new(None),
            stop_timeout: LearningDefaults::STOP_JOIN_TIMEOUT,
            tasks_path: tasks_path.into(),
        }
    }

    /// How long `stop` waits for in-flight tasks before detaching them.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Create a scheduler and restore tasks saved by [`save_results`].
    ///
    /// Pending tasks are re-queued in creation order. Tasks that were in
    /// progress when the file was written are marked failed.
    ///
    /// [`save_results`]: Self::save_results
    pub fn open(
        assets: Arc<dyn AssetLookup>,
        client: InferenceClient,
        knowledge: Arc<KnowledgeStore>,
        tasks_path: impl Into<PathBuf>,
        query_timeout: Duration,
    ) -> Self {
        let scheduler = Self::new(assets, client, knowledge, tasks_path, query_timeout);
        match atomic_read_json::<Vec<LearningTask>>(&scheduler.tasks_path) {
            Ok(Some(saved)) => scheduler.restore(saved),
            Ok(None) => {}
            Err(e) => warn!(
                "Ignoring unreadable task file {}: {}",
                scheduler.tasks_path.display(),
                e
            ),
        }
        scheduler
    }

    fn restore(&self, mut saved: Vec<LearningTask>) {
        saved.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut queue = self.inner.lock_queue();
        let mut tasks = self.inner.write_tasks();
        for mut task in saved {
            match task.status {
                TaskStatus::Pending => queue.push_back(task.id.clone()),
                TaskStatus::InProgress => {
                    task.status = TaskStatus::Failed;
                    task.completed_at = Some(Utc::now());
                    task.error_message = Some("Interrupted before completion".to_string());
                }
                TaskStatus::Completed | TaskStatus::Failed => {}
            }
            tasks.insert(task.id.clone(), task);
        }
        info!("Restored {} learning tasks", tasks.len());
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.inner.knowledge
    }

    /// Queue a task for an asset. Returns the new task id.
    pub fn create_task(&self, asset_id: &str, method: LearningMethod) -> Result<String> {
        let asset = self
            .inner
            .assets
            .lookup(asset_id)
            .ok_or_else(|| TrawlError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        let task_id = {
            let mut tasks = self.inner.write_tasks();
            let base = format!("{}_{}_{}", asset.name, method, Utc::now().timestamp());
            let mut task_id = base.clone();
            let mut n = 1;
            while tasks.contains_key(&task_id) {
                task_id = format!("{}_{}", base, n);
                n += 1;
            }
            tasks.insert(
                task_id.clone(),
                LearningTask::new(task_id.clone(), asset_id, &asset.name, method),
            );
            task_id
        };
        self.inner.lock_queue().push_back(task_id.clone());
        self.inner.wake.notify_one();

        info!("Created learning task {} for {}", task_id, asset.name);
        Ok(task_id)
    }

    /// Queue knowledge extraction and behavior modeling for every language
    /// model no larger than `max_model_size`.
    pub fn enqueue_all_language_models(&self, max_model_size: u64) -> Vec<String> {
        let mut assets: Vec<_> = self
            .inner
            .assets
            .all_assets()
            .into_iter()
            .filter(|a| a.kind == AssetKind::LanguageModel)
            .filter(|a| {
                let fits = a.size_bytes <= max_model_size;
                if !fits {
                    debug!("Skipping {}: too large for learning", a.name);
                }
                fits
            })
            .collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name));

        let mut created = Vec::new();
        for asset in &assets {
            for method in [
                LearningMethod::KnowledgeExtraction,
                LearningMethod::BehaviorModeling,
            ] {
                match self.create_task(&asset.fingerprint, method) {
                    Ok(id) => created.push(id),
                    Err(e) => warn!("Failed to queue {} for {}: {}", method, asset.name, e),
                }
            }
        }
        info!(
            "Queued {} learning tasks for {} language models",
            created.len(),
            assets.len()
        );
        created
    }

    pub fn task(&self, task_id: &str) -> Option<LearningTask> {
        self.inner.read_tasks().get(task_id).cloned()
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Vec<LearningTask> {
        let mut tasks: Vec<_> = self.inner.read_tasks().values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> LearningStats {
        let mut stats = LearningStats {
            total_knowledge_items: self.inner.knowledge.len(),
            ..LearningStats::default()
        };
        {
            let running = self.lock_running();
            if let Some(r) = running.as_ref().filter(|r| !r.handle.is_finished()) {
                stats.is_learning = true;
                stats.max_concurrent = r.max_concurrent;
            }
        }
        for task in self.inner.read_tasks().values() {
            stats.total_tasks += 1;
            match task.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::InProgress => stats.in_progress_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
            }
        }
        stats
    }

    /// Persist tasks and knowledge items.
    pub fn save_results(&self) -> Result<()> {
        atomic_write_json(&self.tasks_path, &self.list_tasks())?;
        self.inner.knowledge.save()?;
        info!(
            "Saved learning results to {}",
            self.tasks_path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        Ok(())
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the dispatch loop. Returns `false` if it is already running.
    pub fn start(&self, max_concurrent: usize) -> bool {
        let mut running = self.lock_running();
        if running.as_ref().map(|r| !r.handle.is_finished()).unwrap_or(false) {
            warn!("Learning already running");
            return false;
        }

        let max_concurrent = max_concurrent.max(1);
        let previous = self
            .detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .filter(|h| !h.is_finished());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatch_loop(
            self.inner.clone(),
            max_concurrent,
            cancel.clone(),
            previous,
        ));
        *running = Some(RunningLoop {
            handle,
            cancel,
            max_concurrent,
        });
        info!("Started learning with {} workers", max_concurrent);
        true
    }

    /// Stop picking new tasks and wait a bounded time for in-flight ones.
    pub async fn stop(&self) {
        let Some(RunningLoop { mut handle, cancel, .. }) = self.lock_running().take() else {
            return;
        };
        cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Learning loop ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Learning tasks still running after {:?}; detaching",
                    self.stop_timeout
                );
                *self.detached.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
        }
        info!("Stopped learning");
    }
}

impl Inner {
    fn read_tasks(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, LearningTask>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tasks(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, LearningTask>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the oldest pending task and mark it in progress.
    fn claim_next(&self) -> Option<LearningTask> {
        let mut queue = self.lock_queue();
        let mut tasks = self.write_tasks();
        while let Some(task_id) = queue.pop_front() {
            let Some(task) = tasks.get_mut(&task_id) else {
                continue;
            };
            if !task.status.can_transition_to(TaskStatus::InProgress) {
                continue;
            }
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            task.progress = 0.0;
            return Some(task.clone());
        }
        None
    }

    fn set_progress(&self, task_id: &str, progress: f32) {
        if let Some(task) = self.write_tasks().get_mut(task_id) {
            if task.status == TaskStatus::InProgress {
                task.progress = progress.clamp(0.0, 1.0);
            }
        }
    }

    /// Record the outcome of an in-progress task.
    ///
    /// Returns `false` (and changes nothing) if the task is not in progress.
    fn finish(&self, task_id: &str, outcome: Result<ExtractionOutput>) -> bool {
        let mut tasks = self.write_tasks();
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        let next = if outcome.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if !task.status.can_transition_to(next) {
            error!(
                "Refusing illegal transition {} -> {} for {}",
                task.status, next, task_id
            );
            return false;
        }

        task.status = next;
        task.completed_at = Some(Utc::now());
        match outcome {
            Ok(output) => {
                task.progress = 1.0;
                task.result = Some(output.result);
                let stored = self.knowledge.insert_all(output.knowledge);
                info!("Completed learning task {} ({} knowledge items)", task_id, stored);
            }
            Err(e) => {
                task.error_message = Some(e.to_string());
                error!("Learning task {} failed: {}", task_id, e);
            }
        }
        true
    }

    async fn execute(&self, task: &LearningTask) -> Result<ExtractionOutput> {
        let asset = self
            .assets
            .lookup(&task.asset_id)
            .ok_or_else(|| TrawlError::AssetNotFound {
                asset_id: task.asset_id.clone(),
            })?;
        let interface = build_interface(&asset, &self.client)?;

        let progress = |p: f32| self.set_progress(&task.id, p);
        let ctx = ExtractionContext {
            asset: &asset,
            task_id: &task.id,
            query_timeout: self.query_timeout,
            progress: &progress,
        };

        match task.method {
            LearningMethod::ParameterAnalysis => Ok(parameter_analysis(&asset)),
            LearningMethod::KnowledgeExtraction => {
                let handle = interface.load().await?;
                knowledge_extraction(interface.as_ref(), &handle, &ctx).await
            }
            LearningMethod::BehaviorModeling => {
                let handle = interface.load().await?;
                behavior_modeling(interface.as_ref(), &handle, &ctx).await
            }
        }
    }
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    max_concurrent: usize,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    // Waited out even if cancelled, so a chain of timed-out stops stays ordered.
    if let Some(previous) = previous {
        info!("Waiting for the previous learning loop to drain");
        if let Err(e) = previous.await {
            warn!("Previous learning loop ended abnormally: {}", e);
        }
    }
    if cancel.is_cancelled() {
        return;
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut workers = JoinSet::new();

    loop {
        while workers.try_join_next().is_some() {}

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit,
            _ = cancel.cancelled() => break,
        };
        let Ok(permit) = permit else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }

        match inner.claim_next() {
            Some(task) => {
                info!("Starting learning task {} ({})", task.id, task.method);
                let inner = inner.clone();
                workers.spawn(async move {
                    let outcome = inner.execute(&task).await;
                    inner.finish(&task.id, outcome);
                    drop(permit);
                });
            }
            None => {
                drop(permit);
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = tokio::time::sleep(LearningDefaults::POLL_INTERVAL) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }

    if !workers.is_empty() {
        info!("Waiting for {} in-flight learning tasks", workers.len());
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Learning worker panicked: {}", e);
        }
    }
    debug!("Learning loop exiting");
}
