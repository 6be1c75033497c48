//! Task service
//!
//! CRUD over a [`Storage`] backend kept in sync with a [`SearchIndex`],
//! plus the AI-assisted flows: creating a task from free text and
//! re-tagging a task whose title changed.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use taskmind_core::llm::{AssistError, AttemptFailure, ProviderOrchestrator, ResultSource};
use taskmind_core::{
    NewTask, Task, TaskId, TaskPriority, TaskStatus, TaskUpdate, TaskValidationError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::search::{KeywordIndex, SearchHit, SearchIndex};
use crate::trait_::{SharedStorage, StorageError};

/// Upper bound for search results
pub const MAX_TOP_K: usize = 20;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid task: {0}")]
    Validation(#[from] TaskValidationError),

    #[error(transparent)]
    Assist(#[from] AssistError),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("top_k must be between 1 and {MAX_TOP_K}, got {0}")]
    InvalidTopK(usize),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Listing filter; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// A task created from free text, with the provenance of its fields
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task: Task,
    pub parse_source: ResultSource,
    /// Set when tags had to be suggested separately
    pub tags_source: Option<ResultSource>,
    pub failures: Vec<AttemptFailure>,
}

impl CreatedTask {
    pub fn is_degraded(&self) -> bool {
        self.parse_source == ResultSource::Fallback
            || self.tags_source == Some(ResultSource::Fallback)
    }
}

/// Task service
pub struct TaskService {
    storage: SharedStorage,
    index: Arc<dyn SearchIndex>,
    orchestrator: Arc<ProviderOrchestrator>,
}

impl TaskService {
    pub fn new(
        storage: SharedStorage,
        index: Arc<dyn SearchIndex>,
        orchestrator: Arc<ProviderOrchestrator>,
    ) -> Self {
        Self {
            storage,
            index,
            orchestrator,
        }
    }

    /// Service with a fresh [`KeywordIndex`] filled from `storage`
    pub async fn open(
        storage: SharedStorage,
        orchestrator: Arc<ProviderOrchestrator>,
    ) -> Result<Self> {
        let service = Self::new(storage, Arc::new(KeywordIndex::new()), orchestrator);
        service.reindex().await?;
        Ok(service)
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    /// Index every stored task; returns how many were indexed
    pub async fn reindex(&self) -> Result<usize> {
        let tasks = self.storage.list_tasks().await?;
        for task in &tasks {
            self.index.upsert(task).await?;
        }
        debug!(count = tasks.len(), "Search index rebuilt");
        Ok(tasks.len())
    }

    // Index failures never fail the primary operation
    async fn sync_index(&self, task: &Task) {
        if let Err(e) = self.index.upsert(task).await {
            warn!(task = %task.id, error = %e, "Failed to index task");
        }
    }

    pub async fn create(&self, input: NewTask) -> Result<Task> {
        self.create_at(input, Utc::now()).await
    }

    async fn create_at(&self, input: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let task = input.into_task(now)?;
        self.storage.save_task(&task).await?;
        self.sync_index(&task).await;
        info!(task = %task.id, title = %task.title, "Task created");
        Ok(task)
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task> {
        self.storage
            .get_task(id)
            .await?
            .ok_or(ServiceError::NotFound(*id))
    }

    /// Matching tasks, newest first, plus the total before paging
    pub async fn list(&self, filter: &TaskFilter) -> Result<(Vec<Task>, usize)> {
        let mut tasks: Vec<Task> = self
            .storage
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.priority.is_none_or(|p| t.priority == p))
            .collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });

        let total = tasks.len();
        let page = tasks
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    /// Apply `update`; a new title without explicit tags re-suggests tags
    pub async fn update(&self, id: &TaskId, mut update: TaskUpdate) -> Result<Task> {
        let mut task = self.get(id).await?;

        let title_changed = update
            .title
            .as_deref()
            .is_some_and(|title| title.trim() != task.title);
        if title_changed && update.tags.is_none() {
            let title = update.title.as_deref().unwrap_or(&task.title);
            let description = update.description.as_deref().or(task.description.as_deref());
            match self.orchestrator.suggest_tags(title, description).await {
                Ok(tags) => update.tags = Some(tags.value.into_vec()),
                Err(e) => warn!(task = %id, error = %e, "Tag refresh skipped"),
            }
        }

        update.apply(&mut task, Utc::now())?;
        self.storage.save_task(&task).await?;
        self.sync_index(&task).await;
        Ok(task)
    }

    pub async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task> {
        self.update(
            id,
            TaskUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: &TaskId) -> Result<()> {
        if !self.storage.delete_task(id).await? {
            return Err(ServiceError::NotFound(*id));
        }
        if let Err(e) = self.index.remove(id).await {
            warn!(task = %id, error = %e, "Failed to remove task from index");
        }
        info!(task = %id, "Task deleted");
        Ok(())
    }

    /// Parse free text into a task and store it.
    ///
    /// When the parse yields no tags they are suggested separately.
    pub async fn create_from_text(&self, text: &str, now: NaiveDateTime) -> Result<CreatedTask> {
        let parsed = self.orchestrator.parse_text(text, now).await?;
        let mut failures = parsed.failures;
        let draft = parsed.value;

        let mut tags_source = None;
        let tags = if draft.tags.is_empty() {
            let suggested = self
                .orchestrator
                .suggest_tags(&draft.title, draft.description.as_deref())
                .await?;
            failures.extend(suggested.failures);
            tags_source = Some(suggested.source);
            suggested.value
        } else {
            draft.tags
        };

        let input = NewTask {
            title: draft.title,
            description: draft.description,
            status: TaskStatus::Pending,
            priority: draft.priority,
            tags: tags.into_vec(),
            due_date: draft.due_date,
        };
        let task = self.create(input).await?;

        Ok(CreatedTask {
            task,
            parse_source: parsed.source,
            tags_source,
            failures,
        })
    }

    /// Tasks most similar to `query`, best first
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Task, f32)>> {
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(ServiceError::InvalidTopK(top_k));
        }

        let hits = self.index.search(query, top_k).await?;
        let mut results = Vec::with_capacity(hits.len());
        for SearchHit { task_id, score } in hits {
            // Hits can outlive their task if an index removal failed
            if let Some(task) = self.storage.get_task(&task_id).await? {
                results.push((task, score));
            }
        }
        Ok(results)
    }
}
