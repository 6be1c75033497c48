//! Storage trait definition
//!
//! Abstract interface for task persistence

use async_trait::async_trait;
use std::sync::Arc;
use taskmind_core::{Task, TaskId};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockFailed(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage trait for task persistence
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a task
    async fn save_task(&self, task: &Task) -> Result<()>;
    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>>;
    async fn list_tasks(&self) -> Result<Vec<Task>>;
    /// Returns false when no task had that id
    async fn delete_task(&self, task_id: &TaskId) -> Result<bool>;
}

/// Shared storage reference
pub type SharedStorage = Arc<dyn Storage>;
