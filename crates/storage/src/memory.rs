//! In-memory storage implementation
//!
//! Keeps tasks for the lifetime of the process

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use taskmind_core::{Task, TaskId};

use crate::trait_::{Result, SharedStorage, Storage, StorageError};

/// In-memory storage implementation
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TaskId, Task>>> {
        self.tasks
            .lock()
            .map_err(|e| StorageError::LockFailed(e.to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_task(&self, task: &Task) -> Result<()> {
        self.lock()?.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.lock()?.get(task_id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn delete_task(&self, task_id: &TaskId) -> Result<bool> {
        Ok(self.lock()?.remove(task_id).is_some())
    }
}

/// Create a new shared in-memory storage
pub fn create_memory_storage() -> SharedStorage {
    Arc::new(MemoryStorage::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskmind_core::NewTask;

    #[tokio::test]
    async fn test_save_get_delete() {
        let storage = MemoryStorage::new();
        let task = NewTask::new("Water the plants").into_task(Utc::now()).unwrap();

        storage.save_task(&task).await.unwrap();
        assert_eq!(storage.get_task(&task.id).await.unwrap(), Some(task.clone()));
        assert_eq!(storage.list_tasks().await.unwrap().len(), 1);

        assert!(storage.delete_task(&task.id).await.unwrap());
        assert!(!storage.delete_task(&task.id).await.unwrap());
        assert_eq!(storage.get_task(&task.id).await.unwrap(), None);
    }
}
