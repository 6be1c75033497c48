//! JSON 文件存储实现
//!
//! 所有任务保存在一个 JSON 文件中，适合单用户 CLI 使用。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use taskmind_core::{Task, TaskId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::trait_::{Result, Storage, StorageError};

/// JSON 存储实现
#[derive(Debug)]
pub struct JsonStorage {
    /// 数据文件
    path: PathBuf,

    /// 任务缓存
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl JsonStorage {
    /// 打开 JSON 存储；文件不存在时从空开始
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tasks = Self::load_tasks(&path).await?;
        debug!(path = %path.display(), count = tasks.len(), "JSON storage opened");

        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_tasks(path: &Path) -> Result<HashMap<TaskId, Task>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let tasks: Vec<Task> = serde_json::from_str(&content)?;
        Ok(tasks.into_iter().map(|task| (task.id, task)).collect())
    }

    /// 写回文件；先写临时文件再重命名
    async fn persist(&self, tasks: &HashMap<TaskId, Task>) -> Result<()> {
        let mut ordered: Vec<&Task> = tasks.values().collect();
        ordered.sort_by_key(|task| (task.created_at, task.id.0));
        let content = serde_json::to_string_pretty(&ordered)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn save_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let previous = tasks.insert(task.id, task.clone());
        if let Err(e) = self.persist(&tasks).await {
            // Keep the cache consistent with the file
            match previous {
                Some(previous) => tasks.insert(task.id, previous),
                None => tasks.remove(&task.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn delete_task(&self, task_id: &TaskId) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let Some(removed) = tasks.remove(task_id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&tasks).await {
            tasks.insert(removed.id, removed);
            return Err(e);
        }
        Ok(true)
    }
}
