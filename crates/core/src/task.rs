//! Task management core types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of characters allowed in a task title
pub const MAX_TITLE_LEN: usize = 200;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Task state in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    /// Normalise a loosely-formatted priority label.
    ///
    /// Accepts English and Chinese spellings (`high`, `h`, `高`, `高优先级`,
    /// ...) and falls back to containment of 高/低/中 for free-form labels.
    /// Returns `None` when nothing recognisable is present.
    pub fn normalize(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "high" | "h" | "高" | "高优先级" | "优先级高" => return Some(TaskPriority::High),
            "medium" | "med" | "m" | "中" | "中优先级" | "优先级中" => {
                return Some(TaskPriority::Medium);
            }
            "low" | "l" | "低" | "低优先级" | "优先级低" => return Some(TaskPriority::Low),
            _ => {}
        }

        if normalized.contains('高') {
            Some(TaskPriority::High)
        } else if normalized.contains('低') {
            Some(TaskPriority::Low)
        } else if normalized.contains('中') {
            Some(TaskPriority::Medium)
        } else {
            None
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised priority: {0}")]
pub struct ParsePriorityError(pub String);

impl FromStr for TaskPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

/// Validation failures for task input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title exceeds {MAX_TITLE_LEN} characters ({0})")]
    TitleTooLong(usize),
}

fn validate_title(title: &str) -> Result<(), TaskValidationError> {
    let len = title.trim().chars().count();
    if len == 0 {
        return Err(TaskValidationError::EmptyTitle);
    }
    if len > MAX_TITLE_LEN {
        return Err(TaskValidationError::TitleTooLong(len));
    }
    Ok(())
}

/// Persisted task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub due_date: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Text used for tag/priority heuristics and search indexing
    pub fn searchable_text(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {}", self.title, description),
            None => self.title.clone(),
        }
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub due_date: Option<NaiveDateTime>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Build the stored record, stamping ids and timestamps
    pub fn into_task(self, now: DateTime<Utc>) -> Result<Task, TaskValidationError> {
        validate_title(&self.title)?;
        Ok(Task {
            id: TaskId::new(),
            title: self.title.trim().to_string(),
            description: self.description,
            status: self.status,
            priority: self.priority,
            tags: self.tags,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<NaiveDateTime>,
}

impl TaskUpdate {
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) -> Result<(), TaskValidationError> {
        if let Some(title) = self.title {
            validate_title(&title)?;
            task.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            task.description = Some(description);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        task.updated_at = now;
        Ok(())
    }
}
