// Taskmind Storage Layer
//
// Abstract storage interface with pluggable backends, a keyword search
// index and the task service built on top of them

pub mod trait_;
pub mod memory;
pub mod json;
pub mod search;
pub mod service;

pub use trait_::*;
pub use memory::{MemoryStorage, create_memory_storage};
pub use json::JsonStorage;
pub use search::{KeywordIndex, SearchHit, SearchIndex};
pub use service::{CreatedTask, ServiceError, TaskFilter, TaskService};
