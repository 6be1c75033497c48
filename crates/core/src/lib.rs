//! Taskmind Core - 核心数据模型与 AI 能力
//!
//! 包含：
//! - Task: 任务模型与校验
//! - Config: YAML 配置与环境变量覆盖
//! - LLM: Provider 适配、关键词回退、编排

mod task;
pub mod config;
pub mod llm;

pub use task::*;
pub use config::{
    ConfigError, ConfigLoader, LlmConfig, ProviderEntry, ProviderMode, StorageBackend,
    StorageConfig, TaskmindConfig,
};
